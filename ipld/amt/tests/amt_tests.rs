// Copyright 2019-2026 Fuhon Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

use ipld_amt::{Amt, Error, MAX_INDEX};
use ipld_blockstore::MemoryBlockStore;

#[test]
fn constructor_rejects_bad_bit_width() {
    let store = MemoryBlockStore::new();
    assert!(Amt::new_with_bit_width(&store, 0).is_err());
    assert!(Amt::new_with_bit_width(&store, 12).is_err());
    assert!(Amt::new(&store).is_ok());
}

#[test]
fn out_of_range_index_is_rejected() {
    let store = MemoryBlockStore::new();
    let mut a = Amt::new(&store).unwrap();
    assert!(matches!(a.set(MAX_INDEX, vec![1]), Err(Error::IndexTooBig(_))));
    assert!(a.set(MAX_INDEX - 1, vec![1]).is_ok());
}

#[test]
fn sparse_keys_round_trip_through_store() {
    let store = MemoryBlockStore::new();
    let mut a = Amt::new(&store).unwrap();
    let keys = [0u64, 7, 64, 511, 100_000];
    for &k in &keys {
        a.set(k, k.to_be_bytes().to_vec()).unwrap();
    }
    let cid = a.flush().unwrap();

    let loaded = Amt::load(&store, &cid).unwrap();
    assert_eq!(loaded.count(), keys.len() as u64);
    for &k in &keys {
        assert_eq!(loaded.get(k).unwrap(), Some(k.to_be_bytes().to_vec()));
    }
    assert_eq!(loaded.get(999).unwrap(), None);
}

#[test]
fn remove_decrements_count_and_clears_slot() {
    let store = MemoryBlockStore::new();
    let mut a = Amt::new(&store).unwrap();
    a.set(1, vec![1]).unwrap();
    a.set(2, vec![2]).unwrap();
    assert_eq!(a.count(), 2);
    assert_eq!(a.remove(1).unwrap(), Some(vec![1]));
    assert_eq!(a.count(), 1);
    assert_eq!(a.get(1).unwrap(), None);
    assert_eq!(a.remove(1).unwrap(), None);
}

#[test]
fn visit_is_ascending_over_a_flushed_and_reloaded_amt() {
    let store = MemoryBlockStore::new();
    let mut a = Amt::new(&store).unwrap();
    for k in [40u64, 1, 900, 3, 17] {
        a.set(k, k.to_be_bytes().to_vec()).unwrap();
    }
    let cid = a.flush().unwrap();
    let loaded = Amt::load(&store, &cid).unwrap();

    let mut seen = Vec::new();
    loaded
        .visit(|k, _| {
            seen.push(k);
            Ok(())
        })
        .unwrap();
    let mut sorted = seen.clone();
    sorted.sort();
    assert_eq!(seen, sorted);
}

#[test]
fn insertion_order_does_not_affect_flush_cid() {
    let store_a = MemoryBlockStore::new();
    let mut a = Amt::new(&store_a).unwrap();
    for k in [3u64, 1, 2] {
        a.set(k, vec![k as u8]).unwrap();
    }

    let store_b = MemoryBlockStore::new();
    let mut b = Amt::new(&store_b).unwrap();
    for k in [1u64, 2, 3] {
        b.set(k, vec![k as u8]).unwrap();
    }

    assert_eq!(a.flush().unwrap(), b.flush().unwrap());
}
