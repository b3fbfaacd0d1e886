// Copyright 2019-2026 Fuhon Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

use ipld_blockstore::MemoryBlockStore;
use ipld_hamt::Hamt;

#[test]
fn constructor_rejects_bad_bit_width() {
    let store = MemoryBlockStore::new();
    assert!(Hamt::new(&store, 0).is_err());
    assert!(Hamt::new(&store, 9).is_err());
    assert!(Hamt::new(&store, 8).is_ok());
}

#[test]
fn many_keys_round_trip_through_store() {
    let store = MemoryBlockStore::new();
    let mut hamt = Hamt::new(&store, 8).unwrap();
    for i in 0..500u32 {
        hamt.set(&i.to_be_bytes(), i.to_be_bytes().to_vec()).unwrap();
    }
    let cid = hamt.flush().unwrap();

    let loaded = Hamt::load(&store, &cid, 8).unwrap();
    for i in 0..500u32 {
        assert_eq!(loaded.get(&i.to_be_bytes()).unwrap(), Some(i.to_be_bytes().to_vec()));
    }
    assert_eq!(loaded.get(b"missing").unwrap(), None);
}

#[test]
fn overwrite_returns_previous_value() {
    let store = MemoryBlockStore::new();
    let mut hamt = Hamt::new(&store, 8).unwrap();
    assert_eq!(hamt.set(b"k", vec![1]).unwrap(), None);
    assert_eq!(hamt.set(b"k", vec![2]).unwrap(), Some(vec![1]));
    assert_eq!(hamt.get(b"k").unwrap(), Some(vec![2]));
}

#[test]
fn remove_then_reinsert_round_trips() {
    let store = MemoryBlockStore::new();
    let mut hamt = Hamt::new(&store, 8).unwrap();
    for i in 0..20u8 {
        hamt.set(&[i], vec![i]).unwrap();
    }
    for i in 0..10u8 {
        assert_eq!(hamt.remove(&[i]).unwrap(), Some(vec![i]));
    }
    for i in 0..10u8 {
        assert_eq!(hamt.get(&[i]).unwrap(), None);
    }
    for i in 10..20u8 {
        assert_eq!(hamt.get(&[i]).unwrap(), Some(vec![i]));
    }
    hamt.set(&[0], vec![99]).unwrap();
    assert_eq!(hamt.get(&[0]).unwrap(), Some(vec![99]));
}

#[test]
fn visit_covers_every_pair_exactly_once() {
    let store = MemoryBlockStore::new();
    let mut hamt = Hamt::new(&store, 8).unwrap();
    let mut expected = std::collections::BTreeSet::new();
    for i in 0..100u32 {
        hamt.set(&i.to_be_bytes(), i.to_be_bytes().to_vec()).unwrap();
        expected.insert(i.to_be_bytes().to_vec());
    }
    let mut seen = std::collections::BTreeSet::new();
    hamt.visit(|k, _| {
        seen.insert(k.to_vec());
        Ok(())
    })
    .unwrap();
    assert_eq!(seen, expected);
}

#[test]
fn insertion_order_does_not_affect_flush_cid() {
    let store_a = MemoryBlockStore::new();
    let mut a = Hamt::new(&store_a, 8).unwrap();
    for i in [5u8, 1, 9, 3, 7] {
        a.set(&[i], vec![i]).unwrap();
    }

    let store_b = MemoryBlockStore::new();
    let mut b = Hamt::new(&store_b, 8).unwrap();
    for i in [1u8, 3, 5, 7, 9] {
        b.set(&[i], vec![i]).unwrap();
    }

    assert_eq!(a.flush().unwrap(), b.flush().unwrap());
}
