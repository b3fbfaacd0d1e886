// Copyright 2019-2026 Fuhon Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

//! A CBOR-serialized, content-addressed array mapped trie keyed by `u64`
//! (spec §4.4): a sparse array persisted the same way the HAMT persists a
//! sparse map, with a root that additionally remembers the subtree `height`
//! so growth/shrink can be done by wrapping or unwrapping a single level.

mod bitmap;
mod error;
mod node;

pub use error::Error;
pub use node::{Item, Node};

use ipld_blockstore::BlockStore;
use ipld_cid::CbCid;
use node::Root;

/// Default branching factor exponent: width = 2^3 = 8 children per node.
pub const DEFAULT_BIT_WIDTH: u32 = 3;
/// Keys must satisfy `0 <= key < MAX_INDEX` (spec's `kMaxIndex`).
pub const MAX_INDEX_BITS: u32 = 63;
pub const MAX_INDEX: u64 = 1 << MAX_INDEX_BITS;

fn subtree_width(width: u64, height: u32) -> u128 {
    (width as u128).pow(height)
}

/// Whether `key` is addressable under a root of the given `height`, i.e.
/// `key < width^(height+1)`, computed in `u128` to avoid overflow for large
/// heights.
fn fits_under(width: u64, height: u32, key: u64) -> bool {
    (key as u128) < (width as u128) * subtree_width(width, height)
}

pub struct Amt<'a, BS> {
    store: &'a BS,
    bit_width: u32,
    height: u32,
    count: u64,
    root: Node,
}

impl<'a, BS: BlockStore> Amt<'a, BS> {
    pub fn new(store: &'a BS) -> Result<Self, Error> {
        Self::new_with_bit_width(store, DEFAULT_BIT_WIDTH)
    }

    pub fn new_with_bit_width(store: &'a BS, bit_width: u32) -> Result<Self, Error> {
        if bit_width == 0 || bit_width > 11 {
            return Err(Error::InvalidBitWidth);
        }
        Ok(Amt {
            store,
            bit_width,
            height: 0,
            count: 0,
            root: Node::empty(1 << bit_width),
        })
    }

    pub fn load(store: &'a BS, cid: &CbCid) -> Result<Self, Error> {
        let bytes = store.get(cid)?;
        let root: Root = encoding::from_slice(&bytes)
            .map_err(|e| node::shape_error_to_inconsistent(e))?;
        let bit_width = root.bit_width.unwrap_or(DEFAULT_BIT_WIDTH);
        if bit_width == 0 || bit_width > 11 {
            return Err(Error::InvalidBitWidth);
        }
        Ok(Amt {
            store,
            bit_width,
            height: root.height,
            count: root.count,
            root: root.node,
        })
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    fn width(&self) -> u64 {
        1 << self.bit_width
    }

    fn check_index(&self, key: u64) -> Result<(), Error> {
        if key >= MAX_INDEX {
            return Err(Error::IndexTooBig(key));
        }
        Ok(())
    }

    pub fn set(&mut self, key: u64, value: Vec<u8>) -> Result<Option<Vec<u8>>, Error> {
        self.check_index(key)?;
        let width = self.width();
        // Grow until `key` fits under the current root.
        while !fits_under(width, self.height, key) {
            let old_root = std::mem::replace(&mut self.root, Node::empty(width as usize));
            self.root.bitmap.set(0);
            self.root.links.push(Item::Ptr(Box::new(old_root)));
            self.height += 1;
        }
        let prev = set_rec(self.store, &mut self.root, width, self.height, key, value)?;
        if prev.is_none() {
            self.count += 1;
        }
        Ok(prev)
    }

    pub fn get(&self, key: u64) -> Result<Option<Vec<u8>>, Error> {
        self.check_index(key)?;
        let width = self.width();
        if !fits_under(width, self.height, key) {
            return Ok(None);
        }
        get_rec(self.store, &self.root, width, self.height, key)
    }

    pub fn contains(&self, key: u64) -> Result<bool, Error> {
        Ok(self.get(key)?.is_some())
    }

    pub fn remove(&mut self, key: u64) -> Result<Option<Vec<u8>>, Error> {
        self.check_index(key)?;
        let width = self.width();
        if !fits_under(width, self.height, key) {
            return Ok(None);
        }
        let removed = remove_rec(self.store, &mut self.root, width, self.height, key)?;
        if removed.is_some() {
            self.count -= 1;
            // Shrink: while the root has no more than a single child, and
            // that child (if any) is at slot 0, descend one level.
            while self.height > 0 {
                match self.root.links.len() {
                    0 => {
                        self.height -= 1;
                        self.root = Node::empty(width as usize);
                    }
                    1 if self.root.bitmap.get(0) => {
                        let only = self.root.links.pop().unwrap();
                        let child = match only {
                            Item::Ptr(n) => *n,
                            Item::Cid(cid) => {
                                let bytes = self.store.get(&cid)?;
                                if self.height - 1 == 0 {
                                    node::decode_leaf(&bytes)?
                                } else {
                                    node::decode_interior(&bytes)?
                                }
                            }
                        };
                        self.root = child;
                        self.height -= 1;
                    }
                    _ => break,
                }
            }
        }
        Ok(removed)
    }

    /// Ascending-key visit; the visitor may stop the walk by returning `Err`.
    pub fn visit<F>(&self, mut f: F) -> Result<(), Error>
    where
        F: FnMut(u64, &[u8]) -> Result<(), Error>,
    {
        let width = self.width();
        visit_rec(self.store, &self.root, width, self.height, 0, &mut f)
    }

    pub fn flush(&mut self) -> Result<CbCid, Error> {
        flush_rec(self.store, &mut self.root)?;
        let bit_width = if self.bit_width == DEFAULT_BIT_WIDTH {
            None
        } else {
            Some(self.bit_width)
        };
        let root = Root {
            bit_width,
            height: self.height,
            count: self.count,
            node: self.root.clone(),
        };
        self.store.set_cbor(&root).map_err(Error::from)
    }
}

fn slot_and_remainder(width: u64, height: u32, key: u64) -> (usize, u64) {
    if height == 0 {
        return (key as usize, 0);
    }
    let w = subtree_width(width, height);
    let slot = (key as u128 / w) as usize;
    let rem = (key as u128 % w) as u64;
    (slot, rem)
}

fn set_rec<BS: BlockStore>(
    store: &BS,
    node: &mut Node,
    width: u64,
    height: u32,
    key: u64,
    value: Vec<u8>,
) -> Result<Option<Vec<u8>>, Error> {
    let (slot, rem) = slot_and_remainder(width, height, key);
    if height == 0 {
        if node.bitmap.get(slot) {
            let idx = node.bitmap.rank(slot);
            return Ok(Some(std::mem::replace(&mut node.values[idx], value)));
        }
        node.bitmap.set(slot);
        let idx = node.bitmap.rank(slot);
        node.values.insert(idx, value);
        return Ok(None);
    }
    if !node.bitmap.get(slot) {
        node.bitmap.set(slot);
        let idx = node.bitmap.rank(slot);
        node.links
            .insert(idx, Item::Ptr(Box::new(Node::empty(width as usize))));
        let item = &mut node.links[idx];
        let Item::Ptr(child) = item else { unreachable!() };
        return set_rec(store, child, width, height - 1, rem, value);
    }
    let idx = node.bitmap.rank(slot);
    if let Item::Cid(cid) = &node.links[idx] {
        let bytes = store.get(cid)?;
        let loaded = if height - 1 == 0 {
            node::decode_leaf(&bytes)?
        } else {
            node::decode_interior(&bytes)?
        };
        node.links[idx] = Item::Ptr(Box::new(loaded));
    }
    let Item::Ptr(child) = &mut node.links[idx] else {
        unreachable!()
    };
    set_rec(store, child, width, height - 1, rem, value)
}

fn get_rec<BS: BlockStore>(
    store: &BS,
    node: &Node,
    width: u64,
    height: u32,
    key: u64,
) -> Result<Option<Vec<u8>>, Error> {
    let (slot, rem) = slot_and_remainder(width, height, key);
    if !node.bitmap.get(slot) {
        return Ok(None);
    }
    let idx = node.bitmap.rank(slot);
    if height == 0 {
        return Ok(Some(node.values[idx].clone()));
    }
    match &node.links[idx] {
        Item::Ptr(child) => get_rec(store, child, width, height - 1, rem),
        Item::Cid(cid) => {
            let bytes = store.get(cid)?;
            let child = if height - 1 == 0 {
                node::decode_leaf(&bytes)?
            } else {
                node::decode_interior(&bytes)?
            };
            get_rec(store, &child, width, height - 1, rem)
        }
    }
}

fn remove_rec<BS: BlockStore>(
    store: &BS,
    node: &mut Node,
    width: u64,
    height: u32,
    key: u64,
) -> Result<Option<Vec<u8>>, Error> {
    let (slot, rem) = slot_and_remainder(width, height, key);
    if !node.bitmap.get(slot) {
        return Ok(None);
    }
    let idx = node.bitmap.rank(slot);
    if height == 0 {
        let v = node.values.remove(idx);
        node.bitmap.clear(slot);
        return Ok(Some(v));
    }
    if let Item::Cid(cid) = &node.links[idx] {
        let bytes = store.get(cid)?;
        let loaded = if height - 1 == 0 {
            node::decode_leaf(&bytes)?
        } else {
            node::decode_interior(&bytes)?
        };
        node.links[idx] = Item::Ptr(Box::new(loaded));
    }
    let removed = {
        let Item::Ptr(child) = &mut node.links[idx] else {
            unreachable!()
        };
        remove_rec(store, child, width, height - 1, rem)?
    };
    if removed.is_some() {
        let Item::Ptr(child) = &node.links[idx] else {
            unreachable!()
        };
        if child.is_empty() {
            node.links.remove(idx);
            node.bitmap.clear(slot);
        }
    }
    Ok(removed)
}

fn visit_rec<BS: BlockStore, F>(
    store: &BS,
    node: &Node,
    width: u64,
    height: u32,
    base: u64,
    f: &mut F,
) -> Result<(), Error>
where
    F: FnMut(u64, &[u8]) -> Result<(), Error>,
{
    if height == 0 {
        let mut idx = 0usize;
        for slot in 0..width as usize {
            if node.bitmap.get(slot) {
                f(base + slot as u64, &node.values[idx])?;
                idx += 1;
            }
        }
        return Ok(());
    }
    let step = subtree_width(width, height) as u64;
    let mut idx = 0usize;
    for slot in 0..width as usize {
        if !node.bitmap.get(slot) {
            continue;
        }
        let child_base = base + slot as u64 * step;
        match &node.links[idx] {
            Item::Ptr(child) => visit_rec(store, child, width, height - 1, child_base, f)?,
            Item::Cid(cid) => {
                let bytes = store.get(cid)?;
                let child = if height - 1 == 0 {
                    node::decode_leaf(&bytes)?
                } else {
                    node::decode_interior(&bytes)?
                };
                visit_rec(store, &child, width, height - 1, child_base, f)?;
            }
        }
        idx += 1;
    }
    Ok(())
}

fn flush_rec<BS: BlockStore>(store: &BS, node: &mut Node) -> Result<(), Error> {
    for item in &mut node.links {
        if let Item::Ptr(child) = item {
            flush_rec(store, child)?;
            let cid = store.set_cbor(child.as_ref())?;
            *item = Item::Cid(cid);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ipld_blockstore::MemoryBlockStore;

    #[test]
    fn set_get_remove() {
        let store = MemoryBlockStore::new();
        let mut amt = Amt::new(&store).unwrap();
        amt.set(0, b"a".to_vec()).unwrap();
        amt.set(5, b"b".to_vec()).unwrap();
        assert_eq!(amt.get(0).unwrap(), Some(b"a".to_vec()));
        assert_eq!(amt.get(5).unwrap(), Some(b"b".to_vec()));
        assert_eq!(amt.count(), 2);
        assert_eq!(amt.remove(0).unwrap(), Some(b"a".to_vec()));
        assert_eq!(amt.get(0).unwrap(), None);
        assert_eq!(amt.count(), 1);
    }

    #[test]
    fn grows_height_for_large_keys() {
        let store = MemoryBlockStore::new();
        let mut amt = Amt::new(&store).unwrap();
        amt.set(0, b"small".to_vec()).unwrap();
        amt.set(10_000, b"big".to_vec()).unwrap();
        assert!(amt.height > 0);
        assert_eq!(amt.get(0).unwrap(), Some(b"small".to_vec()));
        assert_eq!(amt.get(10_000).unwrap(), Some(b"big".to_vec()));
    }

    #[test]
    fn shrinks_height_after_remove() {
        let store = MemoryBlockStore::new();
        let mut amt = Amt::new(&store).unwrap();
        amt.set(10_000, b"big".to_vec()).unwrap();
        let grown_height = amt.height;
        assert!(grown_height > 0);
        amt.remove(10_000).unwrap();
        assert_eq!(amt.height, 0);
    }

    #[test]
    fn index_too_big_rejected() {
        let store = MemoryBlockStore::new();
        let mut amt = Amt::new(&store).unwrap();
        assert!(amt.set(MAX_INDEX - 1, vec![1]).is_ok());
        assert!(matches!(
            amt.set(MAX_INDEX, vec![1]),
            Err(Error::IndexTooBig(_))
        ));
    }

    #[test]
    fn flush_round_trips_through_store() {
        let store = MemoryBlockStore::new();
        let mut amt = Amt::new(&store).unwrap();
        for i in 0..200u64 {
            amt.set(i, i.to_be_bytes().to_vec()).unwrap();
        }
        let cid = amt.flush().unwrap();
        let loaded = Amt::load(&store, &cid).unwrap();
        assert_eq!(loaded.count(), 200);
        for i in 0..200u64 {
            assert_eq!(loaded.get(i).unwrap(), Some(i.to_be_bytes().to_vec()));
        }
    }

    #[test]
    fn visit_is_ascending() {
        let store = MemoryBlockStore::new();
        let mut amt = Amt::new(&store).unwrap();
        for i in [50u64, 2, 9000, 1, 10] {
            amt.set(i, i.to_be_bytes().to_vec()).unwrap();
        }
        let mut seen = Vec::new();
        amt.visit(|k, _| {
            seen.push(k);
            Ok(())
        })
        .unwrap();
        let mut sorted = seen.clone();
        sorted.sort();
        assert_eq!(seen, sorted);
        assert_eq!(seen, vec![1, 2, 10, 50, 9000]);
    }

    #[test]
    fn insertion_order_independent_flush_cid() {
        let store1 = MemoryBlockStore::new();
        let mut a = Amt::new(&store1).unwrap();
        for i in [3u64, 1, 2] {
            a.set(i, vec![i as u8]).unwrap();
        }
        let store2 = MemoryBlockStore::new();
        let mut b = Amt::new(&store2).unwrap();
        for i in [1u64, 2, 3] {
            b.set(i, vec![i as u8]).unwrap();
        }
        assert_eq!(a.flush().unwrap(), b.flush().unwrap());
    }

    #[test]
    fn empty_flush_is_deterministic() {
        let store = MemoryBlockStore::new();
        let mut a = Amt::new(&store).unwrap();
        let mut b = Amt::new(&store).unwrap();
        assert_eq!(a.flush().unwrap(), b.flush().unwrap());
    }
}
