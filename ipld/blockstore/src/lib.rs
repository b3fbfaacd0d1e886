// Copyright 2019-2026 Fuhon Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

//! The CID-keyed IPLD object store (spec §4.2) and its CAR-backed,
//! append-only implementation with an external offset index (spec §6).

mod car;
mod error;

pub use car::{CarStoreConfig, CidsIpld};
pub use error::Error;

use std::collections::HashMap;

use ipld_cid::CbCid;
use parking_lot::RwLock;
use serde::{de::DeserializeOwned, Serialize};

/// `CID -> bytes` map the rest of the chain-sync stack is built on top of.
pub trait BlockStore {
    fn contains(&self, cid: &CbCid) -> Result<bool, Error>;
    fn get(&self, cid: &CbCid) -> Result<Vec<u8>, Error>;
    fn set(&self, cid: &CbCid, bytes: &[u8]) -> Result<(), Error>;

    /// Serializes `value` as canonical CBOR, derives its key as the
    /// Blake2b-256 hash of the encoded bytes, and stores it.
    fn set_cbor<T: Serialize>(&self, value: &T) -> Result<CbCid, Error> {
        let bytes = encoding::to_vec(value)?;
        let cid = CbCid::hash(&bytes);
        self.set(&cid, &bytes)?;
        Ok(cid)
    }

    fn get_cbor<T: DeserializeOwned>(&self, cid: &CbCid) -> Result<T, Error> {
        let bytes = self.get(cid)?;
        Ok(encoding::from_slice(&bytes)?)
    }
}

/// An in-memory [`BlockStore`], used for tests and for the genesis bootstrap
/// path before a repo directory is available.
#[derive(Default)]
pub struct MemoryBlockStore {
    map: RwLock<HashMap<CbCid, Vec<u8>>>,
}

impl MemoryBlockStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BlockStore for MemoryBlockStore {
    fn contains(&self, cid: &CbCid) -> Result<bool, Error> {
        Ok(self.map.read().contains_key(cid))
    }

    fn get(&self, cid: &CbCid) -> Result<Vec<u8>, Error> {
        self.map.read().get(cid).cloned().ok_or(Error::NotFound)
    }

    fn set(&self, cid: &CbCid, bytes: &[u8]) -> Result<(), Error> {
        self.map.write().entry(*cid).or_insert_with(|| bytes.to_vec());
        Ok(())
    }
}

impl<T: BlockStore + ?Sized> BlockStore for std::sync::Arc<T> {
    fn contains(&self, cid: &CbCid) -> Result<bool, Error> {
        (**self).contains(cid)
    }
    fn get(&self, cid: &CbCid) -> Result<Vec<u8>, Error> {
        (**self).get(cid)
    }
    fn set(&self, cid: &CbCid, bytes: &[u8]) -> Result<(), Error> {
        (**self).set(cid, bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_round_trip() {
        let store = MemoryBlockStore::new();
        let cid = store.set_cbor(&42u64).unwrap();
        assert!(store.contains(&cid).unwrap());
        let v: u64 = store.get_cbor(&cid).unwrap();
        assert_eq!(v, 42);
    }

    #[test]
    fn missing_cid_is_not_found() {
        let store = MemoryBlockStore::new();
        let cid = CbCid::hash(b"nope");
        assert!(!store.contains(&cid).unwrap());
        assert!(matches!(store.get(&cid), Err(Error::NotFound)));
    }
}
