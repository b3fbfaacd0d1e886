// Copyright 2019-2026 Fuhon Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

//! Content identifiers. [`CbCid`] specializes the general-purpose [`cid::Cid`]
//! to the V1/DagCbor/Blake2b-256 shape used as the compact 32-byte key for
//! every block and tipset in the chain graph.

mod error;

pub use cid::{Cid, Version};
pub use error::Error;
use multihash_codetable::{Code, MultihashDigest};

/// IPLD codec for raw bytes (no further interpretation).
pub const RAW: u64 = 0x55;
/// IPLD codec for DAG-CBOR encoded values.
pub const DAG_CBOR: u64 = 0x71;
/// Multicodec code for Blake2b-256, matching `multihash_codetable::Code::Blake2b256`.
const BLAKE2B_256_CODE: u64 = 0xb220;

/// Hashes `bytes` with Blake2b-256 and builds a DAG-CBOR CID from it.
pub fn new_from_cbor(bytes: &[u8]) -> Cid {
    let hash = Code::Blake2b256.digest(bytes);
    Cid::new_v1(DAG_CBOR, hash)
}

/// A [`Cid`] known at the type level to be V1/DagCbor/Blake2b-256: the only
/// shape the tipset graph and block store use as a dictionary key. Carrying
/// this as a distinct type lets call sites assume a fixed 32-byte digest
/// without re-checking version/codec/hash-function on every access.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CbCid(Cid);

impl CbCid {
    /// Hashes `bytes` and returns the resulting `CbCid`.
    pub fn hash(bytes: &[u8]) -> Self {
        CbCid(new_from_cbor(bytes))
    }

    /// Validates that `cid` has the required version/codec/hash-function and
    /// wraps it, failing otherwise.
    pub fn try_from_cid(cid: Cid) -> Result<Self, Error> {
        if cid.version() != Version::V1 {
            return Err(Error::InvalidCidVersion);
        }
        if cid.codec() != DAG_CBOR {
            return Err(Error::UnknownCodec);
        }
        if cid.hash().code() != BLAKE2B_256_CODE {
            return Err(Error::UnsupportedHash);
        }
        Ok(CbCid(cid))
    }

    pub fn cid(&self) -> &Cid {
        &self.0
    }

    /// The raw 32-byte Blake2b-256 digest, used as a compact map key.
    pub fn digest_bytes(&self) -> &[u8] {
        self.0.hash().digest()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.0.to_bytes()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        let cid = Cid::try_from(bytes).map_err(|_| Error::ParsingError)?;
        Self::try_from_cid(cid)
    }
}

impl std::fmt::Debug for CbCid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::fmt::Display for CbCid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<CbCid> for Cid {
    fn from(c: CbCid) -> Cid {
        c.0
    }
}

impl serde::Serialize for CbCid {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_newtype_struct(
            encoding::LINK_SENTINEL,
            serde_bytes::Bytes::new(&self.0.to_bytes()),
        )
    }
}

impl<'de> serde::Deserialize<'de> for CbCid {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let bytes = serde_bytes::ByteBuf::deserialize(deserializer)?;
        let cid = Cid::try_from(bytes.into_vec())
            .map_err(|e| serde::de::Error::custom(format!("invalid cid bytes: {e}")))?;
        CbCid::try_from_cid(cid).map_err(serde::de::Error::custom)
    }
}

/// Blake2b-256 hash of the concatenated CIDs of a [canonical tipset
/// key](https://docs.rs/fuhon-blocks), used as a compact dictionary key for
/// branches and the tipset index.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct TipsetHash([u8; 32]);

impl TipsetHash {
    pub fn of(cids: &[CbCid]) -> Self {
        let mut buf = Vec::with_capacity(cids.len() * 38);
        for c in cids {
            buf.extend_from_slice(&c.to_bytes());
        }
        let digest = blake2b_simd::Params::new().hash_length(32).hash(&buf);
        let mut out = [0u8; 32];
        out.copy_from_slice(digest.as_bytes());
        TipsetHash(out)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        TipsetHash(bytes)
    }
}

impl std::fmt::Debug for TipsetHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_deterministic() {
        let a = CbCid::hash(b"hello");
        let b = CbCid::hash(b"hello");
        assert_eq!(a, b);
        assert_ne!(a, CbCid::hash(b"world"));
    }

    #[test]
    fn rejects_wrong_shape() {
        let raw = Cid::new_v1(RAW, Code::Blake2b256.digest(b"x"));
        assert!(CbCid::try_from_cid(raw).is_err());
    }

    #[test]
    fn tipset_hash_order_sensitive() {
        let a = CbCid::hash(b"a");
        let b = CbCid::hash(b"b");
        assert_ne!(TipsetHash::of(&[a, b]), TipsetHash::of(&[b, a]));
    }

    #[quickcheck_macros::quickcheck]
    fn round_trip_bytes(data: Vec<u8>) -> bool {
        let c = CbCid::hash(&data);
        CbCid::from_bytes(&c.to_bytes()).unwrap() == c
    }
}
