// Copyright 2019-2026 Fuhon Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

//! Deterministic binary CBOR codec used across the chain sync stack.
//!
//! Supports major types 0,1,2,3,4,5,6 (tag 42 only, for CIDs) and 7
//! (bool/null/float). Integers are always encoded in their shortest form.
//! Struct/map fields are emitted in canonical "shortest key, then
//! lexicographic" order so two semantically equal values always produce
//! identical bytes.

mod de;
mod error;
mod ser;

pub use de::{from_slice, from_slice_with_raw, from_slice_with_visitor};
pub use error::Error;
pub use ser::to_vec;

/// Re-export of the tuple/array-encoding derive macros, for the wire and
/// on-chain structs that must match the reference Filecoin CBOR form
/// (`CBOR_TUPLE` in the original) rather than this codec's default
/// map-of-field-names struct encoding.
pub mod tuple {
    pub use serde_tuple::{self, Deserialize_tuple, Serialize_tuple};
}

/// Sentinel newtype-struct name used by [`ipld_cid`] to signal "serialize
/// this byte string as a CBOR tag-42 CID link" without a dependency on the
/// CID type itself. Mirrors the private-link convention used by the
/// `serde_ipld_dagcbor`/`libipld` ecosystem.
pub const LINK_SENTINEL: &str = "$__fuhon_private_cbor_link__";

/// Sentinel used to capture the raw wire bytes of whatever value occupies a
/// field, so callers can hash or re-verify a signature over the untouched
/// encoding of a sub-message (spec's "nested raw" primitive).
pub const RAW_SENTINEL: &str = "$__fuhon_private_cbor_raw__";

/// A CBOR value whose exact wire bytes are captured verbatim rather than
/// parsed, for signature/hash payloads that must round-trip byte-for-byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Raw(pub Vec<u8>);

impl serde::Serialize for Raw {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        // The bytes in `self.0` are already a complete, valid CBOR item;
        // emit them unchanged by round-tripping through the newtype hook.
        serializer.serialize_newtype_struct(RAW_SENTINEL, serde_bytes::Bytes::new(&self.0))
    }
}

impl<'de> serde::Deserialize<'de> for Raw {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct RawVisitor;
        impl<'de> serde::de::Visitor<'de> for RawVisitor {
            type Value = Raw;
            fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.write_str("raw cbor bytes")
            }
            fn visit_borrowed_bytes<E: serde::de::Error>(self, v: &'de [u8]) -> Result<Raw, E> {
                Ok(Raw(v.to_vec()))
            }
            fn visit_bytes<E: serde::de::Error>(self, v: &[u8]) -> Result<Raw, E> {
                Ok(Raw(v.to_vec()))
            }
        }
        deserializer.deserialize_newtype_struct(RAW_SENTINEL, RawVisitor)
    }
}
