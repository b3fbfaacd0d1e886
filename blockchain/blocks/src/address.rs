// Copyright 2019-2026 Fuhon Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

//! A deliberately opaque miner address.
//!
//! The actor/address subsystem (protocol bytes, checksums, network
//! prefixes) is out of scope per spec §1 — the core only needs to carry a
//! `miner` identity through a block header and compare it for equality, so
//! this keeps the raw bytes the network layer already validated rather than
//! reimplementing address parsing.

#[derive(Clone, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct Address(#[serde(with = "serde_bytes")] Vec<u8>);

impl Address {
    pub fn new(bytes: Vec<u8>) -> Self {
        Address(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Debug for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Address({})", hex::encode(&self.0))
    }
}

#[cfg(test)]
impl quickcheck::Arbitrary for Address {
    fn arbitrary(g: &mut quickcheck::Gen) -> Self {
        Address(Vec::<u8>::arbitrary(g))
    }
}
