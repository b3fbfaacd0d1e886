// Copyright 2019-2026 Fuhon Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

//! [`BlockHeader`]: the structured record addressed by [`CbCid`] that forms
//! the nodes of the tipset graph (spec §3).

use std::sync::OnceLock;

use encoding::tuple::*;
use ipld_cid::CbCid;
use num_bigint::BigInt;

use crate::ticket::{ElectionProof, Ticket};
use crate::tipset::TipsetKey;
use crate::Address;

/// Header of a block. Only the fields the chain-sync core actually reads or
/// hashes are modeled; actor-execution-only fields (e.g. per-actor proofs)
/// live with the (out-of-scope) VM.
///
/// Tuple/array-encoded (`CBOR_TUPLE(BlockHeader, ...)` in the original) so
/// the wire bytes match the reference Filecoin implementations, not this
/// codec's default map-of-field-names struct form.
#[derive(Clone, Debug, Serialize_tuple, Deserialize_tuple)]
pub struct BlockHeader {
    pub miner_address: Address,
    pub parents: TipsetKey,
    #[serde(with = "crate::bigint_cbor")]
    pub parent_weight: BigInt,
    pub parent_state_root: CbCid,
    pub parent_message_receipts: CbCid,
    pub messages: CbCid,
    pub height: u64,
    pub timestamp: u64,
    pub ticket: Ticket,
    pub election_proof: Option<ElectionProof>,
    #[serde(with = "serde_bytes", default)]
    pub block_sig: Option<Vec<u8>>,

    #[serde(skip)]
    cached_cid: OnceLock<CbCid>,
}

impl PartialEq for BlockHeader {
    fn eq(&self, other: &Self) -> bool {
        self.cid() == other.cid()
    }
}

impl Eq for BlockHeader {}

impl BlockHeader {
    pub fn builder() -> BlockHeaderBuilder {
        BlockHeaderBuilder::default()
    }

    pub fn parents(&self) -> &TipsetKey {
        &self.parents
    }

    pub fn parent_weight(&self) -> &BigInt {
        &self.parent_weight
    }

    pub fn height(&self) -> u64 {
        self.height
    }

    pub fn ticket(&self) -> &Ticket {
        &self.ticket
    }

    pub fn miner_address(&self) -> &Address {
        &self.miner_address
    }

    /// The header's CID: `CbCid::hash(encode(self))`, cached after first use
    /// (spec §8: `CbCid::hash(encode(h)) == cid(h)`).
    pub fn cid(&self) -> CbCid {
        *self.cached_cid.get_or_init(|| {
            let bytes = encoding::to_vec(self).expect("block header always encodes");
            CbCid::hash(&bytes)
        })
    }
}

/// Builder mirroring the teacher's `derive_builder`-based construction, kept
/// as plain hand-written setters since every field here is required by spec
/// §3 invariants (no meaningful "optional" defaults beyond `None` proofs).
#[derive(Default)]
pub struct BlockHeaderBuilder {
    miner_address: Option<Address>,
    parents: Option<TipsetKey>,
    parent_weight: Option<BigInt>,
    parent_state_root: Option<CbCid>,
    parent_message_receipts: Option<CbCid>,
    messages: Option<CbCid>,
    height: u64,
    timestamp: u64,
    ticket: Ticket,
    election_proof: Option<ElectionProof>,
    block_sig: Option<Vec<u8>>,
}

macro_rules! setter {
    ($name:ident : $ty:ty) => {
        pub fn $name(mut self, v: $ty) -> Self {
            self.$name = v;
            self
        }
    };
}

impl BlockHeaderBuilder {
    pub fn miner_address(mut self, v: Address) -> Self {
        self.miner_address = Some(v);
        self
    }
    pub fn parents(mut self, v: TipsetKey) -> Self {
        self.parents = Some(v);
        self
    }
    pub fn parent_weight(mut self, v: BigInt) -> Self {
        self.parent_weight = Some(v);
        self
    }
    pub fn parent_state_root(mut self, v: CbCid) -> Self {
        self.parent_state_root = Some(v);
        self
    }
    pub fn parent_message_receipts(mut self, v: CbCid) -> Self {
        self.parent_message_receipts = Some(v);
        self
    }
    pub fn messages(mut self, v: CbCid) -> Self {
        self.messages = Some(v);
        self
    }
    setter!(height: u64);
    setter!(timestamp: u64);
    setter!(ticket: Ticket);
    setter!(election_proof: Option<ElectionProof>);
    setter!(block_sig: Option<Vec<u8>>);

    pub fn build(self) -> Result<BlockHeader, &'static str> {
        Ok(BlockHeader {
            miner_address: self.miner_address.ok_or("miner_address required")?,
            parents: self.parents.ok_or("parents required")?,
            parent_weight: self.parent_weight.unwrap_or_default(),
            parent_state_root: self.parent_state_root.ok_or("parent_state_root required")?,
            parent_message_receipts: self
                .parent_message_receipts
                .ok_or("parent_message_receipts required")?,
            messages: self.messages.ok_or("messages required")?,
            height: self.height,
            timestamp: self.timestamp,
            ticket: self.ticket,
            election_proof: self.election_proof,
            block_sig: self.block_sig,
            cached_cid: OnceLock::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::sample_header;
    use crate::TipsetKey;

    #[test]
    fn cid_matches_spec_invariant() {
        let h = sample_header(1, TipsetKey::default(), b"x");
        let bytes = encoding::to_vec(&h).unwrap();
        assert_eq!(CbCid::hash(&bytes), h.cid());
    }

    #[test]
    fn round_trips_through_cbor() {
        let h = sample_header(5, TipsetKey::default(), b"y");
        let bytes = encoding::to_vec(&h).unwrap();
        let back: BlockHeader = encoding::from_slice(&bytes).unwrap();
        assert_eq!(h.height(), back.height());
        assert_eq!(h.cid(), back.cid());
    }
}
