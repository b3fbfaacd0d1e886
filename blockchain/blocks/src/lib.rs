// Copyright 2019-2026 Fuhon Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

//! Block header and tipset model (spec §3, §4.5): the node type of the
//! tipset graph the `chain` crate indexes and `chain_sync` fetches.

mod address;
mod bigint_cbor;
mod errors;
mod header;
mod msg_meta;
mod ticket;
mod tipset;

pub use address::Address;
pub use errors::Error;
pub use header::{BlockHeader, BlockHeaderBuilder};
pub use msg_meta::{amt_contents, amt_root_of, MsgMeta};
pub use ticket::{ElectionProof, Ticket};
pub use tipset::{Tipset, TipsetKey};

#[cfg(test)]
pub(crate) mod test_util {
    use super::*;
    use ipld_cid::CbCid;

    /// Builds a syntactically-valid header for unit tests; `salt`
    /// distinguishes otherwise-identical headers (via the ticket) so they
    /// sort deterministically and hash distinctly.
    pub fn sample_header(height: u64, parents: TipsetKey, salt: &[u8]) -> BlockHeader {
        BlockHeader::builder()
            .miner_address(Address::new(b"miner".to_vec()))
            .parents(parents)
            .parent_weight(num_bigint::BigInt::from(height))
            .parent_state_root(CbCid::hash(b"state"))
            .parent_message_receipts(CbCid::hash(b"receipts"))
            .messages(CbCid::hash(b"messages"))
            .height(height)
            .timestamp(height * 30)
            .ticket(Ticket::new(salt.to_vec()))
            .election_proof(None)
            .block_sig(None)
            .build()
            .unwrap()
    }
}
