// Copyright 2019-2026 Fuhon Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

//! The domain event types fanned out by [`crate::Events`]. Grounded on
//! `core/node/events.hpp` in the original implementation, plus
//! `HeadInterpreted` which the original's `interpret_job.hpp` signals
//! through a plain callback rather than the shared event bus — folded in
//! here since spec §6 lists it alongside the others.

use std::collections::HashSet;

use blocks::{BlockHeader, TipsetKey};
use ipld_cid::CbCid;
use num_bigint::BigInt;

use crate::PeerId;

#[derive(Clone, Debug)]
pub struct PeerConnected {
    pub peer_id: PeerId,
    pub protocols: HashSet<String>,
}

#[derive(Clone, Debug)]
pub struct PeerDisconnected {
    pub peer_id: PeerId,
}

#[derive(Clone, Debug)]
pub struct PeerLatency {
    pub peer_id: PeerId,
    pub latency_usec: u64,
}

#[derive(Clone, Debug)]
pub struct TipsetFromHello {
    pub peer_id: PeerId,
    pub tipset: TipsetKey,
    pub height: u64,
    pub weight: BigInt,
}

/// A gossipped block together with the CIDs of the messages it includes
/// (the messages themselves travel separately, over `/fil/msgs/<network>`).
#[derive(Clone, Debug)]
pub struct BlockWithCids {
    pub header: BlockHeader,
    pub bls_messages: Vec<CbCid>,
    pub secp_messages: Vec<CbCid>,
}

#[derive(Clone, Debug)]
pub struct BlockFromPubSub {
    pub from: PeerId,
    pub block_cid: CbCid,
    pub block: BlockWithCids,
}

#[derive(Clone, Debug)]
pub struct MessageFromPubSub {
    pub from: PeerId,
    pub cid: CbCid,
    /// Raw signed-message bytes; the wallet/message-pool's signature and
    /// nonce checks are out of scope (spec §1).
    pub message_bytes: Vec<u8>,
}

#[derive(Clone, Debug)]
pub struct PossibleHead {
    pub source: Option<PeerId>,
    pub head: TipsetKey,
    pub height: u64,
}

#[derive(Clone, Debug)]
pub struct CurrentHead {
    pub tipset: TipsetKey,
    pub weight: BigInt,
}

#[derive(Clone, Debug)]
pub struct HeadInterpreted {
    pub head: TipsetKey,
    pub state_root: CbCid,
    pub message_receipts: CbCid,
    pub weight: BigInt,
}

#[derive(Clone, Debug)]
pub struct FatalError {
    pub message: String,
}
