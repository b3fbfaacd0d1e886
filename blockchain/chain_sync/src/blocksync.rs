// Copyright 2019-2026 Fuhon Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

//! The blocksync requester (spec §4.11, protocol `/fil/sync/blk/0.0.1`):
//! wire types, the rating deltas applied to request outcomes, and
//! [`BlocksyncRequest`], the one-shot fetch that resolves exactly once.
//! Grounded on `core/sync/blocksync_client.hpp`'s request/response shape and
//! `core/sync/blocksync_server.hpp`'s status codes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use blocks::{BlockHeader, MsgMeta, Tipset, TipsetKey};
use encoding::tuple::*;
use events::PeerId;
use ipld_blockstore::BlockStore;
use ipld_cid::CbCid;
use serde::{Deserialize, Serialize};

use crate::errors::Error;

/// Named rating deltas applied to a [`BlocksyncRequest`] outcome (spec
/// §4.11's supplemented exact values).
pub mod rating {
    pub const COMPLETE: i64 = 100;
    pub const NONEMPTY_CHAIN: i64 = 50;
    pub const PER_SAVED_ITEM: i64 = 5;
    pub const EMPTY_CHAIN: i64 = -50;
    pub const TIMEOUT_OR_STREAM_ERROR: i64 = -200;
    pub const INCONSISTENCY: i64 = -500;
    pub const CID_MISMATCH: i64 = -700;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlocksyncOptions {
    BlocksOnly = 1,
    MessagesOnly = 2,
    BlocksAndMessages = 3,
}

impl BlocksyncOptions {
    pub fn wants_messages(self) -> bool {
        !matches!(self, BlocksyncOptions::BlocksOnly)
    }
}

impl serde::Serialize for BlocksyncOptions {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        (*self as u64).serialize(serializer)
    }
}

impl<'de> serde::Deserialize<'de> for BlocksyncOptions {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match u64::deserialize(deserializer)? {
            1 => Ok(BlocksyncOptions::BlocksOnly),
            2 => Ok(BlocksyncOptions::MessagesOnly),
            3 => Ok(BlocksyncOptions::BlocksAndMessages),
            other => Err(serde::de::Error::custom(format!("unknown blocksync option {other}"))),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlocksyncStatus {
    Complete,
    Partial,
    BlockNotFound,
    GoAway,
    InternalError,
    BadRequest,
}

impl BlocksyncStatus {
    fn code(self) -> u64 {
        match self {
            BlocksyncStatus::Complete => 0,
            BlocksyncStatus::Partial => 101,
            BlocksyncStatus::BlockNotFound => 201,
            BlocksyncStatus::GoAway => 202,
            BlocksyncStatus::InternalError => 203,
            BlocksyncStatus::BadRequest => 204,
        }
    }

    fn from_code(code: u64) -> Option<Self> {
        Some(match code {
            0 => BlocksyncStatus::Complete,
            101 => BlocksyncStatus::Partial,
            201 => BlocksyncStatus::BlockNotFound,
            202 => BlocksyncStatus::GoAway,
            203 => BlocksyncStatus::InternalError,
            204 => BlocksyncStatus::BadRequest,
            _ => return None,
        })
    }
}

impl serde::Serialize for BlocksyncStatus {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.code().serialize(serializer)
    }
}

impl<'de> serde::Deserialize<'de> for BlocksyncStatus {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let code = u64::deserialize(deserializer)?;
        BlocksyncStatus::from_code(code).ok_or_else(|| serde::de::Error::custom(format!("unknown blocksync status {code}")))
    }
}

/// Tuple-encoded (`CBOR_TUPLE(Request, block_cids, depth, options)` in the
/// original) to match the reference wire form.
#[derive(Clone, Debug, Serialize_tuple, Deserialize_tuple)]
pub struct WireRequest {
    pub block_cids: Vec<CbCid>,
    pub depth: u64,
    pub options: BlocksyncOptions,
}

/// Tuple-encoded (`CBOR_TUPLE(TipsetBundle::Messages, ...)` in the
/// original).
#[derive(Clone, Debug, Default, Serialize_tuple, Deserialize_tuple)]
pub struct TipsetMessages {
    pub bls_msgs: Vec<CbCid>,
    pub bls_msg_includes: Vec<Vec<u64>>,
    pub secp_msgs: Vec<CbCid>,
    pub secp_msg_includes: Vec<Vec<u64>>,
}

/// Tuple-encoded (`CBOR_TUPLE(TipsetBundle, blocks, messages)` in the
/// original). `messages` is the original's `boost::optional<Messages>`,
/// encoded positionally as `null`/value like any other `Option<T>`, not
/// omitted, so the tuple's arity stays fixed.
#[derive(Clone, Debug, Serialize_tuple, Deserialize_tuple)]
pub struct TipsetBundle {
    pub blocks: Vec<BlockHeader>,
    #[serde(default)]
    pub messages: Option<TipsetMessages>,
}

/// Tuple-encoded (`CBOR_TUPLE(Response, status, message, chain)` in the
/// original).
#[derive(Clone, Debug, Serialize_tuple, Deserialize_tuple)]
pub struct WireResponse {
    pub status: BlocksyncStatus,
    pub message: String,
    pub chain: Vec<TipsetBundle>,
}

/// A blocksync substream, abstracting the libp2p transport (out of scope,
/// spec §1): send one request, read back exactly one response.
#[async_trait::async_trait]
pub trait SyncStream: Send {
    async fn send_request(&mut self, req: &WireRequest) -> Result<(), Error>;
    async fn recv_response(&mut self) -> Result<WireResponse, Error>;
    fn close(&mut self);
}

/// Dials a peer's blocksync protocol substream.
#[async_trait::async_trait]
pub trait NetworkHost: Send + Sync {
    async fn dial_blocksync(&self, peer: &PeerId) -> Result<Box<dyn SyncStream>, Error>;
}

/// Outcome of one [`BlocksyncRequest`] (spec §4.11).
#[derive(Clone, Debug)]
pub struct BlocksyncResult {
    pub peer_id: PeerId,
    pub rating_delta: i64,
    /// The requested tipset itself, if it (and, when requested, its
    /// messages) could be obtained — locally or from the peer.
    pub blocks_available: Vec<Tipset>,
    /// Validated ancestor tipsets, nearest parent first (spec §4.11:
    /// "ascending parentage" — resolved here as ascending generation count
    /// back from the requested tipset, ordered nearest-to-furthest).
    pub parents: Vec<Tipset>,
    pub error: Option<String>,
}

fn load_tipset_from_store<S: BlockStore>(
    store: &S,
    cids: &[CbCid],
    options: BlocksyncOptions,
) -> Result<Tipset, Error> {
    let mut headers = Vec::with_capacity(cids.len());
    for cid in cids {
        let header: BlockHeader = store.get_cbor(cid)?;
        if options.wants_messages() {
            let _meta: MsgMeta = store.get_cbor(&header.messages)?;
        }
        headers.push(header);
    }
    Ok(Tipset::create(headers)?)
}

/// Stores one bundle's headers, reconstructing and checking the `MsgMeta`
/// roots against `header.messages` when messages are present (spec §4.11's
/// "block storage discipline").
fn store_bundle<S: BlockStore>(store: &S, bundle: &TipsetBundle) -> Result<Tipset, Error> {
    if bundle.blocks.is_empty() {
        return Err(Error::InconsistentResponse("tipset bundle with no blocks".into()));
    }

    if let Some(msgs) = &bundle.messages {
        if msgs.bls_msg_includes.len() != bundle.blocks.len() || msgs.secp_msg_includes.len() != bundle.blocks.len() {
            return Err(Error::InconsistentResponse("message include index count mismatch".into()));
        }
        for (i, header) in bundle.blocks.iter().enumerate() {
            let bls = resolve_includes(&msgs.bls_msgs, &msgs.bls_msg_includes[i])?;
            let secp = resolve_includes(&msgs.secp_msgs, &msgs.secp_msg_includes[i])?;
            let meta = MsgMeta::build(store, &bls, &secp)?;
            let meta_cid = store.set_cbor(&meta)?;
            if meta_cid != header.messages {
                return Err(Error::StoreCidsMismatch);
            }
        }
    }

    for header in &bundle.blocks {
        store.set_cbor(header)?;
    }
    Ok(Tipset::create(bundle.blocks.clone())?)
}

fn resolve_includes(pool: &[CbCid], includes: &[u64]) -> Result<Vec<CbCid>, Error> {
    includes
        .iter()
        .map(|&idx| {
            pool.get(idx as usize)
                .copied()
                .ok_or_else(|| Error::InconsistentResponse("message include index out of range".into()))
        })
        .collect()
}

async fn run_request<S: BlockStore + Send + Sync + 'static>(
    host: Arc<dyn NetworkHost>,
    store: S,
    peer_id: PeerId,
    block_cids: Vec<CbCid>,
    depth: u64,
    options: BlocksyncOptions,
    timeout: Duration,
) -> BlocksyncResult {
    if options == BlocksyncOptions::MessagesOnly {
        return BlocksyncResult {
            peer_id,
            rating_delta: 0,
            blocks_available: Vec::new(),
            parents: Vec::new(),
            error: Some(Error::NotImplemented("blocksync MessagesOnly").to_string()),
        };
    }

    if block_cids.iter().all(|c| store.contains(c).unwrap_or(false)) {
        if let Ok(ts) = load_tipset_from_store(&store, &block_cids, options) {
            return BlocksyncResult {
                peer_id,
                rating_delta: rating::COMPLETE,
                blocks_available: vec![ts],
                parents: Vec::new(),
                error: None,
            };
        }
    }

    let req = WireRequest {
        block_cids,
        depth,
        options,
    };
    let dial_and_fetch = async {
        let mut stream = host.dial_blocksync(&peer_id).await?;
        stream.send_request(&req).await?;
        let resp = stream.recv_response().await;
        stream.close();
        resp
    };

    let resp = match tokio::time::timeout(timeout, dial_and_fetch).await {
        Ok(Ok(resp)) => resp,
        Ok(Err(e)) => {
            return BlocksyncResult {
                peer_id,
                rating_delta: rating::TIMEOUT_OR_STREAM_ERROR,
                blocks_available: Vec::new(),
                parents: Vec::new(),
                error: Some(e.to_string()),
            };
        }
        Err(_) => {
            return BlocksyncResult {
                peer_id,
                rating_delta: rating::TIMEOUT_OR_STREAM_ERROR,
                blocks_available: Vec::new(),
                parents: Vec::new(),
                error: Some(Error::Timeout.to_string()),
            };
        }
    };

    if resp.chain.is_empty() {
        return BlocksyncResult {
            peer_id,
            rating_delta: rating::EMPTY_CHAIN,
            blocks_available: Vec::new(),
            parents: Vec::new(),
            error: Some("empty chain in response".into()),
        };
    }

    let mut parents = Vec::new();
    let mut top: Option<Tipset> = None;
    let mut expected_parent_key: Option<TipsetKey> = None;

    for bundle in &resp.chain {
        let ts = match store_bundle(&store, bundle) {
            Ok(ts) => ts,
            Err(Error::StoreCidsMismatch) => {
                return BlocksyncResult {
                    peer_id,
                    rating_delta: rating::CID_MISMATCH,
                    blocks_available: top.into_iter().collect(),
                    parents,
                    error: Some(Error::StoreCidsMismatch.to_string()),
                };
            }
            Err(e) => {
                return BlocksyncResult {
                    peer_id,
                    rating_delta: rating::INCONSISTENCY,
                    blocks_available: top.into_iter().collect(),
                    parents,
                    error: Some(e.to_string()),
                };
            }
        };

        if let Some(expected) = &expected_parent_key {
            if ts.key() != expected {
                return BlocksyncResult {
                    peer_id,
                    rating_delta: rating::INCONSISTENCY,
                    blocks_available: top.into_iter().collect(),
                    parents,
                    error: Some("parent linkage mismatch".into()),
                };
            }
        }
        expected_parent_key = Some(ts.parents().clone());

        if top.is_none() {
            top = Some(ts);
        } else {
            parents.push(ts);
        }
    }

    let blocks_available: Vec<Tipset> = top.into_iter().collect();
    let saved_items = (blocks_available.len() + parents.len()) as i64;
    let mut delta = rating::NONEMPTY_CHAIN + rating::PER_SAVED_ITEM * saved_items;
    if resp.status == BlocksyncStatus::Complete {
        delta += rating::COMPLETE;
    }

    BlocksyncResult {
        peer_id,
        rating_delta: delta,
        blocks_available,
        parents,
        error: None,
    }
}

/// A single blocksync fetch: resolves its callback exactly once, unless
/// cancelled first (spec §4.11, §5).
pub struct BlocksyncRequest {
    cancelled: Arc<AtomicBool>,
}

impl BlocksyncRequest {
    #[allow(clippy::too_many_arguments)]
    pub fn send<S>(
        host: Arc<dyn NetworkHost>,
        store: S,
        peer_id: PeerId,
        block_cids: Vec<CbCid>,
        depth: u64,
        options: BlocksyncOptions,
        timeout: Duration,
        callback: impl FnOnce(BlocksyncResult) + Send + 'static,
    ) -> Self
    where
        S: BlockStore + Send + Sync + 'static,
    {
        let depth = depth.clamp(1, 100);
        let cancelled = Arc::new(AtomicBool::new(false));
        let cancelled_task = cancelled.clone();
        tokio::spawn(async move {
            let result = run_request(host, store, peer_id, block_cids, depth, options, timeout).await;
            if !cancelled_task.load(Ordering::SeqCst) {
                callback(result);
            }
        });
        BlocksyncRequest { cancelled }
    }

    /// Closes the stream (implicitly, by dropping the task's handle to it)
    /// and suppresses the pending callback. Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ipld_blockstore::MemoryBlockStore;
    use std::sync::Mutex as StdMutex;

    fn sample_tipset(height: u64, parents: TipsetKey, store: &MemoryBlockStore) -> Tipset {
        let meta = MsgMeta::build(store, &[], &[]).unwrap();
        let messages = store.set_cbor(&meta).unwrap();
        let header = BlockHeader::builder()
            .miner_address(blocks::Address::new(vec![0]))
            .parents(parents)
            .parent_state_root(CbCid::hash(b"state"))
            .parent_message_receipts(CbCid::hash(b"receipts"))
            .messages(messages)
            .height(height)
            .build()
            .unwrap();
        Tipset::create(vec![header]).unwrap()
    }

    #[test]
    fn options_wants_messages_matches_spec() {
        assert!(!BlocksyncOptions::BlocksOnly.wants_messages());
        assert!(BlocksyncOptions::MessagesOnly.wants_messages());
        assert!(BlocksyncOptions::BlocksAndMessages.wants_messages());
    }

    #[test]
    fn store_bundle_round_trips_messages() {
        let store = MemoryBlockStore::new();
        let bls = vec![CbCid::hash(b"m1")];
        let meta = MsgMeta::build(&store, &bls, &[]).unwrap();
        let messages_cid = store.set_cbor(&meta).unwrap();
        let header = BlockHeader::builder()
            .miner_address(blocks::Address::new(vec![1]))
            .parents(TipsetKey::new(vec![]))
            .parent_state_root(CbCid::hash(b"s"))
            .parent_message_receipts(CbCid::hash(b"r"))
            .messages(messages_cid)
            .height(1)
            .build()
            .unwrap();
        let bundle = TipsetBundle {
            blocks: vec![header],
            messages: Some(TipsetMessages {
                bls_msgs: bls,
                bls_msg_includes: vec![vec![0]],
                secp_msgs: vec![],
                secp_msg_includes: vec![vec![]],
            }),
        };
        let ts = store_bundle(&store, &bundle).unwrap();
        assert_eq!(ts.height(), 1);
    }

    #[test]
    fn store_bundle_rejects_cid_mismatch() {
        let store = MemoryBlockStore::new();
        let header = BlockHeader::builder()
            .miner_address(blocks::Address::new(vec![1]))
            .parents(TipsetKey::new(vec![]))
            .parent_state_root(CbCid::hash(b"s"))
            .parent_message_receipts(CbCid::hash(b"r"))
            .messages(CbCid::hash(b"not-the-real-meta-root"))
            .height(1)
            .build()
            .unwrap();
        let bundle = TipsetBundle {
            blocks: vec![header],
            messages: Some(TipsetMessages::default()),
        };
        let err = store_bundle(&store, &bundle).unwrap_err();
        assert!(matches!(err, Error::StoreCidsMismatch));
    }

    struct FailingHost;
    #[async_trait::async_trait]
    impl NetworkHost for FailingHost {
        async fn dial_blocksync(&self, _peer: &PeerId) -> Result<Box<dyn SyncStream>, Error> {
            Err(Error::NoConnection)
        }
    }

    #[tokio::test]
    async fn request_short_circuits_when_already_local() {
        let store = MemoryBlockStore::new();
        let ts = sample_tipset(0, TipsetKey::new(vec![]), &store);
        for h in ts.blocks() {
            store.set_cbor(h).unwrap();
        }

        let results = Arc::new(StdMutex::new(Vec::new()));
        let results2 = results.clone();
        let key = ts.key().clone();
        let _req = BlocksyncRequest::send(
            Arc::new(FailingHost),
            store,
            PeerId::new("p1"),
            key.cids().to_vec(),
            5,
            BlocksyncOptions::BlocksAndMessages,
            Duration::from_secs(1),
            move |result| results2.lock().unwrap().push(result),
        );

        for _ in 0..50 {
            if !results.lock().unwrap().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let results = results.lock().unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].rating_delta, rating::COMPLETE);
        assert_eq!(results[0].blocks_available.len(), 1);
    }

    #[tokio::test]
    async fn request_reports_timeout_or_stream_error_on_dial_failure() {
        let store = MemoryBlockStore::new();
        let results = Arc::new(StdMutex::new(Vec::new()));
        let results2 = results.clone();
        let _req = BlocksyncRequest::send(
            Arc::new(FailingHost),
            store,
            PeerId::new("p1"),
            vec![CbCid::hash(b"not-local")],
            5,
            BlocksyncOptions::BlocksAndMessages,
            Duration::from_secs(1),
            move |result| results2.lock().unwrap().push(result),
        );

        for _ in 0..50 {
            if !results.lock().unwrap().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let results = results.lock().unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].rating_delta, rating::TIMEOUT_OR_STREAM_ERROR);
    }
}
