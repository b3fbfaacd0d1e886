// Copyright 2019-2026 Fuhon Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use blocks::{Address, BlockHeader, Tipset, TipsetKey};
use chain::{ChainDb, IndexDb, TipsetLoad};
use chain_sync::{BlocksyncRequest, NetworkHost, Peers, SyncJob, SyncStream, TipsetLoader};
use events::{Events, HeadInterpreted, PeerId, PossibleHead};
use interpreter::{InterpretJob, InterpretResult, Interpreter, WeightCalculator};
use ipld_blockstore::{BlockStore, MemoryBlockStore};

struct StaticTipsetLoad(StdMutex<HashMap<ipld_cid::TipsetHash, Tipset>>);
impl TipsetLoad for StaticTipsetLoad {
    fn load_tipset(&self, key: &TipsetKey) -> Result<Tipset, chain::Error> {
        self.0
            .lock()
            .unwrap()
            .get(&key.hash())
            .cloned()
            .ok_or(chain::Error::TipsetNotFound)
    }
}

struct EchoInterpreter;
impl Interpreter for EchoInterpreter {
    fn interpret(&self, _store: &dyn BlockStore, tipset: &Tipset) -> Result<InterpretResult, interpreter::Error> {
        Ok(InterpretResult {
            state_root: ipld_cid::CbCid::hash(tipset.key().hash().as_bytes()),
            message_receipts: ipld_cid::CbCid::hash(b"receipts"),
        })
    }
}

struct HeightWeight;
impl WeightCalculator for HeightWeight {
    fn weight(
        &self,
        _store: &dyn BlockStore,
        tipset: &Tipset,
        _result: &InterpretResult,
    ) -> Result<num_bigint::BigInt, interpreter::Error> {
        Ok(num_bigint::BigInt::from(tipset.height()))
    }
}

struct DeadHost;
#[async_trait::async_trait]
impl NetworkHost for DeadHost {
    async fn dial_blocksync(&self, _peer: &PeerId) -> Result<Box<dyn SyncStream>, chain_sync::Error> {
        Err(chain_sync::Error::NoConnection)
    }
}

fn genesis_tipset() -> Tipset {
    let header = BlockHeader::builder()
        .miner_address(Address::new(vec![0]))
        .parents(TipsetKey::new(vec![]))
        .parent_state_root(ipld_cid::CbCid::hash(b"genesis-state"))
        .parent_message_receipts(ipld_cid::CbCid::hash(b"genesis-receipts"))
        .messages(ipld_cid::CbCid::hash(b"genesis-messages"))
        .height(0)
        .build()
        .unwrap();
    Tipset::create(vec![header]).unwrap()
}

/// Mirrors the constructor smoke test: a `SyncJob` wires up without a live
/// network or database, using in-memory stand-ins for both.
#[tokio::test]
async fn sync_job_constructs_with_in_memory_backends() {
    let genesis = genesis_tipset();
    let mut by_hash = HashMap::new();
    by_hash.insert(genesis.key().hash(), genesis.clone());
    let ts_load = Box::new(StaticTipsetLoad(StdMutex::new(by_hash)));
    let index_db = IndexDb::in_memory().await.unwrap();
    let chain_db = Arc::new(ChainDb::new(ts_load, index_db));
    chain_db.init(Some(genesis.clone()), true).await.unwrap();
    chain_db.start().unwrap();

    let events = Events::new();
    let store = MemoryBlockStore::new();
    let peers = Arc::new(Peers::new(&events, HashSet::new()));
    let loader = TipsetLoader::new(Arc::new(DeadHost), store.clone());
    let interpret_job = InterpretJob::new(
        chain_db.clone(),
        store.clone(),
        Arc::new(EchoInterpreter),
        Arc::new(HeightWeight),
        events.clone(),
    );
    let sync_job = SyncJob::new(chain_db, store, peers, loader, interpret_job, &events);
    assert_eq!(sync_job.pending_fetch_count(), 0);
    assert_eq!(sync_job.pending_interpret_count(), 0);
}

/// End-to-end: a `PossibleHead` for an already-fetched tipset flows through
/// the sync job into an interpretation, without touching the network.
#[tokio::test]
async fn possible_head_for_local_tipset_reaches_interpretation() {
    let genesis = genesis_tipset();
    let mut by_hash = HashMap::new();
    by_hash.insert(genesis.key().hash(), genesis.clone());
    let ts_load = Box::new(StaticTipsetLoad(StdMutex::new(by_hash)));
    let index_db = IndexDb::in_memory().await.unwrap();
    let chain_db = Arc::new(ChainDb::new(ts_load, index_db));
    chain_db.init(Some(genesis.clone()), true).await.unwrap();
    chain_db.start().unwrap();

    let events = Events::new();
    let store = MemoryBlockStore::new();
    let peers = Arc::new(Peers::new(&events, HashSet::new()));
    let loader = TipsetLoader::new(Arc::new(DeadHost), store.clone());
    let interpret_job = InterpretJob::new(
        chain_db.clone(),
        store.clone(),
        Arc::new(EchoInterpreter),
        Arc::new(HeightWeight),
        events.clone(),
    );
    let _sync_job = SyncJob::new(chain_db, store, peers, loader, interpret_job, &events);

    let interpreted = Arc::new(AtomicUsize::new(0));
    let interpreted2 = interpreted.clone();
    let _conn = events.subscribe::<HeadInterpreted, _>(move |_| {
        interpreted2.fetch_add(1, Ordering::SeqCst);
    });

    events.publish(PossibleHead {
        source: None,
        head: genesis.key().clone(),
        height: 0,
    });

    for _ in 0..100 {
        if interpreted.load(Ordering::SeqCst) > 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(interpreted.load(Ordering::SeqCst), 1);
}

/// A blocksync request against a host that refuses to dial resolves with a
/// no-connection error rather than hanging.
#[tokio::test]
async fn blocksync_request_reports_dial_failure() {
    let store = MemoryBlockStore::new();
    let (tx, rx) = tokio::sync::oneshot::channel();
    let tx = StdMutex::new(Some(tx));
    BlocksyncRequest::send(
        Arc::new(DeadHost),
        store,
        PeerId::new("p1"),
        vec![ipld_cid::CbCid::hash(b"missing")],
        5,
        chain_sync::BlocksyncOptions::BlocksAndMessages,
        Duration::from_millis(500),
        move |result| {
            if let Some(tx) = tx.lock().unwrap().take() {
                let _ = tx.send(result);
            }
        },
    );
    let result = rx.await.unwrap();
    assert!(result.error.is_some());
}
