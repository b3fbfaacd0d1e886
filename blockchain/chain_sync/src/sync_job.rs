// Copyright 2019-2026 Fuhon Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

//! `SyncJob`: the top-level sync driver (spec §4.12). Grounded on
//! `core/sync/sync_job.hpp`'s two-queue state machine and on the teacher's
//! `sync_worker.rs`'s pattern of an `Arc`-fielded struct whose methods spawn
//! onto a shared runtime rather than owning a dedicated OS thread.
//!
//! On `HeadInterpreted`, children of the just-interpreted tipset are looked
//! up via `ChainDb::children_of` (the branch graph's `parent_hash` index,
//! spec §4.12) and pushed onto the interpret queue directly, rather than
//! waiting on a further `PossibleHead` to re-trigger them.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use blocks::{Tipset, TipsetKey};
use chain::ChainDb;
use events::{Events, HeadInterpreted, PeerId, PossibleHead};
use interpreter::InterpretJob;
use ipld_blockstore::BlockStore;
use parking_lot::Mutex;

use crate::blocksync::BlocksyncOptions;
use crate::peers::Peers;
use crate::tipset_loader::TipsetLoader;

/// `depth` passed to each fetch's `BlocksyncRequest` (spec §4.12).
const FETCH_DEPTH: u64 = 5;
const FETCH_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Default)]
struct Queues {
    requests: VecDeque<(PeerId, TipsetKey)>,
    interpret_queue: VecDeque<Tipset>,
}

pub struct SyncJob<S> {
    chain_db: Arc<ChainDb>,
    store: S,
    peers: Arc<Peers>,
    loader: Arc<TipsetLoader<S>>,
    interpret_job: Arc<InterpretJob<S>>,
    queues: Mutex<Queues>,
    conns: Mutex<Vec<events::Connection>>,
}

impl<S> SyncJob<S>
where
    S: BlockStore + Clone + Send + Sync + 'static,
{
    pub fn new(
        chain_db: Arc<ChainDb>,
        store: S,
        peers: Arc<Peers>,
        loader: Arc<TipsetLoader<S>>,
        interpret_job: Arc<InterpretJob<S>>,
        events: &Events,
    ) -> Arc<Self> {
        let job = Arc::new(SyncJob {
            chain_db,
            store,
            peers,
            loader,
            interpret_job,
            queues: Mutex::new(Queues::default()),
            conns: Mutex::new(Vec::new()),
        });

        let weak = Arc::downgrade(&job);
        let w = weak.clone();
        let possible_head_conn = events.subscribe::<PossibleHead, _>(move |e: &PossibleHead| {
            if let Some(job) = w.upgrade() {
                job.on_possible_head(e.clone());
            }
        });
        let w = weak.clone();
        let head_interpreted_conn = events.subscribe::<HeadInterpreted, _>(move |e: &HeadInterpreted| {
            if let Some(job) = w.upgrade() {
                job.on_head_interpreted(e.clone());
            }
        });
        *job.conns.lock() = vec![possible_head_conn, head_interpreted_conn];

        job
    }

    fn on_possible_head(self: &Arc<Self>, e: PossibleHead) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            match this.chain_db.get_tipset_by_hash(&e.head.hash()).await {
                Ok(ts) => this.enqueue_interpret(ts),
                Err(_) => match e.source {
                    Some(peer) => {
                        this.queues.lock().requests.push_back((peer, e.head.clone()));
                        let next = Arc::clone(&this);
                        tokio::spawn(async move { next.fetch_dequeue().await });
                    }
                    None => {
                        tracing::debug!(
                            height = e.height,
                            "possible head with no source and not locally available, dropping"
                        );
                    }
                },
            }
        });
    }

    fn on_head_interpreted(self: &Arc<Self>, e: HeadInterpreted) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            match this.chain_db.children_of(&e.head.hash()).await {
                Ok(children) => {
                    for child in children {
                        this.enqueue_interpret(child);
                    }
                }
                Err(err) => {
                    tracing::warn!(error = %err, head = ?e.head, "failed to look up children of interpreted head");
                }
            }
            this.interpret_dequeue().await;
        });
    }

    fn enqueue_interpret(self: &Arc<Self>, tipset: Tipset) {
        self.queues.lock().interpret_queue.push_back(tipset);
        let this = Arc::clone(self);
        tokio::spawn(async move { this.interpret_dequeue().await });
    }

    /// Pops the next fetch request, confirms it is not already locally
    /// available, then launches a coalesced blocksync fetch (spec §4.12).
    async fn fetch_dequeue(self: Arc<Self>) {
        let next = self.queues.lock().requests.pop_front();
        let Some((peer_id, key)) = next else {
            return;
        };

        if self.chain_db.get_tipset_by_hash(&key.hash()).await.is_ok() {
            return;
        }

        let this = Arc::clone(&self);
        self.loader.fetch(
            peer_id,
            key,
            FETCH_DEPTH,
            BlocksyncOptions::BlocksAndMessages,
            FETCH_TIMEOUT,
            move |result| this.handle_blocksync_result(result),
        );
    }

    fn handle_blocksync_result(self: &Arc<Self>, result: crate::blocksync::BlocksyncResult) {
        self.peers.change_rating(&result.peer_id, result.rating_delta);
        if let Some(err) = &result.error {
            tracing::warn!(peer = %result.peer_id, error = %err, "blocksync fetch did not complete cleanly");
        }

        {
            let mut queues = self.queues.lock();
            for ts in result.blocks_available.into_iter().chain(result.parents) {
                queues.interpret_queue.push_back(ts);
            }
        }

        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.interpret_dequeue().await;
            this.fetch_dequeue().await;
        });
    }

    async fn interpret_dequeue(self: Arc<Self>) {
        let next = self.queues.lock().interpret_queue.pop_front();
        let Some(tipset) = next else {
            return;
        };
        self.interpret_job.new_job(tipset).await;

        let this = Arc::clone(&self);
        tokio::spawn(async move { this.interpret_dequeue().await });
    }

    /// Merges any branches eligible for compaction. A no-op under the
    /// current `ChainDb`, which merges forks into their parent branch
    /// eagerly on `store_tipset` rather than leaving compaction for later
    /// (spec §4.6's supplemented note).
    pub fn compact_branches(&self) {
        tracing::trace!("branch compaction skipped: ChainDb merges branches eagerly on store");
    }

    pub fn pending_fetch_count(&self) -> usize {
        self.queues.lock().requests.len()
    }

    pub fn pending_interpret_count(&self) -> usize {
        self.queues.lock().interpret_queue.len()
    }
}
