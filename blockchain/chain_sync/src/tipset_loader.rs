// Copyright 2019-2026 Fuhon Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

//! `TipsetLoader`: coalesces concurrent fetch requests for the same tipset
//! into one outstanding [`BlocksyncRequest`] (spec §4.12). Grounded on
//! `core/sync/tipset_loader.hpp`'s waiter-list-per-hash pattern.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use events::PeerId;
use ipld_blockstore::BlockStore;
use ipld_cid::TipsetHash;
use parking_lot::Mutex;

use blocks::TipsetKey;

use crate::blocksync::{BlocksyncOptions, BlocksyncRequest, BlocksyncResult, NetworkHost};

type Waiter = Box<dyn FnOnce(BlocksyncResult) + Send>;

pub struct TipsetLoader<S> {
    host: Arc<dyn NetworkHost>,
    store: S,
    inflight: Mutex<HashMap<TipsetHash, Vec<Waiter>>>,
}

impl<S> TipsetLoader<S>
where
    S: BlockStore + Clone + Send + Sync + 'static,
{
    pub fn new(host: Arc<dyn NetworkHost>, store: S) -> Arc<Self> {
        Arc::new(TipsetLoader {
            host,
            store,
            inflight: Mutex::new(HashMap::new()),
        })
    }

    /// Requests `key` from `peer_id`. If a fetch for this tipset's hash is
    /// already outstanding, `callback` is queued and resolved from that
    /// call's shared outcome instead of dialing again.
    pub fn fetch(
        self: &Arc<Self>,
        peer_id: PeerId,
        key: TipsetKey,
        depth: u64,
        options: BlocksyncOptions,
        timeout: Duration,
        callback: impl FnOnce(BlocksyncResult) + Send + 'static,
    ) {
        let hash = key.hash();
        {
            let mut inflight = self.inflight.lock();
            if let Some(waiters) = inflight.get_mut(&hash) {
                waiters.push(Box::new(callback));
                return;
            }
            inflight.insert(hash, vec![Box::new(callback)]);
        }

        let this = Arc::clone(self);
        let store = self.store.clone();
        let host = Arc::clone(&self.host);
        BlocksyncRequest::send(
            host,
            store,
            peer_id,
            key.cids().to_vec(),
            depth,
            options,
            timeout,
            move |result| {
                let waiters = this.inflight.lock().remove(&hash).unwrap_or_default();
                for waiter in waiters {
                    waiter(result.clone());
                }
            },
        );
    }

    pub fn inflight_count(&self) -> usize {
        self.inflight.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocksync::{SyncStream, WireRequest, WireResponse};
    use crate::errors::Error;
    use ipld_blockstore::MemoryBlockStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct NoopStream;
    #[async_trait::async_trait]
    impl SyncStream for NoopStream {
        async fn send_request(&mut self, _req: &WireRequest) -> Result<(), Error> {
            Ok(())
        }
        async fn recv_response(&mut self) -> Result<WireResponse, Error> {
            Err(Error::NoConnection)
        }
        fn close(&mut self) {}
    }

    struct CountingHost {
        dials: Arc<AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl NetworkHost for CountingHost {
        async fn dial_blocksync(&self, _peer: &PeerId) -> Result<Box<dyn SyncStream>, Error> {
            self.dials.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(NoopStream))
        }
    }

    #[tokio::test]
    async fn concurrent_fetches_for_same_tipset_dial_once() {
        let dials = Arc::new(AtomicUsize::new(0));
        let host = Arc::new(CountingHost { dials: dials.clone() });
        let loader = TipsetLoader::new(host, MemoryBlockStore::new());

        let key = TipsetKey::new(vec![ipld_cid::CbCid::hash(b"missing")]);
        let callbacks_seen = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let seen = callbacks_seen.clone();
            loader.fetch(
                PeerId::new("p1"),
                key.clone(),
                5,
                BlocksyncOptions::BlocksAndMessages,
                Duration::from_millis(500),
                move |_result| {
                    seen.fetch_add(1, Ordering::SeqCst);
                },
            );
        }

        for _ in 0..50 {
            if callbacks_seen.load(Ordering::SeqCst) == 3 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(callbacks_seen.load(Ordering::SeqCst), 3);
        assert_eq!(dials.load(Ordering::SeqCst), 1);
    }
}
