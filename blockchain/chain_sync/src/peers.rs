// Copyright 2019-2026 Fuhon Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

//! `Peers`: the rating table the rest of the sync engine consults to pick
//! which peer to fetch from next (spec §4.9). Grounded on
//! `core/sync/peer_manager.hpp`'s rating table, kept as an event-bus
//! subscriber rather than a `ChainSyncer`-owned field.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use events::{Events, PeerConnected, PeerDisconnected, PeerId, PeerLatency};
use parking_lot::Mutex;

/// Below this latency, rating moves by `(LATENCY_BASE_USEC - latency) /
/// LATENCY_DIVISOR`; at or above it, the peer is treated as having timed
/// out and takes the flat [`LATENCY_TIMEOUT_PENALTY`] instead.
const LATENCY_TIMEOUT_USEC: u64 = 10_000_000;
const LATENCY_BASE_USEC: i64 = 10_000_000;
const LATENCY_DIVISOR: i64 = 100_000;
const LATENCY_TIMEOUT_PENALTY: i64 = -100;

fn rating_delta_for_latency(latency_usec: u64) -> i64 {
    if latency_usec < LATENCY_TIMEOUT_USEC {
        (LATENCY_BASE_USEC - latency_usec as i64) / LATENCY_DIVISOR
    } else {
        LATENCY_TIMEOUT_PENALTY
    }
}

struct Inner {
    ratings: HashMap<PeerId, i64>,
}

/// Tracks a rating per connected peer, adjusted by latency measurements and
/// by request outcomes (spec §4.9). `protocols` filters which
/// `PeerConnected` events are worth tracking at all — e.g. only peers that
/// advertise blocksync support.
pub struct Peers {
    inner: Arc<Mutex<Inner>>,
    _conns: Vec<events::Connection>,
}

impl Peers {
    pub fn new(events: &Events, required_protocols: HashSet<String>) -> Self {
        let inner = Arc::new(Mutex::new(Inner {
            ratings: HashMap::new(),
        }));
        let mut conns = Vec::with_capacity(3);

        let i = inner.clone();
        let protocols = required_protocols;
        conns.push(events.subscribe::<PeerConnected, _>(move |e: &PeerConnected| {
            if protocols.is_empty() || e.protocols.iter().any(|p| protocols.contains(p)) {
                i.lock().ratings.entry(e.peer_id.clone()).or_insert(0);
            }
        }));

        let i = inner.clone();
        conns.push(events.subscribe::<PeerDisconnected, _>(move |e: &PeerDisconnected| {
            i.lock().ratings.remove(&e.peer_id);
        }));

        let i = inner.clone();
        conns.push(events.subscribe::<PeerLatency, _>(move |e: &PeerLatency| {
            let mut inner = i.lock();
            let rating = inner.ratings.entry(e.peer_id.clone()).or_insert(0);
            *rating += rating_delta_for_latency(e.latency_usec);
        }));

        Peers {
            inner,
            _conns: conns,
        }
    }

    /// Adjusts `peer`'s rating by `delta`; a no-op if the peer is unknown
    /// (already disconnected).
    pub fn change_rating(&self, peer: &PeerId, delta: i64) {
        if let Some(r) = self.inner.lock().ratings.get_mut(peer) {
            *r += delta;
        }
    }

    pub fn rating(&self, peer: &PeerId) -> Option<i64> {
        self.inner.lock().ratings.get(peer).copied()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().ratings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `preferred` if it has a non-negative rating and is not in
    /// `ignored`; otherwise the globally best-rated peer not in `ignored`;
    /// otherwise `None` (spec §4.9).
    pub fn select_best_peer(&self, preferred: Option<&PeerId>, ignored: &HashSet<PeerId>) -> Option<PeerId> {
        let inner = self.inner.lock();
        if let Some(p) = preferred {
            if !ignored.contains(p) {
                if let Some(&r) = inner.ratings.get(p) {
                    if r >= 0 {
                        return Some(p.clone());
                    }
                }
            }
        }
        inner
            .ratings
            .iter()
            .filter(|(id, _)| !ignored.contains(*id))
            .max_by_key(|(_, r)| **r)
            .map(|(id, _)| id.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet as Set;

    #[test]
    fn latency_under_ten_seconds_moves_rating_up_when_fast() {
        assert_eq!(rating_delta_for_latency(0), 100);
        assert_eq!(rating_delta_for_latency(9_999_999), 0);
    }

    #[test]
    fn latency_at_or_above_ten_seconds_is_penalized() {
        assert_eq!(rating_delta_for_latency(10_000_000), -100);
        assert_eq!(rating_delta_for_latency(50_000_000), -100);
    }

    #[test]
    fn connect_latency_and_disconnect_flow() {
        let events = Events::new();
        let peers = Peers::new(&events, Set::new());
        let p1 = PeerId::new("p1");
        events.publish(PeerConnected {
            peer_id: p1.clone(),
            protocols: Set::new(),
        });
        assert_eq!(peers.rating(&p1), Some(0));

        events.publish(PeerLatency {
            peer_id: p1.clone(),
            latency_usec: 0,
        });
        assert_eq!(peers.rating(&p1), Some(100));

        events.publish(PeerDisconnected { peer_id: p1.clone() });
        assert_eq!(peers.rating(&p1), None);
    }

    #[test]
    fn select_best_peer_prefers_non_negative_preferred() {
        let events = Events::new();
        let peers = Peers::new(&events, Set::new());
        let good = PeerId::new("good");
        let bad = PeerId::new("bad");
        events.publish(PeerConnected {
            peer_id: good.clone(),
            protocols: Set::new(),
        });
        events.publish(PeerConnected {
            peer_id: bad.clone(),
            protocols: Set::new(),
        });
        peers.change_rating(&bad, -10);
        peers.change_rating(&good, 5);

        assert_eq!(peers.select_best_peer(Some(&bad), &Set::new()), Some(good.clone()));
        assert_eq!(peers.select_best_peer(Some(&good), &Set::new()), Some(good));
    }

    #[test]
    fn select_best_peer_falls_back_to_global_max_then_none() {
        let peers = Peers::new(&Events::new(), Set::new());
        assert_eq!(peers.select_best_peer(None, &Set::new()), None);

        let events = Events::new();
        let peers = Peers::new(&events, Set::new());
        let a = PeerId::new("a");
        let b = PeerId::new("b");
        events.publish(PeerConnected {
            peer_id: a.clone(),
            protocols: Set::new(),
        });
        events.publish(PeerConnected {
            peer_id: b.clone(),
            protocols: Set::new(),
        });
        peers.change_rating(&b, 20);
        assert_eq!(peers.select_best_peer(None, &Set::new()), Some(b));
    }
}
