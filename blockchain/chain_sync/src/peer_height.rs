// Copyright 2019-2026 Fuhon Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

//! `PeerHeight`: the bidirectional peer↔height map used to find peers tall
//! enough to be worth fetching from (spec §4.9). Grounded on
//! `core/sync/peer_height.hpp`'s map-of-sets-by-height plus
//! reverse-lookup-by-peer, with `visit` kept as an early-stoppable descending
//! scan rather than returning a collected `Vec`.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use events::{Events, PeerId, PossibleHead};
use parking_lot::Mutex;

struct Inner {
    by_peer: HashMap<PeerId, u64>,
    by_height: BTreeMap<u64, HashSet<PeerId>>,
}

pub struct PeerHeight {
    inner: Arc<Mutex<Inner>>,
    _conn: events::Connection,
}

impl PeerHeight {
    pub fn new(events: &Events) -> Self {
        let inner = Arc::new(Mutex::new(Inner {
            by_peer: HashMap::new(),
            by_height: BTreeMap::new(),
        }));

        let i = inner.clone();
        let conn = events.subscribe::<PossibleHead, _>(move |e: &PossibleHead| {
            let Some(source) = e.source.clone() else {
                return;
            };
            let mut inner = i.lock();
            if let Some(old_height) = inner.by_peer.insert(source.clone(), e.height) {
                if old_height == e.height {
                    return;
                }
                if let Some(set) = inner.by_height.get_mut(&old_height) {
                    set.remove(&source);
                    if set.is_empty() {
                        inner.by_height.remove(&old_height);
                    }
                }
            }
            inner.by_height.entry(e.height).or_default().insert(source);
        });

        PeerHeight { inner, _conn: conn }
    }

    pub fn height_of(&self, peer: &PeerId) -> Option<u64> {
        self.inner.lock().by_peer.get(peer).copied()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().by_peer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Visits `(peer, height)` pairs with `height >= min` in descending
    /// height order. `visitor` returning `false` stops the scan early (spec
    /// §4.9).
    pub fn visit(&self, min: u64, mut visitor: impl FnMut(&PeerId, u64) -> bool) {
        let inner = self.inner.lock();
        for (&height, peers) in inner.by_height.range(min..).rev() {
            for peer in peers {
                if !visitor(peer, height) {
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn head(source: &str, height: u64) -> PossibleHead {
        PossibleHead {
            source: Some(PeerId::new(source)),
            head: blocks::TipsetKey::new(vec![]),
            height,
        }
    }

    #[test]
    fn tracks_height_and_updates_on_move() {
        let events = Events::new();
        let ph = PeerHeight::new(&events);
        events.publish(head("p1", 10));
        assert_eq!(ph.height_of(&PeerId::new("p1")), Some(10));

        events.publish(head("p1", 20));
        assert_eq!(ph.height_of(&PeerId::new("p1")), Some(20));
        assert_eq!(ph.len(), 1);
    }

    #[test]
    fn visit_is_descending_and_stoppable() {
        let events = Events::new();
        let ph = PeerHeight::new(&events);
        events.publish(head("low", 5));
        events.publish(head("mid", 10));
        events.publish(head("high", 20));

        let mut seen = Vec::new();
        ph.visit(8, |peer, height| {
            seen.push((peer.as_str().to_string(), height));
            true
        });
        assert_eq!(seen, vec![("high".to_string(), 20), ("mid".to_string(), 10)]);

        let mut seen_once = Vec::new();
        ph.visit(0, |peer, height| {
            seen_once.push((peer.as_str().to_string(), height));
            false
        });
        assert_eq!(seen_once, vec![("high".to_string(), 20)]);
    }
}
