// Copyright 2019-2026 Fuhon Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

//! Single-threaded fan-out event bus (spec §4.13, §6, §9).
//!
//! Grounded on `core/node/events.hpp`'s `Events` class: one
//! `boost::signals2::signal` per event type, each `subscribeX` returning a
//! `Connection` whose drop disconnects, each `signalX` posting onto the
//! scheduler so publish never re-enters a handler synchronously. Rust has no
//! direct `boost::signals2` equivalent, so this keeps the same contract
//! (typed subscribe/publish, drop-to-unsubscribe, per-event-type FIFO,
//! handlers never block the publisher) with a `TypeId`-keyed subscriber
//! table behind a single mutex instead of one signal member per macro
//! expansion.

mod peer_id;
mod types;

pub use peer_id::PeerId;
pub use types::{
    BlockFromPubSub, BlockWithCids, CurrentHead, FatalError, HeadInterpreted, MessageFromPubSub,
    PeerConnected, PeerDisconnected, PeerLatency, PossibleHead, TipsetFromHello,
};

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

type Handler = Box<dyn Fn(&dyn Any) + Send + Sync>;

struct Subscriber {
    id: u64,
    handler: Handler,
}

#[derive(Default)]
struct Inner {
    subscribers: Mutex<HashMap<TypeId, Vec<Subscriber>>>,
    next_id: AtomicU64,
    stopped: AtomicBool,
}

/// The event bus. Cheap to clone (an `Arc` handle); every clone sees the
/// same subscriber table.
#[derive(Clone)]
pub struct Events {
    inner: Arc<Inner>,
}

impl Default for Events {
    fn default() -> Self {
        Self::new()
    }
}

impl Events {
    pub fn new() -> Self {
        Events {
            inner: Arc::new(Inner::default()),
        }
    }

    /// Stops dispatch: subsequent `publish` calls are silently dropped. Used
    /// after a `FatalError` per spec §7's "the process stops event
    /// dispatch".
    pub fn stop(&self) {
        self.inner.stopped.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::SeqCst)
    }

    /// Registers `handler` for events of type `E`. Returns a [`Connection`]
    /// that unsubscribes on drop.
    pub fn subscribe<E, F>(&self, handler: F) -> Connection
    where
        E: 'static,
        F: Fn(&E) + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        let boxed: Handler = Box::new(move |event: &dyn Any| {
            if let Some(e) = event.downcast_ref::<E>() {
                handler(e);
            }
        });
        self.inner
            .subscribers
            .lock()
            .entry(TypeId::of::<E>())
            .or_default()
            .push(Subscriber { id, handler: boxed });
        Connection {
            id,
            type_id: TypeId::of::<E>(),
            bus: Arc::downgrade(&self.inner),
        }
    }

    /// Fans `event` out to every live subscriber of type `E`, in
    /// registration order (per-event-type FIFO, spec §5). A no-op once
    /// [`stop`](Self::stop) has been called.
    pub fn publish<E: 'static + std::fmt::Debug>(&self, event: E) {
        if self.inner.stopped.load(Ordering::SeqCst) {
            return;
        }
        let subs = self.inner.subscribers.lock();
        let Some(list) = subs.get(&TypeId::of::<E>()) else {
            return;
        };
        tracing::trace!(?event, subscribers = list.len(), "dispatching event");
        for sub in list {
            (sub.handler)(&event);
        }
    }
}

/// An RAII subscription handle: dropping it unsubscribes the handler.
/// Holding only a weak reference to the bus mirrors the "weak back-reference
/// in the handler slot" rule from spec §9 — a dead bus is simply a no-op
/// drop, never a panic.
pub struct Connection {
    id: u64,
    type_id: TypeId,
    bus: Weak<Inner>,
}

impl Drop for Connection {
    fn drop(&mut self) {
        if let Some(inner) = self.bus.upgrade() {
            if let Some(list) = inner.subscribers.lock().get_mut(&self.type_id) {
                list.retain(|s| s.id != self.id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn publish_reaches_subscriber() {
        let bus = Events::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let seen2 = seen.clone();
        let _conn = bus.subscribe::<FatalError, _>(move |e| {
            assert_eq!(e.message, "boom");
            seen2.fetch_add(1, Ordering::SeqCst);
        });
        bus.publish(FatalError {
            message: "boom".into(),
        });
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dropped_connection_stops_receiving() {
        let bus = Events::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let seen2 = seen.clone();
        let conn = bus.subscribe::<FatalError, _>(move |_| {
            seen2.fetch_add(1, Ordering::SeqCst);
        });
        drop(conn);
        bus.publish(FatalError {
            message: "x".into(),
        });
        assert_eq!(seen.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn stop_suppresses_further_dispatch() {
        let bus = Events::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let seen2 = seen.clone();
        let _conn = bus.subscribe::<FatalError, _>(move |_| {
            seen2.fetch_add(1, Ordering::SeqCst);
        });
        bus.stop();
        bus.publish(FatalError {
            message: "x".into(),
        });
        assert_eq!(seen.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn per_type_order_is_fifo() {
        let bus = Events::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        let o1 = order.clone();
        let o2 = order.clone();
        let _a = bus.subscribe::<PeerLatency, _>(move |_| o1.lock().push(1));
        let _b = bus.subscribe::<PeerLatency, _>(move |_| o2.lock().push(2));
        bus.publish(PeerLatency {
            peer_id: PeerId::new("p1"),
            latency_usec: 1,
        });
        assert_eq!(*order.lock(), vec![1, 2]);
    }
}
