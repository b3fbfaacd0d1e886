// Copyright 2019-2026 Fuhon Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

//! The hello handshake (spec §4.10, protocol `/fil/hello/1.0.0`): a one-shot
//! exchange run once per connected peer that tells each side the other's
//! genesis and heaviest tipset, and doubles as a latency probe. Grounded on
//! `core/sync/hello.hpp`'s `Hello` class; the libp2p substream itself is
//! abstracted behind [`HelloStream`] since the transport is out of scope
//! (spec §1).

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use encoding::tuple::*;
use events::{Events, PeerId, PeerLatency, TipsetFromHello};
use ipld_cid::CbCid;
use num_bigint::BigInt;

use crate::errors::Error;

/// ~10s outstanding-request timeout (spec §4.10, §4.9's supplemented
/// heartbeat detail).
pub const HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(10);

/// Tuple-encoded (`CBOR_TUPLE(HelloMessage, ...)` in the original) to match
/// the reference wire form.
#[derive(Clone, Debug, Serialize_tuple, Deserialize_tuple)]
pub struct HelloMessage {
    pub heaviest_tipset: Vec<CbCid>,
    pub heaviest_tipset_height: u64,
    #[serde(with = "crate::bigint_cbor")]
    pub heaviest_tipset_weight: BigInt,
    pub genesis: CbCid,
}

#[derive(Clone, Copy, Debug, Serialize_tuple, Deserialize_tuple)]
pub struct LatencyMessage {
    pub arrival_usec: u128,
    pub sent_usec: u128,
}

/// A hello protocol substream, in either direction. The network transport
/// (dialing, multiplexing) is out of scope (spec §1) — only the four
/// messages the protocol actually exchanges are modeled.
#[async_trait::async_trait]
pub trait HelloStream: Send {
    async fn write_message(&mut self, msg: &HelloMessage) -> Result<(), Error>;
    async fn read_latency(&mut self) -> Result<LatencyMessage, Error>;
    async fn read_message(&mut self) -> Result<HelloMessage, Error>;
    async fn write_latency(&mut self, msg: &LatencyMessage) -> Result<(), Error>;
    fn close(&mut self);
}

fn now_usec() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_micros()
}

/// Runs the hello handshake in both directions (spec §4.10).
pub struct Hello {
    genesis: CbCid,
    events: Events,
}

impl Hello {
    pub fn new(genesis: CbCid, events: Events) -> Self {
        Hello { genesis, events }
    }

    /// Client side: send our heaviest tipset, then read back a latency
    /// reply and emit `PeerLatency`.
    pub async fn dial(
        &self,
        peer_id: PeerId,
        mut stream: Box<dyn HelloStream>,
        heaviest_tipset: &[CbCid],
        heaviest_tipset_height: u64,
        heaviest_tipset_weight: BigInt,
    ) -> Result<(), Error> {
        let msg = HelloMessage {
            heaviest_tipset: heaviest_tipset.to_vec(),
            heaviest_tipset_height,
            heaviest_tipset_weight,
            genesis: self.genesis,
        };
        let sent_usec = now_usec();
        let result = tokio::time::timeout(HEARTBEAT_TIMEOUT, async {
            stream.write_message(&msg).await?;
            stream.read_latency().await
        })
        .await;
        stream.close();
        let _latency_msg = result.map_err(|_| Error::TimedOut)??;
        let arrival_usec = now_usec();
        let latency_usec = arrival_usec.saturating_sub(sent_usec).min(u64::MAX as u128) as u64;
        self.events.publish(PeerLatency {
            peer_id,
            latency_usec,
        });
        Ok(())
    }

    /// Server side: read a hello, reject a genesis mismatch, otherwise emit
    /// `TipsetFromHello` and reply with a latency message.
    pub async fn accept(&self, peer_id: PeerId, mut stream: Box<dyn HelloStream>) -> Result<(), Error> {
        let msg = tokio::time::timeout(HEARTBEAT_TIMEOUT, stream.read_message())
            .await
            .map_err(|_| Error::TimedOut)??;
        let arrival_usec = now_usec();

        if msg.genesis != self.genesis {
            stream.close();
            return Err(Error::GenesisMismatch);
        }

        self.events.publish(TipsetFromHello {
            peer_id,
            tipset: blocks::TipsetKey::new(msg.heaviest_tipset),
            height: msg.heaviest_tipset_height,
            weight: msg.heaviest_tipset_weight,
        });

        let sent_usec = now_usec();
        stream
            .write_latency(&LatencyMessage {
                arrival_usec,
                sent_usec,
            })
            .await?;
        stream.close();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct LoopbackStream {
        genesis: CbCid,
        local_head: Vec<CbCid>,
        local_height: u64,
        local_weight: BigInt,
    }

    #[async_trait::async_trait]
    impl HelloStream for LoopbackStream {
        async fn write_message(&mut self, _msg: &HelloMessage) -> Result<(), Error> {
            Ok(())
        }
        async fn read_latency(&mut self) -> Result<LatencyMessage, Error> {
            Ok(LatencyMessage {
                arrival_usec: 0,
                sent_usec: 0,
            })
        }
        async fn read_message(&mut self) -> Result<HelloMessage, Error> {
            Ok(HelloMessage {
                heaviest_tipset: self.local_head.clone(),
                heaviest_tipset_height: self.local_height,
                heaviest_tipset_weight: self.local_weight.clone(),
                genesis: self.genesis,
            })
        }
        async fn write_latency(&mut self, _msg: &LatencyMessage) -> Result<(), Error> {
            Ok(())
        }
        fn close(&mut self) {}
    }

    #[tokio::test]
    async fn accept_emits_tipset_from_hello_on_matching_genesis() {
        let genesis = CbCid::hash(b"genesis");
        let events = Events::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let seen2 = seen.clone();
        let _conn = events.subscribe::<TipsetFromHello, _>(move |e| {
            assert_eq!(e.height, 42);
            seen2.fetch_add(1, Ordering::SeqCst);
        });

        let hello = Hello::new(genesis, events);
        let stream = Box::new(LoopbackStream {
            genesis,
            local_head: vec![CbCid::hash(b"head")],
            local_height: 42,
            local_weight: BigInt::from(7),
        });
        hello.accept(PeerId::new("peer"), stream).await.unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn accept_rejects_genesis_mismatch() {
        let events = Events::new();
        let hello = Hello::new(CbCid::hash(b"genesis-a"), events);
        let stream = Box::new(LoopbackStream {
            genesis: CbCid::hash(b"genesis-b"),
            local_head: vec![],
            local_height: 0,
            local_weight: BigInt::from(0),
        });
        let err = hello.accept(PeerId::new("peer"), stream).await.unwrap_err();
        assert!(matches!(err, Error::GenesisMismatch));
    }

    #[tokio::test]
    async fn dial_emits_peer_latency() {
        let genesis = CbCid::hash(b"genesis");
        let events = Events::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let seen2 = seen.clone();
        let _conn = events.subscribe::<PeerLatency, _>(move |_| {
            seen2.fetch_add(1, Ordering::SeqCst);
        });
        let hello = Hello::new(genesis, events);
        let stream = Box::new(LoopbackStream {
            genesis,
            local_head: vec![],
            local_height: 0,
            local_weight: BigInt::from(0),
        });
        hello
            .dial(PeerId::new("peer"), stream, &[], 0, BigInt::from(0))
            .await
            .unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }
}
