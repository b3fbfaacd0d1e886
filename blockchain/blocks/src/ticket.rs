// Copyright 2019-2026 Fuhon Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

//! A `Ticket` is the marker of a tick of the chain's clock: the output of a
//! VRF run over the parent ticket, used both as the source of randomness for
//! leader election and as the tie-breaker in [`Tipset`](crate::Tipset)'s
//! canonical block order.

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Default, serde::Serialize, serde::Deserialize)]
pub struct Ticket {
    #[serde(with = "serde_bytes")]
    pub vrfproof: Vec<u8>,
}

impl Ticket {
    pub fn new(vrfproof: Vec<u8>) -> Self {
        Ticket { vrfproof }
    }
}

#[cfg(test)]
impl quickcheck::Arbitrary for Ticket {
    fn arbitrary(g: &mut quickcheck::Gen) -> Self {
        Ticket {
            vrfproof: Vec::<u8>::arbitrary(g),
        }
    }
}

/// Optional proof that a miner won the leader election for an epoch. Present
/// on at most one block per tipset slot in real consensus; the core treats
/// its contents opaquely and only round-trips them.
#[derive(Clone, Debug, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub struct ElectionProof {
    pub win_count: i64,
    #[serde(with = "serde_bytes")]
    pub vrfproof: Vec<u8>,
}

#[cfg(test)]
impl quickcheck::Arbitrary for ElectionProof {
    fn arbitrary(g: &mut quickcheck::Gen) -> Self {
        ElectionProof {
            win_count: i64::arbitrary(g),
            vrfproof: Vec::<u8>::arbitrary(g),
        }
    }
}
