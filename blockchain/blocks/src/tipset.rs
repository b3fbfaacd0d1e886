// Copyright 2019-2026 Fuhon Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

//! [`TipsetKey`] and [`Tipset`] (spec §3, §4.5): the canonical grouping of
//! block headers sharing a height and parent set.

use std::sync::OnceLock;

use ipld_cid::{CbCid, TipsetHash};

use crate::{BlockHeader, Error};

/// The ordered sequence of block CIDs identifying a tipset, canonicalized by
/// sorting (spec §3: "Tipset key").
#[derive(Clone, Debug, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct TipsetKey {
    cids: Vec<CbCid>,
}

impl TipsetKey {
    pub fn new(mut cids: Vec<CbCid>) -> Self {
        cids.sort();
        TipsetKey { cids }
    }

    /// Builds a key without re-sorting; callers must already hold a
    /// canonically-ordered CID list (e.g. one just read back from storage).
    pub fn from_sorted(cids: Vec<CbCid>) -> Self {
        TipsetKey { cids }
    }

    pub fn cids(&self) -> &[CbCid] {
        &self.cids
    }

    pub fn hash(&self) -> TipsetHash {
        TipsetHash::of(&self.cids)
    }

    pub fn is_empty(&self) -> bool {
        self.cids.is_empty()
    }
}

/// An immutable, non-empty set of block headers at one height sharing one
/// parent set, canonically ordered by `(ticket, cid)` (spec §4.5).
#[derive(Clone, Debug)]
pub struct Tipset {
    headers: Vec<BlockHeader>,
    key: OnceLock<TipsetKey>,
}

impl PartialEq for Tipset {
    fn eq(&self, other: &Self) -> bool {
        self.headers == other.headers
    }
}

impl Tipset {
    /// Sorts `headers` by `(ticket, cid)` and verifies they share a height,
    /// parent set, and parent weight (spec §3's Tipset invariants).
    pub fn create(mut headers: Vec<BlockHeader>) -> Result<Self, Error> {
        if headers.is_empty() {
            return Err(Error::NoBlocks);
        }
        let height = headers[0].height();
        let parents = headers[0].parents().clone();
        let parent_weight = headers[0].parent_weight().clone();
        for h in &headers[1..] {
            if h.height() != height {
                return Err(Error::InvalidTipset("mismatched height".into()));
            }
            if h.parents() != &parents {
                return Err(Error::InvalidTipset("mismatched parents".into()));
            }
            if h.parent_weight() != &parent_weight {
                return Err(Error::InvalidTipset("mismatched parent weight".into()));
            }
        }
        headers.sort_by_cached_key(|h| (h.ticket().clone(), h.cid().to_bytes()));
        Ok(Tipset {
            headers,
            key: OnceLock::new(),
        })
    }

    pub fn key(&self) -> &TipsetKey {
        self.key.get_or_init(|| {
            TipsetKey::from_sorted(self.headers.iter().map(|h| h.cid()).collect())
        })
    }

    pub fn height(&self) -> u64 {
        self.headers[0].height()
    }

    pub fn parents(&self) -> &TipsetKey {
        self.headers[0].parents()
    }

    pub fn parent_weight(&self) -> &num_bigint::BigInt {
        self.headers[0].parent_weight()
    }

    pub fn blocks(&self) -> &[BlockHeader] {
        &self.headers
    }

    pub fn into_blocks(self) -> Vec<BlockHeader> {
        self.headers
    }

    pub fn min_ticket_block(&self) -> &BlockHeader {
        &self.headers[0]
    }
}
