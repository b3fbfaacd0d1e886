// Copyright 2019-2026 Fuhon Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

//! `WeightCalculator`, an external collaborator the interpreter driver
//! consults after each successful interpretation (spec §4.13, glossary
//! "Weight"). Grounded on the teacher's `blockchain/chain::weight::Scale`
//! trait, generalized from a blockstore-only signature to one that also
//! receives the already-computed [`InterpretResult`], since the reference
//! weight function (miner power, qualified power) needs the post-state
//! rather than only the raw tipset.

use blocks::Tipset;
use ipld_blockstore::BlockStore;
use num_bigint::BigInt;

use crate::cache::InterpretResult;
use crate::errors::Error;

/// Computes the monotone chain weight used to decide the canonical head
/// (spec glossary: "the heaviest valid head is the canonical head"). The
/// actual consensus weighting rule (miner power, qualified power, election
/// proofs) is out of scope (spec §1); this crate only needs the resulting
/// scalar.
pub trait WeightCalculator: Send + Sync {
    fn weight(
        &self,
        store: &dyn BlockStore,
        tipset: &Tipset,
        result: &InterpretResult,
    ) -> Result<BigInt, Error>;
}
