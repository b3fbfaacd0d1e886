// Copyright 2019-2026 Fuhon Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

//! The tipset graph and its persistent index (spec §4.6-4.8): `Branches`
//! (the in-memory acyclic graph of branches, with split/merge/rename),
//! `IndexDb` (the sqlite-backed `(hash) -> row` / `(branch, height) -> row`
//! index), and `ChainDb` (the façade the rest of the sync stack talks to).

mod branches;
mod chain_db;
mod errors;
mod index_db;

pub use branches::{BranchId, BranchInfo, Branches, Height, HeadChanges, RenameBranch, StorePosition, NO_BRANCH};
pub use chain_db::{ChainDb, SyncState, TipsetLoad};
pub use errors::Error;
pub use index_db::{IndexDb, TipsetInfo};
