// Copyright 2019-2026 Fuhon Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

/// Error kinds for [`crate::Branches`], [`crate::IndexDb`], and
/// [`crate::ChainDb`], folded into one enum the way `encoding::Error` and
/// `ipld_hamt::Error` do for their own crates. Variant names follow
/// `core/node/branches.hpp`'s and `core/node/chain_db.hpp`'s `Error` enums
/// (spec §7's "Graph errors" and "ChainDb errors").
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("no genesis branch")]
    NoGenesisBranch,
    #[error("parent branch expected but none indexed")]
    ParentExpected,
    #[error("no current chain selected")]
    NoCurrentChain,
    #[error("branch {0} not found")]
    BranchNotFound(u64),
    #[error("head {0:?} not found")]
    HeadNotFound(ipld_cid::TipsetHash),
    #[error("head is not synced to genesis")]
    HeadNotSynced,
    #[error("cycle detected in branch graph")]
    CycleDetected,
    #[error("height mismatch: {0}")]
    HeightMismatch(String),
    #[error("no common root between branches")]
    NoCommonRoot,
    #[error("no route between branches")]
    NoRoute,

    #[error("chain db not initialized")]
    NotInitialized,
    #[error("bad tipset: {0}")]
    BadTipset(String),
    #[error("no genesis configured")]
    NoGenesis,
    #[error("genesis mismatch")]
    GenesisMismatch,
    #[error("data integrity error: {0}")]
    DataIntegrityError(String),

    #[error("index db cannot be created: {0}")]
    CannotCreate(String),
    #[error("index db already exists")]
    AlreadyExists,
    #[error("index db execute error: {0}")]
    ExecuteError(#[from] sqlx::Error),
    #[error("tipset not found in index")]
    TipsetNotFound,

    #[error(transparent)]
    Encoding(#[from] encoding::Error),
    #[error(transparent)]
    Store(#[from] ipld_blockstore::Error),
    #[error(transparent)]
    Blocks(#[from] blocks::Error),
}
