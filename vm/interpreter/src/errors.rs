// Copyright 2019-2026 Fuhon Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

/// Error kinds for [`crate::InterpretJob`] (spec §7's "Sync errors" that
/// apply to the interpreter driver, plus `ChainInconsistency` named
/// explicitly in spec §4.13).
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("tipset {0:?} failed parent-root verification")]
    ChainInconsistency(ipld_cid::TipsetHash),
    #[error("genesis tipset could not be interpreted: {0}")]
    GenesisInterpretFailed(String),
    #[error("interpreter rejected tipset: {0}")]
    InterpretFailed(String),
    #[error(transparent)]
    Chain(#[from] chain::Error),
    #[error(transparent)]
    Store(#[from] ipld_blockstore::Error),
    #[error(transparent)]
    Encoding(#[from] encoding::Error),
}
