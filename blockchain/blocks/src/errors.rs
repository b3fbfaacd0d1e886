// Copyright 2019-2026 Fuhon Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid tipset: {0}")]
    InvalidTipset(String),
    #[error("no blocks for tipset")]
    NoBlocks,
    #[error("encoding error: {0}")]
    Encoding(#[from] encoding::Error),
    #[error("block store error: {0}")]
    Store(#[from] ipld_blockstore::Error),
    #[error("amt error: {0}")]
    Amt(#[from] ipld_amt::Error),
}
