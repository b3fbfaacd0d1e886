// Copyright 2019-2026 Fuhon Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("key not found")]
    NotFound,
    #[error("encoding error: {0}")]
    Encoding(#[from] encoding::Error),
    #[error("block store error: {0}")]
    Store(#[from] ipld_blockstore::Error),
    #[error("loaded node shape is inconsistent with this trie's schema")]
    InconsistentShape,
    #[error("bit width out of supported range")]
    InvalidBitWidth,
}
