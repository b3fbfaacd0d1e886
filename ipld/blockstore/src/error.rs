// Copyright 2019-2026 Fuhon Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("cid not found in store")]
    NotFound,
    #[error("store io error: {0}")]
    StoreIOError(#[from] std::io::Error),
    #[error("cids index is corrupt: {0}")]
    CidsIndexCorrupt(String),
    #[error("encoding error: {0}")]
    Encoding(#[from] encoding::Error),
    #[error("cid error: {0}")]
    Cid(#[from] ipld_cid::Error),
    #[error("store opened read-only but does not exist: {0}")]
    ReadOnlyMissing(String),
}
