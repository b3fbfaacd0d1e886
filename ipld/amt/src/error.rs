// Copyright 2019-2026 Fuhon Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("index not found")]
    NotFound,
    #[error("index {0} is too big for this AMT")]
    IndexTooBig(u64),
    #[error("encoding error: {0}")]
    Encoding(#[from] encoding::Error),
    #[error("block store error: {0}")]
    Store(#[from] ipld_blockstore::Error),
    #[error("loaded AMT node shape is inconsistent")]
    InconsistentShape,
    #[error("bit width out of supported range")]
    InvalidBitWidth,
}
