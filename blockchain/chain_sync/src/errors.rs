// Copyright 2019-2026 Fuhon Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

//! Error kinds for the sync engine (spec §7's "Sync errors" and "Hello
//! errors"), folded into one enum the way `chain::Error` does for the
//! tipset graph.

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("not implemented: {0}")]
    NotImplemented(&'static str),
    #[error("stored message cids do not match header.messages")]
    StoreCidsMismatch,
    #[error("inconsistent response: {0}")]
    InconsistentResponse(String),
    #[error("incomplete response")]
    IncompleteResponse,
    #[error("request timed out")]
    Timeout,
    #[error("peer disconnected")]
    Disconnected,

    #[error("no connection to peer")]
    NoConnection,
    #[error("hello request timed out")]
    TimedOut,
    #[error("malformed message: {0}")]
    MalformedMessage(String),
    #[error("genesis mismatch")]
    GenesisMismatch,

    #[error(transparent)]
    Store(#[from] ipld_blockstore::Error),
    #[error(transparent)]
    Blocks(#[from] blocks::Error),
    #[error(transparent)]
    Chain(#[from] chain::Error),
    #[error(transparent)]
    Encoding(#[from] encoding::Error),
}
