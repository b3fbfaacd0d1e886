// Copyright 2019-2026 Fuhon Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

//! The sync engine (spec §4.9-4.12): peer rating and height tracking
//! (`Peers`, `PeerHeight`), the hello handshake (`Hello`), the blocksync
//! requester (`BlocksyncRequest`), request coalescing (`TipsetLoader`), and
//! the top-level driver (`SyncJob`).

mod bigint_cbor;
mod blocksync;
mod errors;
mod hello;
mod peer_height;
mod peers;
mod sync_job;
mod tipset_loader;

pub use blocksync::{
    rating, BlocksyncOptions, BlocksyncRequest, BlocksyncResult, BlocksyncStatus, NetworkHost, SyncStream,
    TipsetBundle, TipsetMessages, WireRequest, WireResponse,
};
pub use errors::Error;
pub use hello::{Hello, HelloMessage, HelloStream, LatencyMessage, HEARTBEAT_TIMEOUT};
pub use peer_height::PeerHeight;
pub use peers::Peers;
pub use sync_job::SyncJob;
pub use tipset_loader::TipsetLoader;
