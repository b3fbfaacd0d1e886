// Copyright 2019-2026 Fuhon Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("unknown or unsupported codec")]
    UnknownCodec,
    #[error("unsupported multihash function, expected blake2b-256")]
    UnsupportedHash,
    #[error("unrecognized CID version, expected v1")]
    InvalidCidVersion,
    #[error("failed to parse CID bytes")]
    ParsingError,
}
