// Copyright 2019-2026 Fuhon Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

use std::fmt;

/// Errors produced while encoding or decoding canonical CBOR.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("invalid cbor: {0}")]
    InvalidCbor(String),
    #[error("unexpected cbor major type, wanted {wanted}")]
    WrongType { wanted: &'static str },
    #[error("integer {0} does not fit in target type")]
    IntOverflow(i128),
    #[error("invalid cbor CID: {0}")]
    InvalidCborCID(String),
    #[error("wrong size: expected {expected}, got {got}")]
    WrongSize { expected: usize, got: usize },
    #[error("key not found: {0}")]
    KeyNotFound(String),
    #[error("unexpected end of cbor input")]
    Eof,
    #[error("trailing bytes after decoding value")]
    TrailingBytes,
}

impl serde::ser::Error for Error {
    fn custom<T: fmt::Display>(msg: T) -> Self {
        Error::InvalidCbor(msg.to_string())
    }
}

impl serde::de::Error for Error {
    fn custom<T: fmt::Display>(msg: T) -> Self {
        Error::InvalidCbor(msg.to_string())
    }
}
