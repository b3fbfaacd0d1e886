// Copyright 2019-2026 Fuhon Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

//! `#[serde(with = "bigint_cbor")]` helper for encoding a [`BigInt`] as a
//! sign byte followed by big-endian magnitude bytes, wire-compatible with
//! the reference implementation's `parent_weight` encoding.

use num_bigint::{BigInt, Sign};
use serde::Serialize as _;

pub fn serialize<S>(int: &BigInt, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    let (sign, mut bytes) = int.to_bytes_be();
    match sign {
        Sign::Minus => bytes.insert(0, 1),
        Sign::Plus => bytes.insert(0, 0),
        Sign::NoSign => bytes.clear(),
    }
    serde_bytes::Bytes::new(&bytes).serialize(serializer)
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<BigInt, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let mut bytes: Vec<u8> = serde_bytes::deserialize(deserializer)?;
    if bytes.is_empty() {
        return Ok(BigInt::default());
    }
    let sign = match bytes.remove(0) {
        0 => Sign::Plus,
        1 => Sign::Minus,
        _ => return Err(serde::de::Error::custom("invalid bigint sign byte")),
    };
    Ok(BigInt::from_bytes_be(sign, &bytes))
}
