// Copyright 2019-2026 Fuhon Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

use serde::de::{
    self, DeserializeSeed, EnumAccess, IntoDeserializer, MapAccess, SeqAccess, VariantAccess,
    Visitor,
};

use crate::error::Error;
use crate::{LINK_SENTINEL, RAW_SENTINEL};

pub fn from_slice<'de, T: de::Deserialize<'de>>(bytes: &'de [u8]) -> Result<T, Error> {
    let mut de = Deserializer { input: bytes };
    let value = T::deserialize(&mut de)?;
    if !de.input.is_empty() {
        return Err(Error::TrailingBytes);
    }
    Ok(value)
}

/// Decodes a fixed-length CBOR array with a caller-supplied [`Visitor`]
/// instead of a `Deserialize` impl, for formats whose shape depends on
/// out-of-band context (e.g. an AMT node, whose item type depends on the
/// height carried alongside it).
pub fn from_slice_with_visitor<'de, V: Visitor<'de>>(
    bytes: &'de [u8],
    len: usize,
    visitor: V,
) -> Result<V::Value, Error> {
    let mut de = Deserializer { input: bytes };
    let value = de::Deserializer::deserialize_tuple(&mut de, len, visitor)?;
    if !de.input.is_empty() {
        return Err(Error::TrailingBytes);
    }
    Ok(value)
}

/// Decodes a value and also returns the exact byte range it occupied, so
/// callers can hash or re-sign the untouched wire bytes of a sub-field.
pub fn from_slice_with_raw<'de, T: de::Deserialize<'de>>(
    bytes: &'de [u8],
) -> Result<(T, &'de [u8]), Error> {
    let len = item_len(bytes)?;
    let (item, rest) = bytes.split_at(len);
    let value = from_slice(item)?;
    if !rest.is_empty() {
        return Err(Error::TrailingBytes);
    }
    Ok((value, item))
}

struct Head {
    major: u8,
    arg: u64,
    header_len: usize,
}

fn read_head(input: &[u8]) -> Result<Head, Error> {
    let first = *input.first().ok_or(Error::Eof)?;
    let major = first >> 5;
    let info = first & 0x1F;
    match info {
        0..=23 => Ok(Head {
            major,
            arg: info as u64,
            header_len: 1,
        }),
        24 => {
            let b = *input.get(1).ok_or(Error::Eof)?;
            Ok(Head {
                major,
                arg: b as u64,
                header_len: 2,
            })
        }
        25 => {
            let b: [u8; 2] = input.get(1..3).ok_or(Error::Eof)?.try_into().unwrap();
            Ok(Head {
                major,
                arg: u16::from_be_bytes(b) as u64,
                header_len: 3,
            })
        }
        26 => {
            let b: [u8; 4] = input.get(1..5).ok_or(Error::Eof)?.try_into().unwrap();
            Ok(Head {
                major,
                arg: u32::from_be_bytes(b) as u64,
                header_len: 5,
            })
        }
        27 => {
            let b: [u8; 8] = input.get(1..9).ok_or(Error::Eof)?.try_into().unwrap();
            Ok(Head {
                major,
                arg: u64::from_be_bytes(b),
                header_len: 9,
            })
        }
        _ => Err(Error::InvalidCbor(format!("unsupported additional info {info}"))),
    }
}

/// Length in bytes of the next complete CBOR item at the front of `input`,
/// without fully decoding it (used by nested-raw and skip-on-wrong-variant).
fn item_len(input: &[u8]) -> Result<usize, Error> {
    let head = read_head(input)?;
    let hl = head.header_len;
    Ok(match head.major {
        0 | 1 => hl,
        2 | 3 => hl + head.arg as usize,
        4 => {
            let mut total = hl;
            for _ in 0..head.arg {
                total += item_len(&input[total..])?;
            }
            total
        }
        5 => {
            let mut total = hl;
            for _ in 0..head.arg {
                total += item_len(&input[total..])?; // key
                total += item_len(&input[total..])?; // value
            }
            total
        }
        6 => hl + item_len(&input[hl..])?,
        7 => hl, // bool/null/float already consumed via header_len variants below
        _ => return Err(Error::InvalidCbor("bad major type".into())),
    })
}

pub struct Deserializer<'de> {
    input: &'de [u8],
}

impl<'de> Deserializer<'de> {
    fn peek_head(&self) -> Result<Head, Error> {
        read_head(self.input)
    }

    fn advance(&mut self, n: usize) {
        self.input = &self.input[n..];
    }

    fn take_bytes(&mut self, head: &Head) -> Result<&'de [u8], Error> {
        let start = head.header_len;
        let end = start + head.arg as usize;
        let bytes = self.input.get(start..end).ok_or(Error::Eof)?;
        self.advance(end);
        Ok(bytes)
    }
}

impl<'de, 'a> de::Deserializer<'de> for &'a mut Deserializer<'de> {
    type Error = Error;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Error> {
        let head = self.peek_head()?;
        match head.major {
            0 => {
                self.advance(head.header_len);
                visitor.visit_u64(head.arg)
            }
            1 => {
                self.advance(head.header_len);
                let v = -1i128 - head.arg as i128;
                if v < i64::MIN as i128 {
                    return Err(Error::IntOverflow(v));
                }
                visitor.visit_i64(v as i64)
            }
            2 => {
                let bytes = self.take_bytes(&head)?;
                visitor.visit_borrowed_bytes(bytes)
            }
            3 => {
                let bytes = self.take_bytes(&head)?;
                let s = std::str::from_utf8(bytes)
                    .map_err(|e| Error::InvalidCbor(e.to_string()))?;
                visitor.visit_borrowed_str(s)
            }
            4 => self.deserialize_seq(visitor),
            5 => self.deserialize_map(visitor),
            6 => {
                if head.arg != 42 {
                    return Err(Error::InvalidCbor(format!("unsupported tag {}", head.arg)));
                }
                self.advance(head.header_len);
                let inner_head = self.peek_head()?;
                if inner_head.major != 2 {
                    return Err(Error::InvalidCborCID("tag 42 payload must be bytes".into()));
                }
                let bytes = self.take_bytes(&inner_head)?;
                if bytes.first() != Some(&0u8) {
                    return Err(Error::InvalidCborCID("missing multibase-identity prefix".into()));
                }
                visitor.visit_borrowed_bytes(&bytes[1..])
            }
            7 => {
                let b = self.input[0];
                match b {
                    0xF4 => {
                        self.advance(1);
                        visitor.visit_bool(false)
                    }
                    0xF5 => {
                        self.advance(1);
                        visitor.visit_bool(true)
                    }
                    0xF6 | 0xF7 => {
                        self.advance(1);
                        visitor.visit_unit()
                    }
                    0xFB => {
                        let bytes: [u8; 8] =
                            self.input.get(1..9).ok_or(Error::Eof)?.try_into().unwrap();
                        self.advance(9);
                        visitor.visit_f64(f64::from_be_bytes(bytes))
                    }
                    _ => Err(Error::InvalidCbor(format!("unsupported simple value {b:#x}"))),
                }
            }
            _ => Err(Error::InvalidCbor("bad major type".into())),
        }
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Error> {
        if self.input.first() == Some(&0xF6) {
            self.advance(1);
            visitor.visit_none()
        } else {
            visitor.visit_some(self)
        }
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        name: &'static str,
        visitor: V,
    ) -> Result<V::Value, Error> {
        if name == RAW_SENTINEL {
            let len = item_len(self.input)?;
            let raw = &self.input[..len];
            self.advance(len);
            return visitor.visit_borrowed_bytes(raw);
        }
        let _ = name;
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_seq<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Error> {
        let head = self.peek_head()?;
        if head.major != 4 {
            return Err(Error::WrongType { wanted: "array" });
        }
        self.advance(head.header_len);
        let mut access = SeqAccessor {
            de: self,
            remaining: head.arg,
        };
        visitor.visit_seq(&mut access)
    }

    fn deserialize_map<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Error> {
        let head = self.peek_head()?;
        if head.major != 5 {
            return Err(Error::WrongType { wanted: "map" });
        }
        self.advance(head.header_len);
        let mut access = MapAccessor {
            de: self,
            remaining: head.arg,
        };
        visitor.visit_map(&mut access)
    }

    fn deserialize_enum<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, Error> {
        let head = self.peek_head()?;
        if head.major == 3 {
            // unit variant encoded as its name
            let bytes = self.take_bytes(&head)?;
            let s = std::str::from_utf8(bytes).map_err(|e| Error::InvalidCbor(e.to_string()))?;
            return visitor.visit_enum(s.into_deserializer());
        }
        if head.major != 5 || head.arg != 1 {
            return Err(Error::WrongType {
                wanted: "single-entry map enum",
            });
        }
        self.advance(head.header_len);
        visitor.visit_enum(EnumAccessor { de: self })
    }

    fn deserialize_bool<V: Visitor<'de>>(self, v: V) -> Result<V::Value, Error> {
        self.deserialize_any(v)
    }
    fn deserialize_i8<V: Visitor<'de>>(self, v: V) -> Result<V::Value, Error> {
        self.deserialize_any(v)
    }
    fn deserialize_i16<V: Visitor<'de>>(self, v: V) -> Result<V::Value, Error> {
        self.deserialize_any(v)
    }
    fn deserialize_i32<V: Visitor<'de>>(self, v: V) -> Result<V::Value, Error> {
        self.deserialize_any(v)
    }
    fn deserialize_i64<V: Visitor<'de>>(self, v: V) -> Result<V::Value, Error> {
        self.deserialize_any(v)
    }
    fn deserialize_u8<V: Visitor<'de>>(self, v: V) -> Result<V::Value, Error> {
        self.deserialize_any(v)
    }
    fn deserialize_u16<V: Visitor<'de>>(self, v: V) -> Result<V::Value, Error> {
        self.deserialize_any(v)
    }
    fn deserialize_u32<V: Visitor<'de>>(self, v: V) -> Result<V::Value, Error> {
        self.deserialize_any(v)
    }
    fn deserialize_u64<V: Visitor<'de>>(self, v: V) -> Result<V::Value, Error> {
        self.deserialize_any(v)
    }
    fn deserialize_f32<V: Visitor<'de>>(self, v: V) -> Result<V::Value, Error> {
        self.deserialize_any(v)
    }
    fn deserialize_f64<V: Visitor<'de>>(self, v: V) -> Result<V::Value, Error> {
        self.deserialize_any(v)
    }
    fn deserialize_char<V: Visitor<'de>>(self, v: V) -> Result<V::Value, Error> {
        self.deserialize_any(v)
    }
    fn deserialize_str<V: Visitor<'de>>(self, v: V) -> Result<V::Value, Error> {
        self.deserialize_any(v)
    }
    fn deserialize_string<V: Visitor<'de>>(self, v: V) -> Result<V::Value, Error> {
        self.deserialize_any(v)
    }
    fn deserialize_bytes<V: Visitor<'de>>(self, v: V) -> Result<V::Value, Error> {
        self.deserialize_any(v)
    }
    fn deserialize_byte_buf<V: Visitor<'de>>(self, v: V) -> Result<V::Value, Error> {
        self.deserialize_any(v)
    }
    fn deserialize_unit<V: Visitor<'de>>(self, v: V) -> Result<V::Value, Error> {
        self.deserialize_any(v)
    }
    fn deserialize_unit_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        v: V,
    ) -> Result<V::Value, Error> {
        self.deserialize_any(v)
    }
    fn deserialize_tuple<V: Visitor<'de>>(self, _len: usize, v: V) -> Result<V::Value, Error> {
        self.deserialize_seq(v)
    }
    fn deserialize_tuple_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _len: usize,
        v: V,
    ) -> Result<V::Value, Error> {
        self.deserialize_seq(v)
    }
    fn deserialize_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _fields: &'static [&'static str],
        v: V,
    ) -> Result<V::Value, Error> {
        self.deserialize_map(v)
    }
    fn deserialize_identifier<V: Visitor<'de>>(self, v: V) -> Result<V::Value, Error> {
        self.deserialize_any(v)
    }
    fn deserialize_ignored_any<V: Visitor<'de>>(self, v: V) -> Result<V::Value, Error> {
        let len = item_len(self.input)?;
        self.advance(len);
        v.visit_unit()
    }
}

struct SeqAccessor<'de, 'a> {
    de: &'a mut Deserializer<'de>,
    remaining: u64,
}

impl<'de, 'a> SeqAccess<'de> for SeqAccessor<'de, 'a> {
    type Error = Error;
    fn next_element_seed<T: DeserializeSeed<'de>>(
        &mut self,
        seed: T,
    ) -> Result<Option<T::Value>, Error> {
        if self.remaining == 0 {
            return Ok(None);
        }
        self.remaining -= 1;
        seed.deserialize(&mut *self.de).map(Some)
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.remaining as usize)
    }
}

struct MapAccessor<'de, 'a> {
    de: &'a mut Deserializer<'de>,
    remaining: u64,
}

impl<'de, 'a> MapAccess<'de> for MapAccessor<'de, 'a> {
    type Error = Error;
    fn next_key_seed<K: DeserializeSeed<'de>>(
        &mut self,
        seed: K,
    ) -> Result<Option<K::Value>, Error> {
        if self.remaining == 0 {
            return Ok(None);
        }
        self.remaining -= 1;
        seed.deserialize(&mut *self.de).map(Some)
    }

    fn next_value_seed<V: DeserializeSeed<'de>>(&mut self, seed: V) -> Result<V::Value, Error> {
        seed.deserialize(&mut *self.de)
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.remaining as usize)
    }
}

struct EnumAccessor<'de, 'a> {
    de: &'a mut Deserializer<'de>,
}

impl<'de, 'a> EnumAccess<'de> for EnumAccessor<'de, 'a> {
    type Error = Error;
    type Variant = Self;
    fn variant_seed<V: DeserializeSeed<'de>>(
        self,
        seed: V,
    ) -> Result<(V::Value, Self::Variant), Error> {
        let val = seed.deserialize(&mut *self.de)?;
        Ok((val, self))
    }
}

impl<'de, 'a> VariantAccess<'de> for EnumAccessor<'de, 'a> {
    type Error = Error;
    fn unit_variant(self) -> Result<(), Error> {
        Err(Error::InvalidCbor("unexpected unit variant payload".into()))
    }
    fn newtype_variant_seed<T: DeserializeSeed<'de>>(self, seed: T) -> Result<T::Value, Error> {
        seed.deserialize(self.de)
    }
    fn tuple_variant<V: Visitor<'de>>(self, len: usize, visitor: V) -> Result<V::Value, Error> {
        de::Deserializer::deserialize_tuple(self.de, len, visitor)
    }
    fn struct_variant<V: Visitor<'de>>(
        self,
        fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, Error> {
        de::Deserializer::deserialize_struct(self.de, "", fields, visitor)
    }
}
