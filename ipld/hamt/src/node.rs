// Copyright 2019-2026 Fuhon Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

use ipld_cid::CbCid;
use serde::de::{SeqAccess, Visitor};
use serde::ser::SerializeSeq;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::bitmap::Bitmap;
use crate::Error;

/// A single occupied child slot. On the wire (after [`flush`](crate::Hamt::flush))
/// only `Cid` and `Leaf` ever appear — `Ptr` is an in-memory, not-yet-hashed
/// subtree that `flush` resolves into a `Cid` before encoding.
#[derive(Debug, Clone)]
pub enum Item {
    Cid(CbCid),
    Ptr(Box<Node>),
    /// An inline bucket of up to `BUCKET_SIZE` pairs, stored directly in the
    /// parent's CBOR rather than behind its own CID.
    Leaf(Vec<(Vec<u8>, Vec<u8>)>),
}

/// A HAMT node: a bitmap of populated child slots plus the dense list of
/// [`Item`]s in ascending slot order.
#[derive(Debug, Clone, Default)]
pub struct Node {
    pub bitmap: Bitmap,
    pub items: Vec<Item>,
}

impl Node {
    pub fn empty(width_bits: usize) -> Self {
        Node {
            bitmap: Bitmap::new(width_bits),
            items: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl Serialize for Item {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Item::Cid(cid) => cid.serialize(serializer),
            Item::Ptr(_) => Err(serde::ser::Error::custom(
                "cannot encode an unflushed in-memory HAMT node; call flush() first",
            )),
            Item::Leaf(pairs) => {
                let mut seq = serializer.serialize_seq(Some(pairs.len()))?;
                for (k, v) in pairs {
                    seq.serialize_element(&(
                        serde_bytes::Bytes::new(k),
                        serde_bytes::Bytes::new(v),
                    ))?;
                }
                seq.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for Item {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ItemVisitor;
        impl<'de> Visitor<'de> for ItemVisitor {
            type Value = Item;
            fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.write_str("a CID link or an inline leaf bucket")
            }
            fn visit_borrowed_bytes<E: serde::de::Error>(self, v: &'de [u8]) -> Result<Item, E> {
                let cid = ipld_cid::Cid::try_from(v)
                    .map_err(|e| E::custom(format!("invalid cid bytes: {e}")))?;
                let cid = CbCid::try_from_cid(cid).map_err(E::custom)?;
                Ok(Item::Cid(cid))
            }
            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Item, A::Error> {
                let mut pairs = Vec::new();
                while let Some((k, v)) =
                    seq.next_element::<(serde_bytes::ByteBuf, serde_bytes::ByteBuf)>()?
                {
                    pairs.push((k.into_vec(), v.into_vec()));
                }
                Ok(Item::Leaf(pairs))
            }
        }
        deserializer.deserialize_any(ItemVisitor)
    }
}

impl Serialize for Node {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeTuple;
        let mut tup = serializer.serialize_tuple(2)?;
        tup.serialize_element(&serde_bytes::Bytes::new(self.bitmap.as_bytes()))?;
        tup.serialize_element(&self.items)?;
        tup.end()
    }
}

impl<'de> Deserialize<'de> for Node {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct NodeVisitor;
        impl<'de> Visitor<'de> for NodeVisitor {
            type Value = Node;
            fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.write_str("a 2-tuple of (bitmap, items)")
            }
            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Node, A::Error> {
                let bitmap: serde_bytes::ByteBuf = seq
                    .next_element()?
                    .ok_or_else(|| serde::de::Error::custom("missing bitmap"))?;
                let items: Vec<Item> = seq
                    .next_element()?
                    .ok_or_else(|| serde::de::Error::custom("missing items"))?;
                let bitmap = Bitmap::from_bytes(bitmap.into_vec());
                if items.len() != bitmap.popcount() {
                    return Err(serde::de::Error::custom(
                        "item count does not match bitmap popcount (inconsistent HAMT shape)",
                    ));
                }
                Ok(Node { bitmap, items })
            }
        }
        deserializer.deserialize_tuple(2, NodeVisitor)
    }
}

pub(crate) fn shape_error_to_inconsistent(e: encoding::Error) -> Error {
    match e {
        encoding::Error::InvalidCbor(_) => Error::InconsistentShape,
        other => Error::Encoding(other),
    }
}
