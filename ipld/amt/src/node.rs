// Copyright 2019-2026 Fuhon Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

use ipld_cid::CbCid;
use serde::de::{SeqAccess, Visitor};
use serde::ser::SerializeTuple;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::bitmap::Bitmap;
use crate::Error;

/// A single occupied child slot of an interior node. On the wire (after
/// [`flush`](crate::Amt::flush)) only `Cid` ever appears; `Ptr` is an
/// in-memory, not-yet-hashed subtree that `flush` resolves into a `Cid`.
#[derive(Debug, Clone)]
pub enum Item {
    Cid(CbCid),
    Ptr(Box<Node>),
}

/// An AMT node. Whether a node is a leaf (`height == 0`, values stored
/// directly) or interior (links to height-1 children) is carried by its
/// *position* in the tree, not by a tag on the node itself — so decoding a
/// node's bytes requires knowing its height up front. See [`decode_leaf`]/
/// [`decode_interior`].
#[derive(Debug, Clone, Default)]
pub struct Node {
    pub bitmap: Bitmap,
    pub values: Vec<Vec<u8>>,
    pub links: Vec<Item>,
}

impl Node {
    pub fn empty(width: usize) -> Self {
        Node {
            bitmap: Bitmap::new(width),
            values: Vec::new(),
            links: Vec::new(),
        }
    }

    pub fn child_count(&self) -> usize {
        self.values.len() + self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.child_count() == 0
    }
}

impl Serialize for Item {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Item::Cid(cid) => cid.serialize(serializer),
            Item::Ptr(_) => Err(serde::ser::Error::custom(
                "cannot encode an unflushed in-memory AMT node; call flush() first",
            )),
        }
    }
}

impl Serialize for Node {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut tup = serializer.serialize_tuple(2)?;
        tup.serialize_element(&serde_bytes::Bytes::new(self.bitmap.as_bytes()))?;
        if self.links.is_empty() {
            let values: Vec<_> = self.values.iter().map(|v| serde_bytes::Bytes::new(v)).collect();
            tup.serialize_element(&values)?;
        } else {
            tup.serialize_element(&self.links)?;
        }
        tup.end()
    }
}

struct BitmapOnly(Bitmap);

impl<'de> Deserialize<'de> for BitmapOnly {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let b = serde_bytes::ByteBuf::deserialize(deserializer)?;
        Ok(BitmapOnly(Bitmap::from_bytes(b.into_vec())))
    }
}

/// Decodes `bytes` as a height-0 (leaf) node: `(bitmap, [value, ...])`.
pub(crate) fn decode_leaf(bytes: &[u8]) -> Result<Node, Error> {
    struct LeafVisitor;
    impl<'de> Visitor<'de> for LeafVisitor {
        type Value = Node;
        fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
            f.write_str("a 2-tuple of (bitmap, values)")
        }
        fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Node, A::Error> {
            let bitmap: BitmapOnly = seq
                .next_element()?
                .ok_or_else(|| serde::de::Error::custom("missing bitmap"))?;
            let values: Vec<serde_bytes::ByteBuf> = seq
                .next_element()?
                .ok_or_else(|| serde::de::Error::custom("missing values"))?;
            let values: Vec<Vec<u8>> = values.into_iter().map(|b| b.into_vec()).collect();
            if values.len() != bitmap.0.popcount() {
                return Err(serde::de::Error::custom(
                    "leaf value count does not match bitmap popcount (inconsistent AMT shape)",
                ));
            }
            Ok(Node {
                bitmap: bitmap.0,
                values,
                links: Vec::new(),
            })
        }
    }
    encoding::from_slice_with_visitor(bytes, 2, LeafVisitor).map_err(shape_error_to_inconsistent)
}

/// Decodes `bytes` as a height>0 (interior) node: `(bitmap, [cid, ...])`.
pub(crate) fn decode_interior(bytes: &[u8]) -> Result<Node, Error> {
    struct InteriorVisitor;
    impl<'de> Visitor<'de> for InteriorVisitor {
        type Value = Node;
        fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
            f.write_str("a 2-tuple of (bitmap, links)")
        }
        fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Node, A::Error> {
            let bitmap: BitmapOnly = seq
                .next_element()?
                .ok_or_else(|| serde::de::Error::custom("missing bitmap"))?;
            let links: Vec<CbCid> = seq
                .next_element()?
                .ok_or_else(|| serde::de::Error::custom("missing links"))?;
            if links.len() != bitmap.0.popcount() {
                return Err(serde::de::Error::custom(
                    "link count does not match bitmap popcount (inconsistent AMT shape)",
                ));
            }
            Ok(Node {
                bitmap: bitmap.0,
                values: Vec::new(),
                links: links.into_iter().map(Item::Cid).collect(),
            })
        }
    }
    encoding::from_slice_with_visitor(bytes, 2, InteriorVisitor).map_err(shape_error_to_inconsistent)
}

/// The persisted root: `(bit_width, height, count, root_node)`. `bit_width`
/// is only ever written when it differs from the codebase default, matching
/// the reference encoding's omission of the common case.
#[derive(Debug, Clone)]
pub struct Root {
    pub bit_width: Option<u32>,
    pub height: u32,
    pub count: u64,
    pub node: Node,
}

impl Serialize for Root {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut tup = serializer.serialize_tuple(4)?;
        tup.serialize_element(&self.bit_width)?;
        tup.serialize_element(&self.height)?;
        tup.serialize_element(&self.count)?;
        tup.serialize_element(&self.node)?;
        tup.end()
    }
}

impl<'de> Deserialize<'de> for Root {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct RootVisitor;
        impl<'de> Visitor<'de> for RootVisitor {
            type Value = Root;
            fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.write_str("a 4-tuple of (bit_width, height, count, node)")
            }
            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Root, A::Error> {
                let bit_width: Option<u32> = seq
                    .next_element()?
                    .ok_or_else(|| serde::de::Error::custom("missing bit_width"))?;
                let height: u32 = seq
                    .next_element()?
                    .ok_or_else(|| serde::de::Error::custom("missing height"))?;
                let count: u64 = seq
                    .next_element()?
                    .ok_or_else(|| serde::de::Error::custom("missing count"))?;
                let raw: encoding::Raw = seq
                    .next_element()?
                    .ok_or_else(|| serde::de::Error::custom("missing node"))?;
                let node = if height == 0 {
                    decode_leaf(&raw.0)
                } else {
                    decode_interior(&raw.0)
                }
                .map_err(|e| serde::de::Error::custom(e.to_string()))?;
                Ok(Root {
                    bit_width,
                    height,
                    count,
                    node,
                })
            }
        }
        deserializer.deserialize_tuple(4, RootVisitor)
    }
}

pub(crate) fn shape_error_to_inconsistent(e: encoding::Error) -> Error {
    match e {
        encoding::Error::InvalidCbor(_) => Error::InconsistentShape,
        other => Error::Encoding(other),
    }
}
