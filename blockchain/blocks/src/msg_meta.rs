// Copyright 2019-2026 Fuhon Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

//! `MsgMeta`: the small CBOR object a block header's `messages` field points
//! to, holding the AMT roots of the BLS- and Secp-signed message CID lists
//! carried by the block (spec §3, §4.11).

use encoding::tuple::*;
use ipld_amt::Amt;
use ipld_blockstore::BlockStore;
use ipld_cid::CbCid;

use crate::Error;

/// Tuple-encoded (`CBOR_TUPLE(MsgMeta, ...)` in the original) to match the
/// reference wire form.
#[derive(Clone, Debug, PartialEq, Eq, Serialize_tuple, Deserialize_tuple)]
pub struct MsgMeta {
    pub bls_message_root: CbCid,
    pub secp_message_root: CbCid,
}

/// Builds an AMT over `cids` (inserted in order under ascending integer
/// indices) and flushes it, returning the root CID.
pub fn amt_root_of<BS: BlockStore>(store: &BS, cids: &[CbCid]) -> Result<CbCid, Error> {
    let mut amt = Amt::new(store)?;
    for (i, cid) in cids.iter().enumerate() {
        amt.set(i as u64, cid.to_bytes())?;
    }
    Ok(amt.flush()?)
}

/// Reads back the ordered list of message CIDs stored under an AMT root.
pub fn amt_contents<BS: BlockStore>(store: &BS, root: &CbCid) -> Result<Vec<CbCid>, Error> {
    let amt = Amt::load(store, root)?;
    let mut out = Vec::with_capacity(amt.count() as usize);
    amt.visit(|_, bytes| {
        let cid = CbCid::from_bytes(bytes).map_err(|_| ipld_amt::Error::InconsistentShape)?;
        out.push(cid);
        Ok(())
    })?;
    Ok(out)
}

impl MsgMeta {
    pub fn build<BS: BlockStore>(
        store: &BS,
        bls_messages: &[CbCid],
        secp_messages: &[CbCid],
    ) -> Result<Self, Error> {
        Ok(MsgMeta {
            bls_message_root: amt_root_of(store, bls_messages)?,
            secp_message_root: amt_root_of(store, secp_messages)?,
        })
    }
}
