// Copyright 2019-2026 Fuhon Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

//! The `Interpreter` trait: the external state-transition function this
//! crate drives but never implements (spec §1's explicit non-goal — "the
//! actor/VM execution rules themselves" are out of scope). Grounded on the
//! teacher's `vm::interpreter::VM::apply_block_messages`, reduced to the
//! narrow signature spec §3/§4.13 actually needs from it: a tipset in,
//! `(state_root, message_receipts)` out.

use blocks::Tipset;
use ipld_blockstore::BlockStore;

use crate::cache::InterpretResult;
use crate::errors::Error;

/// A deterministic state-transition function over one tipset (glossary:
/// "Interpreter"). A single `interpret` call is synchronous (spec §5) —
/// callers that need to run many of these concurrently do so by spawning
/// the call, not by the trait being `async`.
pub trait Interpreter: Send + Sync {
    fn interpret(&self, store: &dyn BlockStore, tipset: &Tipset) -> Result<InterpretResult, Error>;
}
