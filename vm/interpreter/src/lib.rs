// Copyright 2019-2026 Fuhon Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

//! The interpreter driver (spec §4.13): an `Interpreter` trait the core
//! consumes but never implements (the actor/VM execution rules are out of
//! scope, spec §1), an `InterpreterCache` persisting results keyed by
//! tipset hash, a `WeightCalculator` trait for the external chain-weight
//! function, and `InterpretJob`, the serial driver that walks the chain
//! graph and applies all three.

mod cache;
mod errors;
mod interpreter;
mod job;
mod weight;

pub use cache::{CachedResult, InterpretResult, InterpreterCache};
pub use errors::Error;
pub use interpreter::Interpreter;
pub use job::InterpretJob;
pub use weight::WeightCalculator;
