//! Deterministic logic: compilation, masks, wire format, reduction, ranking.
//!
//! Core modules perform no I/O. Tokenizer access goes through the
//! [`crate::backend::Tokenizer`] trait so tests can run against in-memory
//! vocabularies.

pub mod compile;
pub mod defaults;
pub mod invariants;
pub mod mask;
pub mod rank;
pub mod tree;
pub mod wire;
