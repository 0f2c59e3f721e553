//! Bridge between typed action graphs and a native generation oracle.
//!
//! A caller describes a generation as a graph of [`action::Action`]s (fixed
//! text, a choice between literals, or an open completion). The crate:
//!
//! - **[`core::compile`]**: validates the graph and lowers it to a token-level
//!   [`core::wire::WireGraph`] with every option resolved.
//! - **[`core::mask`]**: derives vocabulary masks that keep completions to
//!   plain printable ASCII.
//! - **[`core::tree`]** and **[`core::rank`]**: decode the oracle's raw result
//!   tree, attach probabilities and rank the surviving completions.
//!
//! [`generate::Generator`] runs the whole pipeline against a
//! [`backend::Tokenizer`] + [`backend::Oracle`] implementation. Core modules
//! are pure; file access lives in [`io`].

pub mod action;
pub mod backend;
pub mod core;
pub mod error;
pub mod generate;
pub mod io;
pub mod logging;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use action::{Action, ActionGraph, ActionKind};
pub use backend::{Oracle, TokenId, Tokenizer};
pub use error::{GraphError, WireError};
pub use generate::{Generation, Generator};
