//! Error types for action graph validation and wire graph decoding.

use thiserror::Error;

/// Fatal problems in an action graph, raised before any tokenizer or oracle call.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// Graph has no actions, so there is no entry point.
    #[error("action graph is empty")]
    Empty,

    /// Two actions share a uid.
    #[error("duplicate action uid '{0}'")]
    DuplicateUid(String),

    /// A successor names an action that is not in the graph.
    #[error("action '{uid}' references unknown successor '{successor}'")]
    UnknownSuccessor { uid: String, successor: String },

    /// An action lists itself as an immediate successor.
    #[error("action '{0}' lists itself as a successor")]
    SelfLoop(String),

    /// `Choose` successors are neither empty, single, nor one per choice.
    #[error("choose action '{uid}' has {successors} successors for {choices} choices")]
    ChooseArity {
        uid: String,
        choices: usize,
        successors: usize,
    },

    /// `Complete` action without the required `length`.
    #[error("complete action '{0}' has no length")]
    MissingLength(String),

    /// A numeric option is outside its valid range.
    #[error("action '{uid}': {field} {reason}")]
    InvalidParameter {
        uid: String,
        field: &'static str,
        reason: String,
    },

    /// `__type__` tag outside the closed kind set.
    #[error("action '{uid}' has unsupported kind '{kind}'")]
    UnsupportedKind { uid: String, kind: String },

    /// Input is not a well-formed action graph document.
    #[error("invalid action graph json: {0}")]
    Decode(String),
}

impl GraphError {
    /// True for errors caused by missing or out-of-range action options,
    /// as opposed to structural problems with the graph.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            GraphError::MissingLength(_) | GraphError::InvalidParameter { .. }
        )
    }
}

/// Problems found while reloading a serialized wire graph.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WireError {
    #[error("invalid wire graph json: {0}")]
    Decode(String),

    #[error("wire graph schema validation failed: {0}")]
    Schema(String),

    #[error("duplicate action uid '{0}'")]
    DuplicateUid(String),

    #[error("action '{uid}' references unknown successor '{successor}'")]
    UnknownSuccessor { uid: String, successor: String },

    #[error("choose action '{uid}' has {successors} successors for {choices} choices")]
    ChooseArity {
        uid: String,
        choices: usize,
        successors: usize,
    },

    /// Token id at or beyond the vocabulary size.
    #[error("action '{uid}' carries token {token} outside vocabulary of {vocab_size}")]
    TokenOutOfRange {
        uid: String,
        token: u32,
        vocab_size: usize,
    },

    #[error("complete action '{uid}' vocab mask has {actual} entries, expected {expected}")]
    MaskLength {
        uid: String,
        expected: usize,
        actual: usize,
    },
}
