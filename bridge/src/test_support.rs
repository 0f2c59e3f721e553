//! Test-only tokenizer, oracle and result-tree helpers.
//!
//! [`CharTokenizer`] has a small fixed vocabulary:
//!
//! | id        | text                          |
//! |-----------|-------------------------------|
//! | 0         | BOS, decodes to `""`          |
//! | 1         | EOS, fails to decode          |
//! | 2..=129   | one ASCII byte (`0..=127`)    |
//! | 130       | `"the"`                       |
//! | 131       | `"é"`                         |
//! | 132       | `"\n\n"`                      |
//! | 133       | `" world"`                    |

use std::cell::{Cell, RefCell};

use anyhow::{Result, anyhow};

use crate::backend::{Oracle, TokenId, Tokenizer};
use crate::core::tree::{ActionRef, RawTree};
use crate::core::wire::{WireGraph, WireKind};

pub const BOS_ID: TokenId = 0;
pub const EOS_ID: TokenId = 1;
pub const THE_ID: TokenId = 130;
pub const NON_ASCII_ID: TokenId = 131;
pub const MULTI_NEWLINE_ID: TokenId = 132;
pub const WORLD_ID: TokenId = 133;

const ASCII_BASE: TokenId = 2;
const VOCAB_SIZE: usize = 134;

/// Token id of an ASCII character.
///
/// # Panics
/// Panics if `c` is not ASCII.
pub fn char_id(c: char) -> TokenId {
    assert!(c.is_ascii(), "char_id: {c:?} is not ASCII");
    c as TokenId + ASCII_BASE
}

/// Deterministic tokenizer over the vocabulary in the module docs.
///
/// Encoding is one token per ASCII character; `é` maps to [`NON_ASCII_ID`]
/// and every other non-ASCII character is an error.
#[derive(Debug, Clone, Copy, Default)]
pub struct CharTokenizer;

impl CharTokenizer {
    pub fn new() -> Self {
        Self
    }
}

impl Tokenizer for CharTokenizer {
    fn vocab_size(&self) -> usize {
        VOCAB_SIZE
    }

    fn tokenize(&self, text: &str, add_bos: bool, add_eos: bool) -> Result<Vec<TokenId>> {
        let mut tokens = Vec::with_capacity(text.len() + 2);
        if add_bos {
            tokens.push(BOS_ID);
        }
        for c in text.chars() {
            let id = match c {
                'é' => NON_ASCII_ID,
                c if c.is_ascii() => char_id(c),
                other => return Err(anyhow!("character {other:?} is not in the vocabulary")),
            };
            tokens.push(id);
        }
        if add_eos {
            tokens.push(EOS_ID);
        }
        Ok(tokens)
    }

    fn detokenize(&self, tokens: &[TokenId]) -> Result<String> {
        let mut text = String::new();
        for &id in tokens {
            match id {
                BOS_ID => {}
                EOS_ID => return Err(anyhow!("token {id} has no text")),
                THE_ID => text.push_str("the"),
                NON_ASCII_ID => text.push('é'),
                MULTI_NEWLINE_ID => text.push_str("\n\n"),
                WORLD_ID => text.push_str(" world"),
                id if (ASCII_BASE..THE_ID).contains(&id) => {
                    text.push(char::from((id - ASCII_BASE) as u8));
                }
                id => return Err(anyhow!("token {id} is outside the vocabulary")),
            }
        }
        Ok(text)
    }
}

/// Tokenizer wrapper that counts calls.
#[derive(Debug, Default)]
pub struct CountingTokenizer<T> {
    inner: T,
    tokenize_calls: Cell<usize>,
    detokenize_calls: Cell<usize>,
}

impl<T: Tokenizer> CountingTokenizer<T> {
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            tokenize_calls: Cell::new(0),
            detokenize_calls: Cell::new(0),
        }
    }

    pub fn tokenize_calls(&self) -> usize {
        self.tokenize_calls.get()
    }

    pub fn detokenize_calls(&self) -> usize {
        self.detokenize_calls.get()
    }

    pub fn reset(&self) {
        self.tokenize_calls.set(0);
        self.detokenize_calls.set(0);
    }
}

impl<T: Tokenizer> Tokenizer for CountingTokenizer<T> {
    fn vocab_size(&self) -> usize {
        self.inner.vocab_size()
    }

    fn tokenize(&self, text: &str, add_bos: bool, add_eos: bool) -> Result<Vec<TokenId>> {
        self.tokenize_calls.set(self.tokenize_calls.get() + 1);
        self.inner.tokenize(text, add_bos, add_eos)
    }

    fn detokenize(&self, tokens: &[TokenId]) -> Result<String> {
        self.detokenize_calls.set(self.detokenize_calls.get() + 1);
        self.inner.detokenize(tokens)
    }
}

/// Oracle that replays the graph's first-successor path as a single node.
///
/// Text tokens and the first choice of each `Choose` are concatenated;
/// `Complete` records contribute nothing. All log-probabilities are zero.
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoOracle;

impl Oracle for EchoOracle {
    fn evaluate(&self, graph: &WireGraph) -> Result<RawTree> {
        let mut tokens = Vec::new();
        let mut current = graph.entry();
        // Bounded by the action count so a cycle cannot spin forever.
        for _ in 0..graph.actions.len() {
            let Some(action) = current else {
                break;
            };
            match &action.kind {
                WireKind::Text { tokens: literal, .. } => tokens.extend_from_slice(literal),
                WireKind::Choose { choices, .. } => {
                    if let Some(first) = choices.first() {
                        tokens.extend_from_slice(first);
                    }
                }
                WireKind::Complete { .. } => {}
            }
            current = action
                .successors
                .first()
                .and_then(|successor| graph.get(successor));
        }
        let length = u32::try_from(tokens.len())?;
        Ok(RawTree {
            action: ActionRef::Index(0),
            logprobs: vec![0.0; tokens.len()],
            tokens,
            logprob: 0.0,
            length,
            pruned: false,
            children: Vec::new(),
        })
    }
}

/// Oracle that returns a fixed outcome and records what it was asked.
#[derive(Debug)]
pub struct ScriptedOracle {
    outcome: std::result::Result<RawTree, String>,
    calls: Cell<usize>,
    last_graph: RefCell<Option<WireGraph>>,
}

impl ScriptedOracle {
    pub fn returning(tree: RawTree) -> Self {
        Self::with_outcome(Ok(tree))
    }

    pub fn failing(message: &str) -> Self {
        Self::with_outcome(Err(message.to_string()))
    }

    fn with_outcome(outcome: std::result::Result<RawTree, String>) -> Self {
        Self {
            outcome,
            calls: Cell::new(0),
            last_graph: RefCell::new(None),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.get()
    }

    pub fn last_graph(&self) -> Option<WireGraph> {
        self.last_graph.borrow().clone()
    }
}

impl Oracle for ScriptedOracle {
    fn evaluate(&self, graph: &WireGraph) -> Result<RawTree> {
        self.calls.set(self.calls.get() + 1);
        *self.last_graph.borrow_mut() = Some(graph.clone());
        match &self.outcome {
            Ok(tree) => Ok(tree.clone()),
            Err(message) => Err(anyhow!("{message}")),
        }
    }
}

/// [`CharTokenizer`] paired with an oracle, usable as a generation backend.
#[derive(Debug, Default)]
pub struct TestBackend<O> {
    pub tokenizer: CharTokenizer,
    pub oracle: O,
}

impl<O: Oracle> TestBackend<O> {
    pub fn new(oracle: O) -> Self {
        Self {
            tokenizer: CharTokenizer::new(),
            oracle,
        }
    }
}

impl<O> Tokenizer for TestBackend<O> {
    fn vocab_size(&self) -> usize {
        self.tokenizer.vocab_size()
    }

    fn tokenize(&self, text: &str, add_bos: bool, add_eos: bool) -> Result<Vec<TokenId>> {
        self.tokenizer.tokenize(text, add_bos, add_eos)
    }

    fn detokenize(&self, tokens: &[TokenId]) -> Result<String> {
        self.tokenizer.detokenize(tokens)
    }
}

impl<O: Oracle> Oracle for TestBackend<O> {
    fn evaluate(&self, graph: &WireGraph) -> Result<RawTree> {
        self.oracle.evaluate(graph)
    }
}

/// Raw leaf whose `length` is the number of tokens.
pub fn raw_leaf(
    action: ActionRef,
    tokens: Vec<TokenId>,
    logprobs: Vec<f64>,
    logprob: f64,
    pruned: bool,
) -> RawTree {
    RawTree {
        action,
        length: u32::try_from(tokens.len()).unwrap_or(u32::MAX),
        tokens,
        logprobs,
        logprob,
        pruned,
        children: Vec::new(),
    }
}

/// Raw interior node with zero log-probabilities.
pub fn raw_node(action: ActionRef, tokens: Vec<TokenId>, children: Vec<RawTree>) -> RawTree {
    RawTree {
        action,
        length: u32::try_from(tokens.len()).unwrap_or(u32::MAX),
        logprobs: vec![0.0; tokens.len()],
        tokens,
        logprob: 0.0,
        pruned: false,
        children,
    }
}
