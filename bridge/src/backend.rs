//! Collaborator seams for the native generation backend.
//!
//! The [`Tokenizer`] and [`Oracle`] traits decouple compilation and reduction
//! from the model runtime. Tests use the in-memory implementations in
//! `test_support`.

use anyhow::Result;

use crate::core::tree::RawTree;
use crate::core::wire::WireGraph;

/// Vocabulary index of a model token.
pub type TokenId = u32;

/// Tokenizer of a loaded model.
pub trait Tokenizer {
    /// Number of entries in the vocabulary; valid ids are `0..vocab_size`.
    fn vocab_size(&self) -> usize;

    /// Encode `text`, optionally surrounded by the BOS/EOS special tokens.
    fn tokenize(&self, text: &str, add_bos: bool, add_eos: bool) -> Result<Vec<TokenId>>;

    /// Decode a token sequence to text.
    fn detokenize(&self, tokens: &[TokenId]) -> Result<String>;
}

/// Black-box search over a compiled wire graph.
///
/// The call may block for a long time. Callers own timeout, cancellation and
/// retry policy; errors are passed through unchanged by this crate.
pub trait Oracle {
    fn evaluate(&self, graph: &WireGraph) -> Result<RawTree>;
}
