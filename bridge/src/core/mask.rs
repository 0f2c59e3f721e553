//! Vocabulary masks restricting which tokens the oracle may emit.
//!
//! Both builders probe the tokenizer one entry at a time. A failing probe only
//! clears the corresponding bit; building a mask never fails.

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::backend::{TokenId, Tokenizer};

/// Boolean constraint indexed by token id, one entry per vocabulary slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VocabMask {
    bits: Vec<bool>,
}

impl VocabMask {
    /// Mask that allows every token.
    pub fn allow_all(vocab_size: usize) -> Self {
        Self {
            bits: vec![true; vocab_size],
        }
    }

    /// Mask that allows no token.
    pub fn allow_none(vocab_size: usize) -> Self {
        Self {
            bits: vec![false; vocab_size],
        }
    }

    pub fn from_bits(bits: Vec<bool>) -> Self {
        Self { bits }
    }

    /// Number of vocabulary entries covered.
    pub fn len(&self) -> usize {
        self.bits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    /// Ids outside the vocabulary are never allowed.
    pub fn is_allowed(&self, id: TokenId) -> bool {
        usize::try_from(id)
            .ok()
            .and_then(|idx| self.bits.get(idx).copied())
            .unwrap_or(false)
    }

    pub fn allowed_count(&self) -> usize {
        self.bits.iter().filter(|&&bit| bit).count()
    }

    /// Allowed ids in ascending order.
    pub fn allowed_ids(&self) -> impl Iterator<Item = TokenId> + '_ {
        (0..).zip(&self.bits).filter(|(_, bit)| **bit).map(|(id, _)| id)
    }

    pub fn as_slice(&self) -> &[bool] {
        &self.bits
    }

    /// Set every disallowed logit to negative infinity.
    ///
    /// Fails without touching `logits` when its length differs from the mask.
    pub fn apply_to_logits(&self, logits: &mut [f32]) -> Result<()> {
        if logits.len() != self.bits.len() {
            return Err(anyhow!(
                "logits length {} != vocab_size {}",
                logits.len(),
                self.bits.len()
            ));
        }
        for (logit, &allowed) in logits.iter_mut().zip(&self.bits) {
            if !allowed {
                *logit = f32::NEG_INFINITY;
            }
        }
        Ok(())
    }

    fn set(&mut self, id: TokenId, value: bool) {
        if let Some(bit) = usize::try_from(id).ok().and_then(|idx| self.bits.get_mut(idx)) {
            *bit = value;
        }
    }
}

/// Characters a completion may be built from: ASCII letters, digits,
/// ASCII punctuation, space and newline.
pub fn is_allowed_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c.is_ascii_punctuation() || c == ' ' || c == '\n'
}

/// Every allowed character, in ASCII order.
pub fn allowed_alphabet() -> impl Iterator<Item = char> {
    (0u8..=127).map(char::from).filter(|&c| is_allowed_char(c))
}

/// Mask of tokens that decode to plain printable ASCII.
///
/// A token is excluded when decoding fails, yields empty text, or yields text
/// with a control character (including `\n`, `\r`, `\t`) or a code point
/// above 126. A token whose text is exactly one allowed character is kept
/// regardless, which admits the bare newline token.
pub fn build_safe_mask<T: Tokenizer + ?Sized>(tokenizer: &T) -> VocabMask {
    let vocab_size = tokenizer.vocab_size();
    let mut mask = VocabMask::allow_all(vocab_size);
    for id in token_ids(vocab_size) {
        let keep = match tokenizer.detokenize(&[id]) {
            Ok(text) => !is_problematic(&text) || is_single_allowed_char(&text),
            Err(err) => {
                trace!(token = id, error = %err, "token failed to decode");
                false
            }
        };
        if !keep {
            mask.set(id, false);
        }
    }
    debug!(
        vocab_size,
        allowed = mask.allowed_count(),
        "built safe vocabulary mask"
    );
    mask
}

/// Mask of tokens that are the sole encoding of one allowed character.
pub fn build_single_char_mask<T: Tokenizer + ?Sized>(tokenizer: &T) -> VocabMask {
    let vocab_size = tokenizer.vocab_size();
    let mut mask = VocabMask::allow_none(vocab_size);
    let mut buf = [0u8; 4];
    for c in allowed_alphabet() {
        let tokens = match tokenizer.tokenize(c.encode_utf8(&mut buf), false, false) {
            Ok(tokens) => tokens,
            Err(err) => {
                trace!(character = ?c, error = %err, "character failed to tokenize");
                continue;
            }
        };
        if let [id] = tokens.as_slice() {
            // `set` ignores ids outside the vocabulary.
            mask.set(*id, true);
        }
    }
    debug!(
        vocab_size,
        allowed = mask.allowed_count(),
        "built single-char vocabulary mask"
    );
    mask
}

fn token_ids(vocab_size: usize) -> impl Iterator<Item = TokenId> {
    let end = TokenId::try_from(vocab_size).unwrap_or(TokenId::MAX);
    0..end
}

fn is_problematic(text: &str) -> bool {
    text.is_empty() || text.chars().any(|c| (c as u32) < 32 || (c as u32) > 126)
}

fn is_single_allowed_char(text: &str) -> bool {
    let mut chars = text.chars();
    matches!((chars.next(), chars.next()), (Some(c), None) if is_allowed_char(c))
}

/// Safe and single-char masks for one tokenizer, built once and shared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VocabMasks {
    safe: VocabMask,
    single_char: VocabMask,
}

impl VocabMasks {
    pub fn build<T: Tokenizer + ?Sized>(tokenizer: &T) -> Self {
        Self {
            safe: build_safe_mask(tokenizer),
            single_char: build_single_char_mask(tokenizer),
        }
    }

    pub fn safe(&self) -> &VocabMask {
        &self.safe
    }

    pub fn single_char(&self) -> &VocabMask {
        &self.single_char
    }

    pub fn vocab_size(&self) -> usize {
        self.safe.len()
    }
}
