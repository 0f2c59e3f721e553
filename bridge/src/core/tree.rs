//! Raw oracle result trees and their decoded, probability-annotated form.

use std::fmt;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::backend::{TokenId, Tokenizer};

/// Reference to the action a tree node was produced by.
///
/// Oracles may identify actions by position in the wire graph or by uid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ActionRef {
    Index(usize),
    Uid(String),
}

impl fmt::Display for ActionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionRef::Index(idx) => write!(f, "#{idx}"),
            ActionRef::Uid(uid) => f.write_str(uid),
        }
    }
}

/// Node of the tree returned by the oracle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawTree {
    pub action: ActionRef,
    #[serde(default)]
    pub tokens: Vec<TokenId>,
    /// Log-probability of each emitted token.
    #[serde(default)]
    pub logprobs: Vec<f64>,
    /// Aggregate log-probability of the path from the root.
    pub logprob: f64,
    pub length: u32,
    #[serde(default)]
    pub pruned: bool,
    #[serde(default)]
    pub children: Vec<RawTree>,
}

/// Deepest result tree [`RawTree::from_json`] accepts, counted in nodes.
///
/// Parsing recurses once per JSON nesting level; trees built in memory and
/// passed to [`reduce`] have no depth limit.
pub const MAX_RAW_TREE_DEPTH: usize = 128;

impl RawTree {
    /// Parse an oracle result tree at most [`MAX_RAW_TREE_DEPTH`] nodes deep.
    pub fn from_json(raw: &str) -> Result<Self> {
        // Each node adds an object and a `children` array.
        let nesting = json_nesting(raw);
        if nesting > 2 * MAX_RAW_TREE_DEPTH {
            return Err(anyhow!(
                "raw result tree nests {nesting} levels, more than {MAX_RAW_TREE_DEPTH} nodes deep"
            ));
        }
        let mut de = serde_json::Deserializer::from_str(raw);
        de.disable_recursion_limit();
        let tree = RawTree::deserialize(&mut de).context("parse raw result tree")?;
        de.end().context("parse raw result tree")?;
        Ok(tree)
    }
}

impl Drop for RawTree {
    fn drop(&mut self) {
        let mut pending = std::mem::take(&mut self.children);
        while let Some(mut node) = pending.pop() {
            pending.append(&mut node.children);
        }
    }
}

/// Maximum bracket nesting of a JSON document, ignoring string contents.
fn json_nesting(raw: &str) -> usize {
    let mut depth = 0usize;
    let mut deepest = 0;
    let mut in_string = false;
    let mut escaped = false;
    for byte in raw.bytes() {
        if in_string {
            match byte {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match byte {
            b'"' => in_string = true,
            b'{' | b'[' => {
                depth += 1;
                deepest = deepest.max(depth);
            }
            b'}' | b']' => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    deepest
}

/// Decoded result tree node.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SemanticTree {
    pub action: ActionRef,
    pub text: String,
    pub tokens: Vec<TokenId>,
    pub length: u32,
    pub logprobs: Vec<f64>,
    pub logprob: f64,
    /// Length-normalized path probability, comparable across depths.
    pub probability: f64,
    /// Confidence of this node's own tokens, independent of ancestors.
    pub local_probability: f64,
    /// Path probability without length normalization.
    pub raw_probability: f64,
    pub pruned: bool,
    pub children: Vec<SemanticTree>,
}

impl SemanticTree {
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    pub fn leaf_count(&self) -> usize {
        let mut count = 0;
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            if node.is_leaf() {
                count += 1;
            }
            stack.extend(&node.children);
        }
        count
    }

    /// Number of nodes on the longest root-to-leaf path.
    pub fn depth(&self) -> usize {
        let mut deepest = 0;
        let mut stack = vec![(self, 1)];
        while let Some((node, depth)) = stack.pop() {
            deepest = deepest.max(depth);
            stack.extend(node.children.iter().map(|child| (child, depth + 1)));
        }
        deepest
    }
}

impl Drop for SemanticTree {
    fn drop(&mut self) {
        let mut pending = std::mem::take(&mut self.children);
        while let Some(mut node) = pending.pop() {
            pending.append(&mut node.children);
        }
    }
}

/// `exp(-logprob / length)`; an empty span has probability 1.
pub fn path_probability(logprob: f64, length: u32) -> f64 {
    if length == 0 {
        return 1.0;
    }
    (-logprob / f64::from(length)).exp()
}

/// `exp(-mean(logprobs))`; an empty span has probability 1.
pub fn local_probability(logprobs: &[f64]) -> f64 {
    if logprobs.is_empty() {
        return 1.0;
    }
    let mean = logprobs.iter().sum::<f64>() / logprobs.len() as f64;
    (-mean).exp()
}

/// `exp(-logprob)`.
pub fn raw_probability(logprob: f64) -> f64 {
    (-logprob).exp()
}

struct Frame<'a> {
    raw: &'a RawTree,
    node: SemanticTree,
    next_child: usize,
}

impl<'a> Frame<'a> {
    fn open<T: Tokenizer + ?Sized>(raw: &'a RawTree, tokenizer: &T) -> Result<Self> {
        let text = if raw.tokens.is_empty() {
            String::new()
        } else {
            tokenizer
                .detokenize(&raw.tokens)
                .with_context(|| format!("detokenize result of action {}", raw.action))?
        };
        let node = SemanticTree {
            action: raw.action.clone(),
            text,
            tokens: raw.tokens.clone(),
            length: raw.length,
            logprobs: raw.logprobs.clone(),
            logprob: raw.logprob,
            probability: path_probability(raw.logprob, raw.length),
            local_probability: local_probability(&raw.logprobs),
            raw_probability: raw_probability(raw.logprob),
            pruned: raw.pruned,
            children: Vec::with_capacity(raw.children.len()),
        };
        Ok(Self {
            raw,
            node,
            next_child: 0,
        })
    }
}

/// Decode every node of `raw` and attach its probability metrics.
///
/// Uses an explicit stack, so tree depth is not limited by the call stack.
/// Children keep their order.
pub fn reduce<T: Tokenizer + ?Sized>(raw: &RawTree, tokenizer: &T) -> Result<SemanticTree> {
    let mut stack = vec![Frame::open(raw, tokenizer)?];
    while let Some(mut frame) = stack.pop() {
        let current = frame.raw;
        if let Some(child) = current.children.get(frame.next_child) {
            frame.next_child += 1;
            stack.push(frame);
            stack.push(Frame::open(child, tokenizer)?);
            continue;
        }
        match stack.last_mut() {
            Some(parent) => parent.node.children.push(frame.node),
            None => return Ok(frame.node),
        }
    }
    Err(anyhow!("result tree reduction finished without a root"))
}
