//! Oracle-facing serialization of a compiled action graph.
//!
//! Each record carries the action uid, its successors (already broadcast for
//! `Choose`), a `__type__` tag, tokenized literals and fully resolved options.

use std::collections::HashSet;

use jsonschema::validator_for;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::backend::TokenId;
use crate::core::mask::VocabMask;
use crate::core::tree::ActionRef;
use crate::error::WireError;

const WIRE_GRAPH_SCHEMA: &str = include_str!("../../schemas/wire_graph.schema.json");

/// Compiled graph, in the same order as the source action graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireGraph {
    pub actions: Vec<WireAction>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireAction {
    pub uid: String,
    pub successors: Vec<String>,
    #[serde(flatten)]
    pub kind: WireKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "__type__")]
pub enum WireKind {
    Text {
        evaluate: bool,
        tokens: Vec<TokenId>,
    },
    Choose {
        choices: Vec<Vec<TokenId>>,
        threshold: f64,
        width: u32,
    },
    Complete {
        length: u32,
        stop: Vec<TokenId>,
        /// Token-level constraint on what the completion may emit.
        vocab: VocabMask,
        threshold: f64,
        width: u32,
        beams: u32,
        ahead: u32,
        diversity: f64,
        repetition: f64,
    },
}

impl WireKind {
    pub fn name(&self) -> &'static str {
        match self {
            WireKind::Text { .. } => "Text",
            WireKind::Choose { .. } => "Choose",
            WireKind::Complete { .. } => "Complete",
        }
    }

    /// Every token sequence carried by this record.
    fn token_sequences(&self) -> Vec<&[TokenId]> {
        match self {
            WireKind::Text { tokens, .. } => vec![tokens.as_slice()],
            WireKind::Choose { choices, .. } => choices.iter().map(Vec::as_slice).collect(),
            WireKind::Complete { stop, .. } => vec![stop.as_slice()],
        }
    }
}

impl WireGraph {
    /// Entry action of the compiled graph.
    pub fn entry(&self) -> Option<&WireAction> {
        self.actions.first()
    }

    pub fn get(&self, uid: &str) -> Option<&WireAction> {
        self.actions.iter().find(|action| action.uid == uid)
    }

    /// Map an oracle action reference, by index or uid, to a uid of this graph.
    pub fn resolve(&self, action: &ActionRef) -> Option<&str> {
        match action {
            ActionRef::Index(idx) => self.actions.get(*idx).map(|a| a.uid.as_str()),
            ActionRef::Uid(uid) => self.get(uid).map(|a| a.uid.as_str()),
        }
    }

    /// Pretty JSON with a trailing newline; identical graphs give identical bytes.
    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        let mut buf = serde_json::to_string_pretty(self)?;
        buf.push('\n');
        Ok(buf)
    }

    /// Reload a serialized wire graph for a model with `vocab_size` tokens.
    ///
    /// The document is checked against the embedded JSON Schema before typed
    /// decoding, then against [`WireGraph::validate`].
    pub fn from_json(raw: &str, vocab_size: usize) -> Result<Self, WireError> {
        let value: Value =
            serde_json::from_str(raw).map_err(|err| WireError::Decode(err.to_string()))?;
        validate_schema(&value)?;
        let graph: WireGraph =
            serde_json::from_value(value).map_err(|err| WireError::Decode(err.to_string()))?;
        graph.validate(vocab_size)?;
        Ok(graph)
    }

    /// Check the oracle preconditions: unique uids, known successors, one
    /// successor per choice (or none), token ids in `[0, vocab_size)` and
    /// `Complete` masks covering the whole vocabulary.
    pub fn validate(&self, vocab_size: usize) -> Result<(), WireError> {
        let mut uids = HashSet::new();
        for action in &self.actions {
            if !uids.insert(action.uid.as_str()) {
                return Err(WireError::DuplicateUid(action.uid.clone()));
            }
        }

        for action in &self.actions {
            if let Some(successor) = action
                .successors
                .iter()
                .find(|successor| !uids.contains(successor.as_str()))
            {
                return Err(WireError::UnknownSuccessor {
                    uid: action.uid.clone(),
                    successor: successor.clone(),
                });
            }

            match &action.kind {
                WireKind::Choose { choices, .. }
                    if !action.successors.is_empty()
                        && action.successors.len() != choices.len() =>
                {
                    return Err(WireError::ChooseArity {
                        uid: action.uid.clone(),
                        choices: choices.len(),
                        successors: action.successors.len(),
                    });
                }
                WireKind::Complete { vocab, .. } if vocab.len() != vocab_size => {
                    return Err(WireError::MaskLength {
                        uid: action.uid.clone(),
                        expected: vocab_size,
                        actual: vocab.len(),
                    });
                }
                _ => {}
            }

            for tokens in action.kind.token_sequences() {
                if let Some(&token) = tokens
                    .iter()
                    .find(|&&token| usize::try_from(token).unwrap_or(usize::MAX) >= vocab_size)
                {
                    return Err(WireError::TokenOutOfRange {
                        uid: action.uid.clone(),
                        token,
                        vocab_size,
                    });
                }
            }
        }
        Ok(())
    }
}

fn validate_schema(value: &Value) -> Result<(), WireError> {
    let schema: Value = serde_json::from_str(WIRE_GRAPH_SCHEMA)
        .map_err(|err| WireError::Schema(format!("embedded schema: {err}")))?;
    let compiled = validator_for(&schema)
        .map_err(|err| WireError::Schema(format!("invalid schema: {err}")))?;
    if !compiled.is_valid(value) {
        let messages = compiled
            .iter_errors(value)
            .map(|err| err.to_string())
            .collect::<Vec<_>>();
        return Err(WireError::Schema(messages.join("; ")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> WireGraph {
        WireGraph {
            actions: vec![
                WireAction {
                    uid: "intro".to_string(),
                    successors: vec!["pick".to_string()],
                    kind: WireKind::Text {
                        evaluate: true,
                        tokens: vec![1, 2],
                    },
                },
                WireAction {
                    uid: "pick".to_string(),
                    successors: vec!["tail".to_string(), "tail".to_string()],
                    kind: WireKind::Choose {
                        choices: vec![vec![3], vec![4, 5]],
                        threshold: 0.4,
                        width: 2,
                    },
                },
                WireAction {
                    uid: "tail".to_string(),
                    successors: Vec::new(),
                    kind: WireKind::Complete {
                        length: 6,
                        stop: vec![0],
                        vocab: VocabMask::from_bits(vec![true, true, false, true, true, true]),
                        threshold: 0.3,
                        width: 2,
                        beams: 3,
                        ahead: 1,
                        diversity: 1.0,
                        repetition: 0.5,
                    },
                },
            ],
        }
    }

    #[test]
    fn json_carries_type_tag_and_fields() {
        let value = serde_json::to_value(sample()).expect("serialize");
        let pick = &value["actions"][1];
        assert_eq!(pick["__type__"], "Choose");
        assert_eq!(pick["successors"], serde_json::json!(["tail", "tail"]));
        assert_eq!(pick["choices"], serde_json::json!([[3], [4, 5]]));
        assert_eq!(pick["threshold"], 0.4);
        let tail = &value["actions"][2];
        assert_eq!(tail["__type__"], "Complete");
        assert_eq!(
            tail["vocab"],
            serde_json::json!([true, true, false, true, true, true])
        );
        assert_eq!(tail["repetition"], 0.5);
    }

    #[test]
    fn serialization_is_byte_stable() {
        let first = sample().to_json_pretty().expect("serialize");
        let second = sample().to_json_pretty().expect("serialize");
        assert_eq!(first, second);
        assert!(first.ends_with("}\n"));
    }

    #[test]
    fn from_json_reloads_serialized_graph() {
        let json = sample().to_json_pretty().expect("serialize");
        let back = WireGraph::from_json(&json, 6).expect("reload");
        assert_eq!(back, sample());
    }

    #[test]
    fn from_json_rejects_schema_violations() {
        let raw = r#"{"actions": [{"uid": "a", "successors": [], "__type__": "Text", "tokens": [1]}]}"#;
        let err = WireGraph::from_json(raw, 6).expect_err("missing evaluate");
        assert!(matches!(err, WireError::Schema(_)));
    }

    #[test]
    fn from_json_rejects_unknown_type_tag() {
        let raw = r#"{"actions": [{"uid": "a", "successors": [], "__type__": "Loop"}]}"#;
        assert!(matches!(
            WireGraph::from_json(raw, 6),
            Err(WireError::Schema(_))
        ));
    }

    #[test]
    fn validate_rejects_out_of_range_tokens() {
        assert_eq!(
            sample().validate(5),
            Err(WireError::TokenOutOfRange {
                uid: "pick".to_string(),
                token: 5,
                vocab_size: 5,
            })
        );

        let mut graph = sample();
        graph.actions[0].kind = WireKind::Text {
            evaluate: true,
            tokens: vec![9],
        };
        assert_eq!(
            graph.validate(6),
            Err(WireError::TokenOutOfRange {
                uid: "intro".to_string(),
                token: 9,
                vocab_size: 6,
            })
        );
    }

    #[test]
    fn validate_rejects_unknown_successor() {
        let mut graph = sample();
        graph.actions[2].successors = vec!["ghost".to_string()];
        assert_eq!(
            graph.validate(6),
            Err(WireError::UnknownSuccessor {
                uid: "tail".to_string(),
                successor: "ghost".to_string(),
            })
        );
    }

    #[test]
    fn validate_rejects_duplicate_uid() {
        let mut graph = sample();
        let copy = graph.actions[0].clone();
        graph.actions.push(copy);
        assert_eq!(
            graph.validate(6),
            Err(WireError::DuplicateUid("intro".to_string()))
        );
    }

    #[test]
    fn validate_rejects_choose_successor_count_mismatch() {
        let mut graph = sample();
        graph.actions[1].successors = vec!["tail".to_string()];
        assert_eq!(
            graph.validate(6),
            Err(WireError::ChooseArity {
                uid: "pick".to_string(),
                choices: 2,
                successors: 1,
            })
        );

        graph.actions[1].successors.clear();
        assert_eq!(graph.validate(6), Ok(()));
    }

    #[test]
    fn validate_rejects_mask_of_wrong_length() {
        assert_eq!(
            sample().validate(7),
            Err(WireError::MaskLength {
                uid: "tail".to_string(),
                expected: 7,
                actual: 6,
            })
        );
    }

    #[test]
    fn resolve_accepts_index_and_uid() {
        let graph = sample();
        assert_eq!(graph.resolve(&ActionRef::Index(1)), Some("pick"));
        assert_eq!(graph.resolve(&ActionRef::Uid("tail".to_string())), Some("tail"));
        assert_eq!(graph.resolve(&ActionRef::Index(7)), None);
    }
}
