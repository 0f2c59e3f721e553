//! Typed action graph consumed by the compiler.
//!
//! An [`ActionGraph`] is an ordered list of [`Action`]s keyed by uid. The first
//! action in insertion order is the entry point of the generation.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::invariants::validate_graph;
use crate::error::GraphError;

/// Type tags recognised in the `__type__` field.
pub const KIND_TAGS: [&str; 3] = ["Text", "Choose", "Complete"];

/// One node of the generation graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub uid: String,
    #[serde(default)]
    pub successors: Vec<String>,
    #[serde(flatten)]
    pub kind: ActionKind,
}

/// Closed set of action kinds, tagged as `__type__` in JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "__type__")]
pub enum ActionKind {
    Text(TextAction),
    Choose(ChooseAction),
    Complete(CompleteAction),
}

/// Emit a fixed literal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextAction {
    pub text: String,
    /// Score the literal against the model. Falls back to the defaults table.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluate: Option<bool>,
}

/// Branch over a fixed list of literals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChooseAction {
    pub choices: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
}

/// Open-ended completion bounded by `length` tokens.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompleteAction {
    /// Required at compile time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<u32>,
    #[serde(default)]
    pub stop: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub beams: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ahead: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diversity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repetition: Option<f64>,
}

impl ActionKind {
    /// The `__type__` tag of this kind.
    pub fn name(&self) -> &'static str {
        match self {
            ActionKind::Text(_) => "Text",
            ActionKind::Choose(_) => "Choose",
            ActionKind::Complete(_) => "Complete",
        }
    }
}

impl Action {
    /// A `Text` action with no successors.
    pub fn text(uid: &str, text: &str) -> Self {
        Self::new(
            uid,
            ActionKind::Text(TextAction {
                text: text.to_string(),
                evaluate: None,
            }),
        )
    }

    /// A `Choose` action with default threshold and width.
    pub fn choose<S: AsRef<str>>(uid: &str, choices: &[S]) -> Self {
        Self::new(
            uid,
            ActionKind::Choose(ChooseAction {
                choices: choices.iter().map(|c| c.as_ref().to_string()).collect(),
                threshold: None,
                width: None,
            }),
        )
    }

    /// A `Complete` action with the given length and no stop literal.
    pub fn complete(uid: &str, length: u32) -> Self {
        Self::new(
            uid,
            ActionKind::Complete(CompleteAction {
                length: Some(length),
                ..CompleteAction::default()
            }),
        )
    }

    pub fn new(uid: &str, kind: ActionKind) -> Self {
        Self {
            uid: uid.to_string(),
            successors: Vec::new(),
            kind,
        }
    }

    pub fn with_successors<S: AsRef<str>>(mut self, successors: &[S]) -> Self {
        self.successors = successors.iter().map(|s| s.as_ref().to_string()).collect();
        self
    }

    /// Successors with a single `Choose` continuation broadcast to every choice.
    ///
    /// Other kinds, and `Choose` actions with zero or per-choice successors,
    /// are returned unchanged.
    pub fn resolved_successors(&self) -> Vec<String> {
        match &self.kind {
            ActionKind::Choose(choose) if self.successors.len() == 1 => {
                vec![self.successors[0].clone(); choose.choices.len()]
            }
            _ => self.successors.clone(),
        }
    }
}

/// Ordered action graph, indexed by uid.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "GraphDoc", into = "GraphDoc")]
pub struct ActionGraph {
    actions: Vec<Action>,
    index: HashMap<String, usize>,
}

#[derive(Serialize, Deserialize)]
struct GraphDoc {
    actions: Vec<Action>,
}

impl From<GraphDoc> for ActionGraph {
    fn from(doc: GraphDoc) -> Self {
        Self::from_actions(doc.actions)
    }
}

impl From<ActionGraph> for GraphDoc {
    fn from(graph: ActionGraph) -> Self {
        Self {
            actions: graph.actions,
        }
    }
}

impl ActionGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a graph from actions in order, without validation.
    ///
    /// When a uid repeats, lookups resolve to its first occurrence;
    /// [`validate_graph`] reports the duplicate.
    pub fn from_actions(actions: Vec<Action>) -> Self {
        let mut graph = Self::new();
        for action in actions {
            graph.push(action);
        }
        graph
    }

    /// Decode `{"actions": [...]}` and validate the result.
    pub fn from_json(raw: &str) -> Result<Self, GraphError> {
        let value: Value =
            serde_json::from_str(raw).map_err(|err| GraphError::Decode(err.to_string()))?;
        check_kind_tags(&value)?;
        let graph: ActionGraph =
            serde_json::from_value(value).map_err(|err| GraphError::Decode(err.to_string()))?;
        validate_graph(&graph)?;
        Ok(graph)
    }

    pub fn push(&mut self, action: Action) {
        self.index
            .entry(action.uid.clone())
            .or_insert(self.actions.len());
        self.actions.push(action);
    }

    pub fn get(&self, uid: &str) -> Option<&Action> {
        self.index.get(uid).map(|&idx| &self.actions[idx])
    }

    pub fn contains(&self, uid: &str) -> bool {
        self.index.contains_key(uid)
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    /// The action generation starts from.
    pub fn entry(&self) -> Option<&Action> {
        self.actions.first()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Broadcast every single-successor `Choose` to one successor per choice.
    ///
    /// Idempotent. After this pass no consumer needs to special-case the
    /// single-successor form.
    pub fn normalize(&mut self) {
        for action in &mut self.actions {
            action.successors = action.resolved_successors();
        }
    }
}

/// Reject `__type__` tags outside the closed kind set before typed decoding,
/// so the failure names the offending action.
fn check_kind_tags(value: &Value) -> Result<(), GraphError> {
    let Some(actions) = value.get("actions").and_then(Value::as_array) else {
        return Ok(());
    };
    for action in actions {
        let Some(kind) = action.get("__type__").and_then(Value::as_str) else {
            continue;
        };
        if !KIND_TAGS.contains(&kind) {
            let uid = action
                .get("uid")
                .and_then(Value::as_str)
                .unwrap_or("<unknown>")
                .to_string();
            return Err(GraphError::UnsupportedKind {
                uid,
                kind: kind.to_string(),
            });
        }
    }
    Ok(())
}
