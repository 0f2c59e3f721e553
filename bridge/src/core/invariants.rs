//! Structural and parameter invariants of an action graph.

use std::collections::HashSet;

use crate::action::{Action, ActionGraph, ActionKind};
use crate::error::GraphError;

/// Check every invariant the compiler relies on:
/// - At least one action (the entry point)
/// - No duplicate uids
/// - Successors exist and are not the action itself
/// - `Choose` successors are empty, single, or one per choice
/// - `Complete` has `length > 0`
/// - Thresholds in `[0, 1]`, widths and beams `>= 1`
///
/// Returns every violation in graph order (empty on success).
pub fn graph_violations(graph: &ActionGraph) -> Vec<GraphError> {
    let mut errors = Vec::new();
    if graph.is_empty() {
        errors.push(GraphError::Empty);
        return errors;
    }

    let mut seen = HashSet::new();
    for action in graph.actions() {
        if !seen.insert(action.uid.as_str()) {
            errors.push(GraphError::DuplicateUid(action.uid.clone()));
        }
        check_successors(graph, action, &mut errors);
        check_kind(action, &mut errors);
    }
    errors
}

/// Fail with the first violation reported by [`graph_violations`].
pub fn validate_graph(graph: &ActionGraph) -> Result<(), GraphError> {
    match graph_violations(graph).into_iter().next() {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

fn check_successors(graph: &ActionGraph, action: &Action, errors: &mut Vec<GraphError>) {
    for successor in &action.successors {
        if successor == &action.uid {
            errors.push(GraphError::SelfLoop(action.uid.clone()));
        } else if !graph.contains(successor) {
            errors.push(GraphError::UnknownSuccessor {
                uid: action.uid.clone(),
                successor: successor.clone(),
            });
        }
    }
}

fn check_kind(action: &Action, errors: &mut Vec<GraphError>) {
    let uid = action.uid.as_str();
    match &action.kind {
        ActionKind::Text(_) => {}
        ActionKind::Choose(choose) => {
            if choose.choices.is_empty() {
                errors.push(invalid(uid, "choices", "must not be empty"));
            }
            let successors = action.successors.len();
            if successors > 1 && successors != choose.choices.len() {
                errors.push(GraphError::ChooseArity {
                    uid: uid.to_string(),
                    choices: choose.choices.len(),
                    successors,
                });
            }
            check_threshold(uid, choose.threshold, errors);
            check_at_least_one(uid, "width", choose.width, errors);
        }
        ActionKind::Complete(complete) => {
            match complete.length {
                None => errors.push(GraphError::MissingLength(uid.to_string())),
                Some(0) => errors.push(invalid(uid, "length", "must be > 0")),
                Some(_) => {}
            }
            check_threshold(uid, complete.threshold, errors);
            check_at_least_one(uid, "width", complete.width, errors);
            check_at_least_one(uid, "beams", complete.beams, errors);
            check_finite(uid, "diversity", complete.diversity, errors);
            check_finite(uid, "repetition", complete.repetition, errors);
        }
    }
}

fn check_threshold(uid: &str, threshold: Option<f64>, errors: &mut Vec<GraphError>) {
    if let Some(value) = threshold.filter(|value| !(0.0..=1.0).contains(value)) {
        errors.push(invalid(uid, "threshold", &format!("{value} outside [0, 1]")));
    }
}

fn check_at_least_one(
    uid: &str,
    field: &'static str,
    value: Option<u32>,
    errors: &mut Vec<GraphError>,
) {
    if value == Some(0) {
        errors.push(invalid(uid, field, "must be >= 1"));
    }
}

fn check_finite(uid: &str, field: &'static str, value: Option<f64>, errors: &mut Vec<GraphError>) {
    if value.is_some_and(|value| !value.is_finite()) {
        errors.push(invalid(uid, field, "must be finite"));
    }
}

fn invalid(uid: &str, field: &'static str, reason: &str) -> GraphError {
    GraphError::InvalidParameter {
        uid: uid.to_string(),
        field,
        reason: reason.to_string(),
    }
}
