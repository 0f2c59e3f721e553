//! Compilation of a typed action graph into the oracle wire format.

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument};

use crate::action::{Action, ActionGraph, ActionKind, ChooseAction, CompleteAction, TextAction};
use crate::backend::{TokenId, Tokenizer};
use crate::core::defaults::DefaultsTable;
use crate::core::invariants::validate_graph;
use crate::core::mask::VocabMask;
use crate::core::wire::{WireAction, WireGraph, WireKind};
use crate::error::GraphError;

/// Compile `graph` into a [`WireGraph`].
///
/// The graph and the defaults table are validated before the tokenizer is
/// touched, so bad input fails without side effects. Records keep the graph order.
/// Unset options are filled from `defaults`; `Complete` records carry
/// `safe_mask` as their vocabulary constraint.
#[instrument(skip_all, fields(actions = graph.len()))]
pub fn compile<T: Tokenizer + ?Sized>(
    graph: &ActionGraph,
    defaults: &DefaultsTable,
    safe_mask: &VocabMask,
    tokenizer: &T,
) -> Result<WireGraph> {
    validate_graph(graph)?;
    defaults.validate()?;
    let vocab_size = tokenizer.vocab_size();
    if safe_mask.len() != vocab_size {
        return Err(anyhow!(
            "safe mask covers {} tokens but the vocabulary has {}",
            safe_mask.len(),
            vocab_size
        ));
    }

    let actions = graph
        .actions()
        .iter()
        .map(|action| compile_action(action, defaults, safe_mask, tokenizer))
        .collect::<Result<Vec<_>>>()?;
    Ok(WireGraph { actions })
}

fn compile_action<T: Tokenizer + ?Sized>(
    action: &Action,
    defaults: &DefaultsTable,
    safe_mask: &VocabMask,
    tokenizer: &T,
) -> Result<WireAction> {
    debug!(uid = %action.uid, kind = action.kind.name(), "compiling action");
    let uid = action.uid.as_str();
    let kind = match &action.kind {
        ActionKind::Text(text) => compile_text(uid, text, defaults, tokenizer)?,
        ActionKind::Choose(choose) => compile_choose(uid, choose, defaults, tokenizer)?,
        ActionKind::Complete(complete) => {
            compile_complete(uid, complete, defaults, safe_mask, tokenizer)?
        }
    };
    Ok(WireAction {
        uid: action.uid.clone(),
        successors: action.resolved_successors(),
        kind,
    })
}

fn compile_text<T: Tokenizer + ?Sized>(
    uid: &str,
    text: &TextAction,
    defaults: &DefaultsTable,
    tokenizer: &T,
) -> Result<WireKind> {
    Ok(WireKind::Text {
        evaluate: text.evaluate.unwrap_or(defaults.text.evaluate),
        tokens: tokenize_literal(tokenizer, uid, &text.text)?,
    })
}

fn compile_choose<T: Tokenizer + ?Sized>(
    uid: &str,
    choose: &ChooseAction,
    defaults: &DefaultsTable,
    tokenizer: &T,
) -> Result<WireKind> {
    let choices = choose
        .choices
        .iter()
        .map(|choice| tokenize_literal(tokenizer, uid, choice))
        .collect::<Result<Vec<_>>>()?;
    Ok(WireKind::Choose {
        choices,
        threshold: choose.threshold.unwrap_or(defaults.choose.threshold),
        width: choose.width.unwrap_or(defaults.choose.width),
    })
}

fn compile_complete<T: Tokenizer + ?Sized>(
    uid: &str,
    complete: &CompleteAction,
    defaults: &DefaultsTable,
    safe_mask: &VocabMask,
    tokenizer: &T,
) -> Result<WireKind> {
    let length = complete
        .length
        .ok_or_else(|| GraphError::MissingLength(uid.to_string()))?;
    let resolved = &defaults.complete;
    Ok(WireKind::Complete {
        length,
        stop: tokenize_literal(tokenizer, uid, &complete.stop)?,
        vocab: safe_mask.clone(),
        threshold: complete.threshold.unwrap_or(resolved.threshold),
        width: complete.width.unwrap_or(resolved.width),
        beams: complete.beams.unwrap_or(resolved.beams),
        ahead: complete.ahead.unwrap_or(resolved.ahead),
        diversity: complete.diversity.unwrap_or(resolved.diversity),
        repetition: complete.repetition.unwrap_or(resolved.repetition),
    })
}

/// Tokenize a literal without BOS/EOS.
fn tokenize_literal<T: Tokenizer + ?Sized>(
    tokenizer: &T,
    uid: &str,
    literal: &str,
) -> Result<Vec<TokenId>> {
    tokenizer
        .tokenize(literal, false, false)
        .with_context(|| format!("tokenize literal {literal:?} of action '{uid}'"))
}
