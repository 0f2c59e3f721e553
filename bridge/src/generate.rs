//! Orchestration of one generation: compile, evaluate, reduce, rank.

use anyhow::{Result, anyhow};
use tracing::{info, instrument, warn};

use crate::action::ActionGraph;
use crate::backend::{Oracle, Tokenizer};
use crate::core::compile::compile;
use crate::core::defaults::DefaultsTable;
use crate::core::mask::VocabMasks;
use crate::core::rank::{RankedPath, extract_ranked_paths};
use crate::core::tree::{SemanticTree, reduce};
use crate::core::wire::WireGraph;

/// Everything produced by one [`Generator::run`].
#[derive(Debug, Clone)]
pub struct Generation {
    pub wire: WireGraph,
    pub tree: SemanticTree,
    /// Surviving completions, best first.
    pub paths: Vec<RankedPath>,
}

impl Generation {
    pub fn best(&self) -> Option<&RankedPath> {
        self.paths.first()
    }
}

/// Compiles graphs against one backend with a fixed defaults table.
///
/// Vocabulary masks are built once in [`Generator::new`] and reused by every
/// compilation.
pub struct Generator<B> {
    backend: B,
    defaults: DefaultsTable,
    masks: VocabMasks,
}

impl<B: Tokenizer + Oracle> Generator<B> {
    pub fn new(backend: B, defaults: DefaultsTable) -> Result<Self> {
        defaults.validate()?;
        let masks = VocabMasks::build(&backend);
        Ok(Self {
            backend,
            defaults,
            masks,
        })
    }

    /// Use masks built earlier for the same vocabulary.
    pub fn with_masks(backend: B, defaults: DefaultsTable, masks: VocabMasks) -> Result<Self> {
        defaults.validate()?;
        if masks.vocab_size() != backend.vocab_size() {
            return Err(anyhow!(
                "masks cover {} tokens but the backend vocabulary has {}",
                masks.vocab_size(),
                backend.vocab_size()
            ));
        }
        Ok(Self {
            backend,
            defaults,
            masks,
        })
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn defaults(&self) -> &DefaultsTable {
        &self.defaults
    }

    pub fn masks(&self) -> &VocabMasks {
        &self.masks
    }

    pub fn compile(&self, graph: &ActionGraph) -> Result<WireGraph> {
        compile(graph, &self.defaults, self.masks.safe(), &self.backend)
    }

    /// Run `graph` end to end.
    ///
    /// Oracle failures are returned unchanged and never retried.
    #[instrument(skip_all, fields(actions = graph.len()))]
    pub fn run(&self, graph: &ActionGraph) -> Result<Generation> {
        let wire = self.compile(graph)?;
        wire.validate(self.backend.vocab_size())?;

        let raw = match self.backend.evaluate(&wire) {
            Ok(raw) => raw,
            Err(err) => {
                warn!(error = %err, "oracle evaluation failed");
                return Err(err);
            }
        };

        let tree = reduce(&raw, &self.backend)?;
        let paths = extract_ranked_paths(&tree);
        info!(
            leaves = tree.leaf_count(),
            paths = paths.len(),
            "generation finished"
        );
        Ok(Generation { wire, tree, paths })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::Action;
    use crate::core::tree::ActionRef;
    use crate::test_support::{
        CharTokenizer, EchoOracle, ScriptedOracle, TestBackend, char_id, raw_leaf, raw_node,
    };

    fn ids(text: &str) -> Vec<u32> {
        text.chars().map(char_id).collect()
    }

    #[test]
    fn run_with_echo_oracle_returns_literal_path() {
        let generator =
            Generator::new(TestBackend::new(EchoOracle), DefaultsTable::default()).expect("new");
        let graph = ActionGraph::from_actions(vec![
            Action::text("greet", "Hello,").with_successors(&["who"]),
            Action::choose("who", &[" world", " there"]).with_successors(&["end"]),
            Action::text("end", "!"),
        ]);
        let generation = generator.run(&graph).expect("run");
        assert_eq!(generation.paths.len(), 1);
        assert_eq!(generation.paths[0].text, "Hello, world!");
        assert_eq!(generation.paths[0].probability, 1.0);
        assert_eq!(generation.wire.actions[1].successors, vec!["end", "end"]);
    }

    #[test]
    fn oracle_error_is_returned_unchanged() {
        let generator = Generator::new(
            TestBackend::new(ScriptedOracle::failing("search exploded")),
            DefaultsTable::default(),
        )
        .expect("new");
        let graph = ActionGraph::from_actions(vec![Action::text("a", "x")]);
        let err = generator.run(&graph).expect_err("oracle failure");
        assert_eq!(format!("{err:#}"), "search exploded");
        assert_eq!(generator.backend().oracle.calls(), 1);
    }

    #[test]
    fn invalid_graph_never_reaches_oracle() {
        let generator = Generator::new(
            TestBackend::new(ScriptedOracle::failing("unreachable")),
            DefaultsTable::default(),
        )
        .expect("new");
        let graph = ActionGraph::from_actions(vec![Action::text("a", "x").with_successors(&["a"])]);
        assert!(generator.run(&graph).is_err());
        assert_eq!(generator.backend().oracle.calls(), 0);
    }

    #[test]
    fn ranked_paths_follow_the_oracle_tree() {
        let tree = raw_node(
            ActionRef::Index(0),
            ids("A:"),
            vec![
                raw_leaf(ActionRef::Index(1), ids(" yes"), vec![-0.1; 4], 0.4, false),
                raw_leaf(ActionRef::Index(1), ids(" no"), vec![-0.3; 3], 0.9, false),
                raw_leaf(ActionRef::Index(1), ids(" maybe"), vec![-0.2; 6], 1.2, true),
            ],
        );
        let backend = TestBackend::new(ScriptedOracle::returning(tree));
        let generator = Generator::new(backend, DefaultsTable::default()).expect("new");
        let graph = ActionGraph::from_actions(vec![
            Action::text("q", "A:").with_successors(&["ans"]),
            Action::choose("ans", &[" yes", " no", " maybe"]),
        ]);
        let generation = generator.run(&graph).expect("run");
        let texts: Vec<&str> = generation.paths.iter().map(|p| p.text.as_str()).collect();
        assert_eq!(texts, vec!["A: yes", "A: no"]);
        assert_eq!(generation.best().map(|p| p.text.as_str()), Some("A: yes"));
        let sent = generator.backend().oracle.last_graph().expect("graph sent");
        assert_eq!(sent, generation.wire);
    }

    #[test]
    fn with_masks_rejects_foreign_vocabulary() {
        let masks = VocabMasks::build(&CharTokenizer::new());
        let generator = Generator::with_masks(
            TestBackend::new(EchoOracle),
            DefaultsTable::default(),
            masks.clone(),
        )
        .expect("same vocabulary");
        assert_eq!(generator.masks(), &masks);

        struct Tiny;
        impl Tokenizer for Tiny {
            fn vocab_size(&self) -> usize {
                4
            }
            fn tokenize(&self, _: &str, _: bool, _: bool) -> Result<Vec<u32>> {
                Ok(Vec::new())
            }
            fn detokenize(&self, _: &[u32]) -> Result<String> {
                Ok(String::new())
            }
        }
        impl Oracle for Tiny {
            fn evaluate(&self, _: &WireGraph) -> Result<crate::core::tree::RawTree> {
                Err(anyhow!("unused"))
            }
        }
        assert!(Generator::with_masks(Tiny, DefaultsTable::default(), masks).is_err());
    }

    #[test]
    fn new_rejects_invalid_defaults() {
        let mut defaults = DefaultsTable::default();
        defaults.complete.width = 0;
        assert!(Generator::new(TestBackend::new(EchoOracle), defaults).is_err());
    }
}
