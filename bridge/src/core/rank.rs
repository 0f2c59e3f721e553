//! Extraction and ranking of completion paths from a semantic tree.

use serde::{Deserialize, Serialize};

use crate::core::tree::SemanticTree;

/// One candidate completion: the text along a root-to-leaf path and the
/// leaf's path probability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedPath {
    pub text: String,
    pub probability: f64,
}

/// Collect one [`RankedPath`] per non-pruned leaf, best first.
///
/// Leaves are visited depth-first in pre-order; text is concatenated from the
/// root down. Pruned leaves contribute nothing. Equal probabilities keep their
/// pre-order position. A tree without surviving leaves yields an empty list.
pub fn extract_ranked_paths(tree: &SemanticTree) -> Vec<RankedPath> {
    let mut paths = Vec::new();
    let mut stack = vec![(tree, String::new())];
    while let Some((node, prefix)) = stack.pop() {
        let text = prefix + &node.text;
        if node.is_leaf() {
            if !node.pruned {
                paths.push(RankedPath {
                    text,
                    probability: node.probability,
                });
            }
            continue;
        }
        for child in node.children.iter().rev() {
            stack.push((child, text.clone()));
        }
    }
    // `sort_by` is stable, which keeps pre-order among ties.
    paths.sort_by(|a, b| b.probability.total_cmp(&a.probability));
    paths
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::tree::ActionRef;

    fn node(
        text: &str,
        probability: f64,
        pruned: bool,
        children: Vec<SemanticTree>,
    ) -> SemanticTree {
        SemanticTree {
            action: ActionRef::Uid(text.trim().to_string()),
            text: text.to_string(),
            tokens: Vec::new(),
            length: 0,
            logprobs: Vec::new(),
            logprob: 0.0,
            probability,
            local_probability: 1.0,
            raw_probability: 1.0,
            pruned,
            children,
        }
    }

    #[test]
    fn pruned_leaf_is_dropped() {
        let tree = node(
            "A:",
            1.0,
            false,
            vec![node(" yes", 0.7, false, vec![]), node(" no", 0.9, true, vec![])],
        );
        assert_eq!(
            extract_ranked_paths(&tree),
            vec![RankedPath {
                text: "A: yes".to_string(),
                probability: 0.7,
            }]
        );
    }

    #[test]
    fn paths_are_sorted_best_first_with_full_text() {
        let tree = node(
            "Q",
            1.0,
            false,
            vec![
                node(
                    "1",
                    0.5,
                    false,
                    vec![node("a", 0.2, false, vec![]), node("b", 0.6, false, vec![])],
                ),
                node("2", 0.9, false, vec![]),
            ],
        );
        let paths = extract_ranked_paths(&tree);
        let texts: Vec<&str> = paths.iter().map(|p| p.text.as_str()).collect();
        assert_eq!(texts, vec!["Q2", "Q1b", "Q1a"]);
        assert!(paths.windows(2).all(|w| w[0].probability >= w[1].probability));
    }

    #[test]
    fn ties_keep_pre_order() {
        let tree = node(
            "",
            1.0,
            false,
            vec![
                node("first", 0.5, false, vec![]),
                node("second", 0.5, false, vec![]),
                node("third", 0.5, false, vec![]),
            ],
        );
        let texts: Vec<String> = extract_ranked_paths(&tree)
            .into_iter()
            .map(|p| p.text)
            .collect();
        assert_eq!(texts, vec!["first", "second", "third"]);
    }

    #[test]
    fn internal_nodes_never_become_paths() {
        let tree = node("root", 1.0, false, vec![node("leaf", 0.1, false, vec![])]);
        let paths = extract_ranked_paths(&tree);
        assert_eq!(paths.len(), 1);
        assert_eq!(paths[0].text, "rootleaf");
    }

    #[test]
    fn single_node_tree_is_one_path() {
        let tree = node("only", 0.4, false, vec![]);
        assert_eq!(extract_ranked_paths(&tree).len(), 1);
    }

    #[test]
    fn all_pruned_yields_empty_list() {
        let tree = node(
            "root",
            1.0,
            false,
            vec![node("x", 0.3, true, vec![]), node("y", 0.2, true, vec![])],
        );
        assert!(extract_ranked_paths(&tree).is_empty());
    }
}
