//! Global tree invariants, checked after every build and exposed for
//! downstream consumers that persist or replay trees.

use std::collections::BTreeSet;

use proofgraph_core::{DeclId, ExplanationTree, NodeKind, TreeIssue, TreeIssueKind};

/// Checks that every expected leaf appears exactly once, that following
/// `child_ids` from the root reaches every node exactly once, and that no
/// parent exceeds `max_children`. Empty result means the tree is sound.
pub fn validate_explanation_tree(
    tree: &ExplanationTree,
    expected_leaf_ids: &[DeclId],
    max_children: usize,
) -> Vec<TreeIssue> {
    let mut issues = Vec::new();

    let mut reached: BTreeSet<&str> = BTreeSet::new();
    let mut stack: Vec<&str> = vec![tree.root_id.as_str()];

    while let Some(current) = stack.pop() {
        if !reached.insert(current) {
            issues.push(TreeIssue {
                kind: TreeIssueKind::DuplicateReach,
                node_id: current.to_string(),
            });
            continue;
        }
        let Some(node) = tree.nodes.get(current) else {
            issues.push(TreeIssue {
                kind: TreeIssueKind::NotConnected,
                node_id: current.to_string(),
            });
            continue;
        };
        if node.child_ids.len() > max_children {
            issues.push(TreeIssue {
                kind: TreeIssueKind::TooManyChildren,
                node_id: current.to_string(),
            });
        }
        for child in &node.child_ids {
            stack.push(child);
        }
    }

    for leaf_id in expected_leaf_ids {
        let preserved = reached.contains(leaf_id.as_str())
            && tree
                .nodes
                .get(leaf_id)
                .map(|n| n.kind == NodeKind::Leaf)
                .unwrap_or(false);
        if !preserved {
            issues.push(TreeIssue {
                kind: TreeIssueKind::LeafNotPreserved,
                node_id: leaf_id.clone(),
            });
        }
    }

    for id in tree.nodes.keys() {
        if !reached.contains(id.as_str()) {
            issues.push(TreeIssue {
                kind: TreeIssueKind::NotConnected,
                node_id: id.clone(),
            });
        }
    }

    issues
}

#[cfg(test)]
mod tests {
    use super::*;
    use proofgraph_core::ExplanationTreeNode;
    use std::collections::BTreeMap;

    fn leaf(id: &str) -> ExplanationTreeNode {
        ExplanationTreeNode {
            id: id.to_string(),
            kind: NodeKind::Leaf,
            statement: format!("statement {}", id),
            depth: 0,
            child_ids: vec![],
            evidence_refs: vec![id.to_string()],
            complexity_score: 3.0,
            abstraction_score: 1.0,
            confidence: 1.0,
            why_true_from_children: None,
            new_terms_introduced: vec![],
            policy_diagnostics: None,
        }
    }

    fn parent(id: &str, children: &[&str]) -> ExplanationTreeNode {
        ExplanationTreeNode {
            id: id.to_string(),
            kind: NodeKind::Parent,
            statement: format!("summary {}", id),
            depth: 1,
            child_ids: children.iter().map(|c| c.to_string()).collect(),
            evidence_refs: children.iter().map(|c| c.to_string()).collect(),
            complexity_score: 3.0,
            abstraction_score: 3.0,
            confidence: 0.9,
            why_true_from_children: Some("children state it".to_string()),
            new_terms_introduced: vec![],
            policy_diagnostics: None,
        }
    }

    fn tree_of(root: &str, nodes: Vec<ExplanationTreeNode>) -> ExplanationTree {
        let mut leaf_ids: Vec<String> = nodes
            .iter()
            .filter(|n| n.kind == NodeKind::Leaf)
            .map(|n| n.id.clone())
            .collect();
        leaf_ids.sort();
        ExplanationTree {
            root_id: root.to_string(),
            leaf_ids,
            nodes: nodes
                .into_iter()
                .map(|n| (n.id.clone(), n))
                .collect::<BTreeMap<_, _>>(),
            max_depth: 1,
            config_hash: "test".to_string(),
            group_plan: vec![],
            grouping_diagnostics: vec![],
            policy_diagnostics_by_parent: BTreeMap::new(),
        }
    }

    #[test]
    fn sound_tree_has_no_issues() {
        let tree = tree_of(
            "p",
            vec![leaf("l1"), leaf("l2"), parent("p", &["l1", "l2"])],
        );
        let issues = validate_explanation_tree(
            &tree,
            &["l1".to_string(), "l2".to_string()],
            4,
        );
        assert!(issues.is_empty(), "unexpected: {:?}", issues);
    }

    #[test]
    fn missing_leaf_is_flagged() {
        let tree = tree_of("p", vec![leaf("l1"), parent("p", &["l1"])]);
        let issues = validate_explanation_tree(
            &tree,
            &["l1".to_string(), "l2".to_string()],
            4,
        );
        assert!(issues
            .iter()
            .any(|i| i.kind == TreeIssueKind::LeafNotPreserved && i.node_id == "l2"));
    }

    #[test]
    fn unreachable_node_is_flagged() {
        let tree = tree_of(
            "p",
            vec![leaf("l1"), leaf("orphan"), parent("p", &["l1"])],
        );
        let issues = validate_explanation_tree(&tree, &["l1".to_string()], 4);
        assert!(issues
            .iter()
            .any(|i| i.kind == TreeIssueKind::NotConnected && i.node_id == "orphan"));
    }

    #[test]
    fn dangling_child_reference_is_flagged() {
        let tree = tree_of("p", vec![leaf("l1"), parent("p", &["l1", "ghost"])]);
        let issues = validate_explanation_tree(&tree, &["l1".to_string()], 4);
        assert!(issues
            .iter()
            .any(|i| i.kind == TreeIssueKind::NotConnected && i.node_id == "ghost"));
    }

    #[test]
    fn shared_child_is_duplicate_reach() {
        let mut nodes = vec![leaf("l1"), leaf("l2")];
        nodes.push(parent("p1", &["l1", "l2"]));
        nodes.push(parent("p2", &["l2"]));
        let mut root = parent("root", &["p1", "p2"]);
        root.depth = 2;
        nodes.push(root);
        let tree = tree_of("root", nodes);
        let issues =
            validate_explanation_tree(&tree, &["l1".to_string(), "l2".to_string()], 4);
        assert!(issues
            .iter()
            .any(|i| i.kind == TreeIssueKind::DuplicateReach && i.node_id == "l2"));
    }

    #[test]
    fn oversized_parent_is_flagged() {
        let tree = tree_of(
            "p",
            vec![leaf("a"), leaf("b"), leaf("c"), parent("p", &["a", "b", "c"])],
        );
        let issues = validate_explanation_tree(
            &tree,
            &["a".to_string(), "b".to_string(), "c".to_string()],
            2,
        );
        assert!(issues
            .iter()
            .any(|i| i.kind == TreeIssueKind::TooManyChildren && i.node_id == "p"));
    }
}
