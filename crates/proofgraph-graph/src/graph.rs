use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use proofgraph_core::{
    DeclCategory, DeclId, DeclarationNode, MissingDependencyRef, ProofGraphError, Result,
};

use crate::scc::strongly_connected_components;

/// One declaration as supplied by the upstream corpus index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeclarationInput {
    pub id: DeclId,
    #[serde(default)]
    pub dependency_ids: Vec<DeclId>,
}

/// Whether referenced-but-undeclared ids become placeholder nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExternalNodePolicy {
    #[default]
    Materialize,
    Skip,
}

/// Immutable dependency graph over a declaration corpus.
///
/// Built once; every id appearing in any edge exists as a node (indexed or
/// external), so traversal never dereferences a missing key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyGraph {
    pub node_ids: Vec<DeclId>,
    pub nodes: BTreeMap<DeclId, DeclarationNode>,
    /// Maximal cycles or singletons; partitions `node_ids` exactly once.
    pub sccs: Vec<Vec<DeclId>>,
    /// Subset of `sccs` with more than one member or a self-loop.
    pub cyclic_sccs: Vec<Vec<DeclId>>,
    pub missing_dependency_refs: Vec<MissingDependencyRef>,
}

impl DependencyGraph {
    pub fn build(declarations: &[DeclarationInput]) -> Result<Self> {
        Self::build_with_policy(declarations, ExternalNodePolicy::Materialize)
    }

    pub fn build_with_policy(
        declarations: &[DeclarationInput],
        policy: ExternalNodePolicy,
    ) -> Result<Self> {
        if declarations.is_empty() {
            return Err(ProofGraphError::InvalidInput(
                "declaration list is empty".to_string(),
            ));
        }

        let mut declared: BTreeSet<&str> = BTreeSet::new();
        for decl in declarations {
            if decl.id.trim().is_empty() {
                return Err(ProofGraphError::InvalidInput(
                    "declaration id is blank".to_string(),
                ));
            }
            if !declared.insert(decl.id.as_str()) {
                return Err(ProofGraphError::InvalidInput(format!(
                    "duplicate declaration id: {}",
                    decl.id
                )));
            }
        }

        let mut missing_refs: Vec<MissingDependencyRef> = Vec::new();
        let mut dependencies: BTreeMap<DeclId, BTreeSet<DeclId>> = BTreeMap::new();
        let mut externals: BTreeSet<DeclId> = BTreeSet::new();

        for decl in declarations {
            let deps = dependencies.entry(decl.id.clone()).or_default();
            for dep in &decl.dependency_ids {
                if !declared.contains(dep.as_str()) {
                    missing_refs.push(MissingDependencyRef {
                        declaration_id: decl.id.clone(),
                        missing_id: dep.clone(),
                    });
                    match policy {
                        ExternalNodePolicy::Materialize => {
                            externals.insert(dep.clone());
                        }
                        ExternalNodePolicy::Skip => continue,
                    }
                }
                deps.insert(dep.clone());
            }
        }
        missing_refs.sort_by(|a, b| {
            (a.declaration_id.as_str(), a.missing_id.as_str())
                .cmp(&(b.declaration_id.as_str(), b.missing_id.as_str()))
        });
        if !missing_refs.is_empty() {
            warn!(
                count = missing_refs.len(),
                "corpus references undeclared ids; materializing placeholders"
            );
        }
        for ext in &externals {
            dependencies.entry(ext.clone()).or_default();
        }

        let mut dependents: BTreeMap<DeclId, BTreeSet<DeclId>> = BTreeMap::new();
        for id in dependencies.keys() {
            dependents.entry(id.clone()).or_default();
        }
        for (id, deps) in &dependencies {
            for dep in deps {
                dependents.entry(dep.clone()).or_default().insert(id.clone());
            }
        }

        let adjacency: BTreeMap<String, Vec<String>> = dependencies
            .iter()
            .map(|(id, deps)| (id.clone(), deps.iter().cloned().collect()))
            .collect();
        let sccs = strongly_connected_components(&adjacency);
        let cyclic_sccs: Vec<Vec<DeclId>> = sccs
            .iter()
            .filter(|component| {
                component.len() > 1
                    || dependencies
                        .get(&component[0])
                        .map(|deps| deps.contains(&component[0]))
                        .unwrap_or(false)
            })
            .cloned()
            .collect();
        if !cyclic_sccs.is_empty() {
            debug!(count = cyclic_sccs.len(), "dependency cycles detected");
        }

        let nodes: BTreeMap<DeclId, DeclarationNode> = dependencies
            .keys()
            .map(|id| {
                let category = if declared.contains(id.as_str()) {
                    DeclCategory::Indexed
                } else {
                    DeclCategory::External
                };
                (
                    id.clone(),
                    DeclarationNode {
                        id: id.clone(),
                        category,
                        dependency_ids: dependencies[id].iter().cloned().collect(),
                        dependent_ids: dependents[id].iter().cloned().collect(),
                    },
                )
            })
            .collect();
        let node_ids: Vec<DeclId> = nodes.keys().cloned().collect();

        Ok(Self {
            node_ids,
            nodes,
            sccs,
            cyclic_sccs,
            missing_dependency_refs: missing_refs,
        })
    }

    fn node(&self, id: &str) -> Result<&DeclarationNode> {
        self.nodes
            .get(id)
            .ok_or_else(|| ProofGraphError::NotFound(format!("unknown declaration: {}", id)))
    }

    pub fn direct_dependencies(&self, id: &str) -> Result<&[DeclId]> {
        Ok(&self.node(id)?.dependency_ids)
    }

    pub fn direct_dependents(&self, id: &str) -> Result<&[DeclId]> {
        Ok(&self.node(id)?.dependent_ids)
    }

    /// All ids transitively required by `id`, collected in post-order.
    ///
    /// Every node is marked the moment it is first scheduled and never
    /// re-entered, so self-referential lemma clusters are safe to traverse.
    pub fn supporting_declarations(&self, id: &str, include_external: bool) -> Result<Vec<DeclId>> {
        self.node(id)?;

        let mut seen: BTreeSet<&str> = BTreeSet::new();
        let mut order: Vec<DeclId> = Vec::new();
        // (node, dependency cursor)
        let mut stack: Vec<(&str, usize)> = vec![(id, 0)];
        seen.insert(id);

        while let Some((current, cursor)) = stack.pop() {
            let deps = &self.nodes[current].dependency_ids;
            if cursor < deps.len() {
                stack.push((current, cursor + 1));
                let dep = deps[cursor].as_str();
                if seen.insert(dep) {
                    stack.push((dep, 0));
                }
                continue;
            }
            if current != id {
                let is_external = self.nodes[current].category == DeclCategory::External;
                if include_external || !is_external {
                    order.push(current.to_string());
                }
            }
        }

        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decl(id: &str, deps: &[&str]) -> DeclarationInput {
        DeclarationInput {
            id: id.to_string(),
            dependency_ids: deps.iter().map(|d| d.to_string()).collect(),
        }
    }

    #[test]
    fn rejects_empty_corpus() {
        let err = DependencyGraph::build(&[]).unwrap_err();
        assert!(matches!(err, ProofGraphError::InvalidInput(_)));
    }

    #[test]
    fn rejects_duplicate_and_blank_ids() {
        let err = DependencyGraph::build(&[decl("a", &[]), decl("a", &[])]).unwrap_err();
        assert!(matches!(err, ProofGraphError::InvalidInput(_)));

        let err = DependencyGraph::build(&[decl("  ", &[])]).unwrap_err();
        assert!(matches!(err, ProofGraphError::InvalidInput(_)));
    }

    #[test]
    fn materializes_external_placeholders() {
        let graph = DependencyGraph::build(&[decl("thm", &["mathlib.add_comm"])]).unwrap();
        assert_eq!(graph.node_ids.len(), 2);
        let ext = &graph.nodes["mathlib.add_comm"];
        assert_eq!(ext.category, DeclCategory::External);
        assert_eq!(ext.dependent_ids, vec!["thm".to_string()]);
        assert_eq!(
            graph.missing_dependency_refs,
            vec![MissingDependencyRef {
                declaration_id: "thm".to_string(),
                missing_id: "mathlib.add_comm".to_string(),
            }]
        );
    }

    #[test]
    fn skip_policy_drops_dangling_edges() {
        let graph = DependencyGraph::build_with_policy(
            &[decl("thm", &["missing"])],
            ExternalNodePolicy::Skip,
        )
        .unwrap();
        assert_eq!(graph.node_ids, vec!["thm".to_string()]);
        assert!(graph.nodes["thm"].dependency_ids.is_empty());
        assert_eq!(graph.missing_dependency_refs.len(), 1);
    }

    #[test]
    fn detects_cyclic_sccs_and_self_loops() {
        let graph = DependencyGraph::build(&[
            decl("a", &["b"]),
            decl("b", &["a"]),
            decl("c", &["c"]),
            decl("d", &["a"]),
        ])
        .unwrap();
        assert_eq!(graph.sccs.len(), 3);
        assert_eq!(graph.cyclic_sccs.len(), 2);
        assert!(graph
            .cyclic_sccs
            .contains(&vec!["a".to_string(), "b".to_string()]));
        assert!(graph.cyclic_sccs.contains(&vec!["c".to_string()]));
    }

    #[test]
    fn sccs_partition_node_ids() {
        let graph = DependencyGraph::build(&[
            decl("a", &["b", "ext"]),
            decl("b", &["a"]),
            decl("c", &[]),
        ])
        .unwrap();
        let mut from_sccs: Vec<DeclId> = graph.sccs.iter().flatten().cloned().collect();
        from_sccs.sort();
        assert_eq!(from_sccs, graph.node_ids);
    }

    #[test]
    fn direct_queries_and_not_found() {
        let graph = DependencyGraph::build(&[decl("a", &["b"]), decl("b", &[])]).unwrap();
        assert_eq!(graph.direct_dependencies("a").unwrap(), &["b".to_string()]);
        assert_eq!(graph.direct_dependents("b").unwrap(), &["a".to_string()]);
        assert!(matches!(
            graph.direct_dependencies("nope"),
            Err(ProofGraphError::NotFound(_))
        ));
        assert!(matches!(
            graph.supporting_declarations("nope", true),
            Err(ProofGraphError::NotFound(_))
        ));
    }

    #[test]
    fn supporting_declarations_is_postorder() {
        let graph = DependencyGraph::build(&[
            decl("top", &["mid"]),
            decl("mid", &["base"]),
            decl("base", &[]),
        ])
        .unwrap();
        let support = graph.supporting_declarations("top", true).unwrap();
        assert_eq!(support, vec!["base".to_string(), "mid".to_string()]);
    }

    #[test]
    fn supporting_declarations_tolerates_cycles() {
        let graph = DependencyGraph::build(&[
            decl("a", &["b"]),
            decl("b", &["a", "c"]),
            decl("c", &[]),
        ])
        .unwrap();
        let support = graph.supporting_declarations("a", true).unwrap();
        let mut sorted = support.clone();
        sorted.sort();
        assert_eq!(sorted, vec!["b".to_string(), "c".to_string()]);
    }

    #[test]
    fn supporting_declarations_can_exclude_externals() {
        let graph =
            DependencyGraph::build(&[decl("a", &["b", "ext"]), decl("b", &["ext"])]).unwrap();
        let with_ext = graph.supporting_declarations("a", true).unwrap();
        assert!(with_ext.contains(&"ext".to_string()));
        let without = graph.supporting_declarations("a", false).unwrap();
        assert_eq!(without, vec!["b".to_string()]);
    }

    #[test]
    fn build_is_deterministic_under_input_permutation() {
        let forward = [decl("a", &["b"]), decl("b", &["c"]), decl("c", &["a"])];
        let reversed = [decl("c", &["a"]), decl("b", &["c"]), decl("a", &["b"])];
        let g1 = DependencyGraph::build(&forward).unwrap();
        let g2 = DependencyGraph::build(&reversed).unwrap();
        assert_eq!(g1.node_ids, g2.node_ids);
        assert_eq!(g1.sccs, g2.sccs);
        assert_eq!(g1.cyclic_sccs, g2.cyclic_sccs);
    }
}
