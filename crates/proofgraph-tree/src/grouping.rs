//! Deterministic child grouping.
//!
//! Partitions one layer of sibling nodes into ordered groups that honor
//! prerequisite order, a complexity band, and a maximum group size. The
//! candidate ordering is a total order, so the result never depends on the
//! input array order.

use std::collections::{BTreeMap, BTreeSet};
use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use proofgraph_core::hash::id_tiebreak_hash;
use proofgraph_core::text::{content_tokens, jaccard};
use proofgraph_core::{
    DeclId, GroupingDiagnostics, GroupingWarning, GroupingWarningKind, ProofGraphError, Result,
};

/// One node of the layer being grouped (a leaf or a previously-synthesized
/// parent).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupCandidate {
    pub id: DeclId,
    pub statement: String,
    /// Prerequisites; only ids present in the same layer constrain order.
    #[serde(default)]
    pub prerequisite_ids: Vec<DeclId>,
    #[serde(default)]
    pub complexity: Option<f32>,
}

#[derive(Debug, Clone, Copy)]
pub struct GroupingParams {
    pub max_children_per_parent: usize,
    pub target_complexity: f32,
    pub complexity_band_width: f32,
}

#[derive(Debug, Clone)]
pub struct GroupingOutcome {
    /// Ordered groups of ids; every input id appears exactly once.
    pub groups: Vec<Vec<DeclId>>,
    pub diagnostics: GroupingDiagnostics,
}

/// Stable topological order by in-layer prerequisites (Kahn's algorithm,
/// ready queue kept sorted). A prerequisite cycle yields a `cycle_detected`
/// warning and the unresolved ids appended in lexicographic order; grouping
/// must still produce output rather than fail the corpus.
fn topological_order(
    nodes: &BTreeMap<&str, &GroupCandidate>,
    warnings: &mut Vec<GroupingWarning>,
) -> Vec<DeclId> {
    let mut in_degree: BTreeMap<&str, usize> = BTreeMap::new();
    let mut dependents: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for (&id, candidate) in nodes {
        let entry = in_degree.entry(id).or_insert(0);
        for prereq in &candidate.prerequisite_ids {
            if nodes.contains_key(prereq.as_str()) && prereq != id {
                *entry += 1;
                dependents
                    .entry(prereq.as_str())
                    .or_default()
                    .push(id);
            }
        }
    }

    let mut ready: BTreeSet<&str> = in_degree
        .iter()
        .filter(|(_, &degree)| degree == 0)
        .map(|(&id, _)| id)
        .collect();
    let mut order: Vec<DeclId> = Vec::with_capacity(nodes.len());
    let mut placed: BTreeSet<&str> = BTreeSet::new();

    while let Some(&next) = ready.iter().next() {
        ready.remove(next);
        placed.insert(next);
        order.push(next.to_string());
        if let Some(deps) = dependents.get(next) {
            for &dependent in deps {
                if let Some(degree) = in_degree.get_mut(dependent) {
                    *degree -= 1;
                    if *degree == 0 && !placed.contains(dependent) {
                        ready.insert(dependent);
                    }
                }
            }
        }
    }

    if order.len() < nodes.len() {
        let unresolved: Vec<DeclId> = nodes
            .keys()
            .filter(|id| !placed.contains(**id))
            .map(|id| id.to_string())
            .collect();
        warn!(count = unresolved.len(), "prerequisite cycle; appending unresolved ids");
        warnings.push(GroupingWarning {
            kind: GroupingWarningKind::CycleDetected,
            ids: unresolved.clone(),
        });
        order.extend(unresolved);
    }

    order
}

pub fn group_layer(nodes: &[GroupCandidate], params: &GroupingParams) -> Result<GroupingOutcome> {
    if params.max_children_per_parent < 2 {
        return Err(ProofGraphError::InvalidInput(format!(
            "max_children_per_parent must be >= 2, got {}",
            params.max_children_per_parent
        )));
    }
    if !(1.0..=5.0).contains(&params.target_complexity) {
        return Err(ProofGraphError::InvalidInput(format!(
            "target_complexity must be in [1, 5], got {}",
            params.target_complexity
        )));
    }
    if !(0.0..=3.0).contains(&params.complexity_band_width) {
        return Err(ProofGraphError::InvalidInput(format!(
            "complexity_band_width must be in [0, 3], got {}",
            params.complexity_band_width
        )));
    }

    let mut warnings: Vec<GroupingWarning> = Vec::new();

    let missing_complexity: Vec<DeclId> = {
        let mut ids: Vec<DeclId> = nodes
            .iter()
            .filter(|n| n.complexity.is_none())
            .map(|n| n.id.clone())
            .collect();
        ids.sort();
        ids
    };
    if !missing_complexity.is_empty() {
        warnings.push(GroupingWarning {
            kind: GroupingWarningKind::MissingComplexity,
            ids: missing_complexity,
        });
    }

    let by_id: BTreeMap<&str, &GroupCandidate> =
        nodes.iter().map(|n| (n.id.as_str(), n)).collect();
    let order = topological_order(&by_id, &mut warnings);
    let position: BTreeMap<&str, usize> = order
        .iter()
        .enumerate()
        .map(|(i, id)| (id.as_str(), i))
        .collect();
    let tokens: BTreeMap<&str, BTreeSet<String>> = nodes
        .iter()
        .map(|n| (n.id.as_str(), content_tokens(&n.statement)))
        .collect();
    let effective_complexity = |id: &str| -> f32 {
        by_id[id].complexity.unwrap_or(params.target_complexity)
    };

    let mut assigned: BTreeSet<&str> = BTreeSet::new();
    let mut groups: Vec<Vec<DeclId>> = Vec::new();
    let mut spreads: Vec<f32> = Vec::new();

    for start_index in 0..order.len() {
        let seed = order[start_index].as_str();
        if assigned.contains(seed) {
            continue;
        }

        let mut group: Vec<&str> = vec![seed];
        let mut complexities: Vec<f32> = vec![effective_complexity(seed)];

        while group.len() < params.max_children_per_parent {
            let group_avg = complexities.iter().sum::<f32>() / complexities.len() as f32;
            let min = complexities.iter().cloned().fold(f32::INFINITY, f32::min);
            let max = complexities.iter().cloned().fold(f32::NEG_INFINITY, f32::max);

            let satisfied = |candidate: &GroupCandidate| {
                candidate.prerequisite_ids.iter().all(|p| {
                    !by_id.contains_key(p.as_str())
                        || assigned.contains(p.as_str())
                        || group.contains(&p.as_str())
                })
            };

            let best = order[start_index + 1..]
                .iter()
                .map(|id| id.as_str())
                .filter(|id| !assigned.contains(id) && !group.contains(id))
                .filter(|id| satisfied(by_id[id]))
                .filter(|id| {
                    let c = effective_complexity(id);
                    max.max(c) - min.min(c) <= params.complexity_band_width
                })
                .min_by(|a, b| candidate_order(a, b, &group, &tokens, group_avg, params, &position, &effective_complexity));

            match best {
                Some(pick) => {
                    complexities.push(effective_complexity(pick));
                    group.push(pick);
                }
                None => break,
            }
        }

        for member in &group {
            assigned.insert(member);
        }
        let min = complexities.iter().cloned().fold(f32::INFINITY, f32::min);
        let max = complexities.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
        spreads.push(max - min);
        groups.push(group.iter().map(|id| id.to_string()).collect());
    }

    debug!(
        nodes = nodes.len(),
        groups = groups.len(),
        warnings = warnings.len(),
        "layer grouped"
    );

    Ok(GroupingOutcome {
        groups,
        diagnostics: GroupingDiagnostics {
            topological_order: order,
            warnings,
            group_spreads: spreads,
        },
    })
}

/// Total order over viable candidates: (a) highest similarity to any group
/// member, (b) smallest complexity distance from the group average,
/// (c) smallest distance from the target, (d) earliest topological
/// position, (e) lexicographic hash of id.
#[allow(clippy::too_many_arguments)]
fn candidate_order(
    a: &str,
    b: &str,
    group: &[&str],
    tokens: &BTreeMap<&str, BTreeSet<String>>,
    group_avg: f32,
    params: &GroupingParams,
    position: &BTreeMap<&str, usize>,
    effective_complexity: &dyn Fn(&str) -> f32,
) -> Ordering {
    let similarity = |id: &str| -> f64 {
        group
            .iter()
            .map(|member| jaccard(&tokens[id], &tokens[*member]))
            .fold(0.0, f64::max)
    };

    let sim_a = similarity(a);
    let sim_b = similarity(b);
    sim_b
        .total_cmp(&sim_a)
        .then_with(|| {
            let da = (effective_complexity(a) - group_avg).abs();
            let db = (effective_complexity(b) - group_avg).abs();
            da.total_cmp(&db)
        })
        .then_with(|| {
            let da = (effective_complexity(a) - params.target_complexity).abs();
            let db = (effective_complexity(b) - params.target_complexity).abs();
            da.total_cmp(&db)
        })
        .then_with(|| position[a].cmp(&position[b]))
        .then_with(|| id_tiebreak_hash(a).cmp(&id_tiebreak_hash(b)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str, statement: &str, prereqs: &[&str], complexity: Option<f32>) -> GroupCandidate {
        GroupCandidate {
            id: id.to_string(),
            statement: statement.to_string(),
            prerequisite_ids: prereqs.iter().map(|p| p.to_string()).collect(),
            complexity,
        }
    }

    fn params(max: usize, target: f32, band: f32) -> GroupingParams {
        GroupingParams {
            max_children_per_parent: max,
            target_complexity: target,
            complexity_band_width: band,
        }
    }

    #[test]
    fn validates_parameters() {
        let nodes = vec![node("a", "x", &[], Some(3.0))];
        assert!(group_layer(&nodes, &params(1, 3.0, 1.0)).is_err());
        assert!(group_layer(&nodes, &params(3, 0.5, 1.0)).is_err());
        assert!(group_layer(&nodes, &params(3, 3.0, 4.0)).is_err());
    }

    #[test]
    fn every_id_appears_exactly_once() {
        let nodes = vec![
            node("a", "alpha lemma", &[], Some(2.0)),
            node("b", "beta lemma", &["a"], Some(2.0)),
            node("c", "gamma lemma", &[], Some(2.0)),
            node("d", "delta lemma", &["c"], Some(2.0)),
            node("e", "epsilon lemma", &[], Some(2.0)),
        ];
        let outcome = group_layer(&nodes, &params(2, 2.0, 1.0)).unwrap();
        let mut all: Vec<DeclId> = outcome.groups.iter().flatten().cloned().collect();
        all.sort();
        assert_eq!(all, vec!["a", "b", "c", "d", "e"]);
    }

    #[test]
    fn prerequisites_are_never_violated() {
        let nodes = vec![
            node("base", "foundation result", &[], Some(3.0)),
            node("mid", "intermediate result", &["base"], Some(3.0)),
            node("top", "final result", &["mid"], Some(3.0)),
        ];
        let outcome = group_layer(&nodes, &params(2, 3.0, 1.0)).unwrap();

        let mut seen: BTreeSet<&str> = BTreeSet::new();
        for group in &outcome.groups {
            let resident: BTreeSet<&str> = group.iter().map(|s| s.as_str()).collect();
            for id in group {
                let candidate = nodes.iter().find(|n| &n.id == id).unwrap();
                for prereq in &candidate.prerequisite_ids {
                    assert!(
                        seen.contains(prereq.as_str()) || resident.contains(prereq.as_str()),
                        "{} grouped before its prerequisite {}",
                        id,
                        prereq
                    );
                }
            }
            seen.extend(resident);
        }
    }

    #[test]
    fn complexity_spread_is_bounded() {
        let nodes = vec![
            node("a", "alpha", &[], Some(1.0)),
            node("b", "beta", &[], Some(1.5)),
            node("c", "gamma", &[], Some(4.5)),
            node("d", "delta", &[], Some(5.0)),
        ];
        let outcome = group_layer(&nodes, &params(4, 3.0, 1.0)).unwrap();
        for spread in &outcome.diagnostics.group_spreads {
            assert!(*spread <= 1.0, "spread {} exceeds band", spread);
        }
        // 1.0/1.5 and 4.5/5.0 cannot mix.
        assert_eq!(outcome.groups.len(), 2);
    }

    #[test]
    fn missing_complexity_defaults_to_target_with_warning() {
        let nodes = vec![
            node("a", "alpha", &[], None),
            node("b", "beta", &[], Some(3.0)),
        ];
        let outcome = group_layer(&nodes, &params(2, 3.0, 0.0)).unwrap();
        assert_eq!(outcome.groups, vec![vec!["a".to_string(), "b".to_string()]]);
        let warning = outcome
            .diagnostics
            .warnings
            .iter()
            .find(|w| w.kind == GroupingWarningKind::MissingComplexity)
            .expect("missing_complexity warning");
        assert_eq!(warning.ids, vec!["a".to_string()]);
    }

    #[test]
    fn cycle_emits_warning_and_total_order() {
        let nodes = vec![
            node("a", "alpha", &["b"], Some(3.0)),
            node("b", "beta", &["a"], Some(3.0)),
            node("c", "gamma", &[], Some(3.0)),
        ];
        let outcome = group_layer(&nodes, &params(3, 3.0, 1.0)).unwrap();
        assert!(outcome
            .diagnostics
            .warnings
            .iter()
            .any(|w| w.kind == GroupingWarningKind::CycleDetected));
        assert_eq!(outcome.diagnostics.topological_order.len(), 3);
        let total: usize = outcome.groups.iter().map(|g| g.len()).sum();
        assert_eq!(total, 3);
    }

    #[test]
    fn similar_statements_group_together() {
        let nodes = vec![
            node("s1", "continuity of composition of continuous functions", &[], Some(3.0)),
            node("p1", "prime factorization uniqueness for integers", &[], Some(3.0)),
            node("s2", "composition of continuous functions is continuous", &[], Some(3.0)),
            node("p2", "uniqueness of prime factorization of every integer", &[], Some(3.0)),
        ];
        let outcome = group_layer(&nodes, &params(2, 3.0, 1.0)).unwrap();
        for group in &outcome.groups {
            let themes: BTreeSet<char> = group.iter().map(|id| id.chars().next().unwrap()).collect();
            assert_eq!(themes.len(), 1, "mixed-theme group: {:?}", group);
        }
    }

    #[test]
    fn grouping_is_independent_of_input_order() {
        let forward = vec![
            node("a", "alpha lemma about rings", &[], Some(2.0)),
            node("b", "beta lemma about rings", &["a"], Some(2.5)),
            node("c", "gamma result on fields", &[], Some(3.0)),
            node("d", "delta result on fields", &["c"], Some(3.5)),
        ];
        let mut reversed = forward.clone();
        reversed.reverse();

        let p = params(2, 3.0, 1.0);
        let out1 = group_layer(&forward, &p).unwrap();
        let out2 = group_layer(&reversed, &p).unwrap();
        assert_eq!(out1.groups, out2.groups);
        assert_eq!(
            out1.diagnostics.topological_order,
            out2.diagnostics.topological_order
        );
    }

    #[test]
    fn group_size_never_exceeds_max() {
        let nodes: Vec<GroupCandidate> = (0..10)
            .map(|i| node(&format!("n{}", i), "same statement text", &[], Some(3.0)))
            .collect();
        let outcome = group_layer(&nodes, &params(3, 3.0, 1.0)).unwrap();
        assert!(outcome.groups.iter().all(|g| g.len() <= 3));
    }
}
