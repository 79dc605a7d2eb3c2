//! Bottom-up explanation tree construction.
//!
//! Leaves come in validated, each layer is grouped deterministically, each
//! group is summarized (or reused) through the summary pipeline, and the
//! layers stack until a single root remains. Parent identity is derived
//! from child content, so two builds over identical inputs produce the
//! same tree byte for byte.

use std::collections::{BTreeMap, BTreeSet};

use futures::future;
use tracing::{debug, info, warn};

use proofgraph_ai::pipeline::{generate_parent_summary, SummaryRequest};
use proofgraph_ai::LLMClient;
use proofgraph_core::hash::{child_statement_hash, parent_id_for};
use proofgraph_core::{
    ChildStatement, DeclId, ExplanationConfig, ExplanationTree, ExplanationTreeNode,
    GroupingDiagnostics, GroupingWarning, GroupingWarningKind, LayerPlan, LeafNodeInput, NodeKind,
    ParentSummary, PolicyDiagnostics, ProofGraphError, Result, ReusableParentSummary,
    SanitizeReport, TreePolicyError,
};

use crate::grouping::{group_layer, GroupCandidate, GroupingParams};
use crate::validate::validate_explanation_tree;

/// How many parent summaries are requested from the provider concurrently.
pub const DEFAULT_SUMMARY_BATCH_SIZE: usize = 8;

/// Everything one build needs besides the client.
#[derive(Debug, Clone)]
pub struct BuildRequest {
    pub leaves: Vec<LeafNodeInput>,
    pub config: ExplanationConfig,
    /// Concurrent summary requests per batch; `None` uses
    /// [`DEFAULT_SUMMARY_BATCH_SIZE`].
    pub summary_batch_size: Option<usize>,
    /// Accepted summaries from a prior build, keyed by parent id. Groups
    /// whose child content hash matches are not re-generated.
    pub reusable_parent_summaries: BTreeMap<DeclId, ReusableParentSummary>,
}

impl BuildRequest {
    pub fn new(leaves: Vec<LeafNodeInput>, config: ExplanationConfig) -> Self {
        Self {
            leaves,
            config,
            summary_batch_size: None,
            reusable_parent_summaries: BTreeMap::new(),
        }
    }
}

/// One node of the layer currently being grouped.
#[derive(Debug, Clone)]
struct LayerNode {
    id: DeclId,
    statement: String,
    prerequisite_ids: Vec<DeclId>,
    complexity: Option<f32>,
}

/// One group scheduled for synthesis, self-contained so batches can run
/// concurrently without touching shared layer state.
#[derive(Debug, Clone)]
struct GroupJob {
    index: usize,
    depth: u32,
    parent_id: DeclId,
    child_hash: String,
    children: Vec<ChildStatement>,
}

struct SynthesizedParent {
    index: usize,
    node: ExplanationTreeNode,
    diagnostics: PolicyDiagnostics,
}

pub struct TreeBuilder<'a> {
    client: &'a dyn LLMClient,
}

impl<'a> TreeBuilder<'a> {
    pub fn new(client: &'a dyn LLMClient) -> Self {
        Self { client }
    }

    pub async fn build(&self, request: &BuildRequest) -> Result<ExplanationTree> {
        let config = &request.config;
        config.validate()?;
        let batch_size = request
            .summary_batch_size
            .unwrap_or(DEFAULT_SUMMARY_BATCH_SIZE);
        if batch_size == 0 {
            return Err(ProofGraphError::InvalidInput(
                "summary_batch_size must be >= 1".to_string(),
            ));
        }
        if request.leaves.is_empty() {
            return Err(ProofGraphError::InvalidInput(
                "cannot build a tree from zero leaves".to_string(),
            ));
        }
        let mut seen: BTreeSet<&str> = BTreeSet::new();
        for leaf in &request.leaves {
            if leaf.id.trim().is_empty() {
                return Err(ProofGraphError::InvalidInput(
                    "leaf id must be non-empty".to_string(),
                ));
            }
            if !seen.insert(leaf.id.as_str()) {
                return Err(ProofGraphError::InvalidInput(format!(
                    "duplicate leaf id: {}",
                    leaf.id
                )));
            }
        }

        let config_hash = config.config_hash()?;

        let mut nodes: BTreeMap<DeclId, ExplanationTreeNode> = BTreeMap::new();
        for leaf in &request.leaves {
            nodes.insert(
                leaf.id.clone(),
                ExplanationTreeNode {
                    id: leaf.id.clone(),
                    kind: NodeKind::Leaf,
                    statement: leaf.statement.clone(),
                    depth: 0,
                    child_ids: vec![],
                    evidence_refs: vec![leaf.id.clone()],
                    complexity_score: leaf.complexity_score.unwrap_or(config.complexity_level),
                    abstraction_score: 1.0,
                    confidence: 1.0,
                    why_true_from_children: None,
                    new_terms_introduced: vec![],
                    policy_diagnostics: None,
                },
            );
        }
        let mut leaf_ids: Vec<DeclId> = request.leaves.iter().map(|l| l.id.clone()).collect();
        leaf_ids.sort();

        // A single declaration is its own explanation; no synthesis needed.
        if request.leaves.len() == 1 {
            let root_id = leaf_ids[0].clone();
            info!(root = %root_id, "single-leaf tree, no synthesis");
            let tree = ExplanationTree {
                root_id,
                leaf_ids: leaf_ids.clone(),
                nodes,
                max_depth: 0,
                config_hash,
                group_plan: vec![],
                grouping_diagnostics: vec![],
                policy_diagnostics_by_parent: BTreeMap::new(),
            };
            return finalize(tree, &leaf_ids, config.max_children_per_parent);
        }

        let params = GroupingParams {
            max_children_per_parent: config.max_children_per_parent,
            target_complexity: config.complexity_level,
            complexity_band_width: config.complexity_band_width,
        };

        let mut layer: Vec<LayerNode> = request
            .leaves
            .iter()
            .map(|l| LayerNode {
                id: l.id.clone(),
                statement: l.statement.clone(),
                prerequisite_ids: l.prerequisite_ids.clone(),
                complexity: l.complexity_score,
            })
            .collect();

        let mut group_plan: Vec<LayerPlan> = Vec::new();
        let mut grouping_diagnostics: Vec<GroupingDiagnostics> = Vec::new();
        let mut policy_by_parent: BTreeMap<DeclId, PolicyDiagnostics> = BTreeMap::new();
        let mut depth: u32 = 0;

        while layer.len() > 1 {
            depth += 1;
            let candidates: Vec<GroupCandidate> = layer
                .iter()
                .map(|n| GroupCandidate {
                    id: n.id.clone(),
                    statement: n.statement.clone(),
                    prerequisite_ids: n.prerequisite_ids.clone(),
                    complexity: n.complexity,
                })
                .collect();
            let outcome = group_layer(&candidates, &params)?;
            let mut groups = outcome.groups;
            let mut diagnostics = outcome.diagnostics;

            // All-singleton output would never shrink the layer. Merge in
            // topological order instead; order safety is preserved because
            // every prerequisite sits in an earlier or the same chunk.
            if groups.len() == layer.len() {
                warn!(depth, nodes = layer.len(), "layer did not shrink, forcing merges");
                let order = diagnostics.topological_order.clone();
                groups = order
                    .chunks(config.max_children_per_parent)
                    .map(|chunk| chunk.to_vec())
                    .collect();
                let complexity_of: BTreeMap<&str, f32> = layer
                    .iter()
                    .map(|n| {
                        (
                            n.id.as_str(),
                            n.complexity.unwrap_or(config.complexity_level),
                        )
                    })
                    .collect();
                diagnostics.group_spreads = groups
                    .iter()
                    .map(|group| {
                        let mut min = f32::INFINITY;
                        let mut max = f32::NEG_INFINITY;
                        for id in group {
                            let c = complexity_of[id.as_str()];
                            min = min.min(c);
                            max = max.max(c);
                        }
                        max - min
                    })
                    .collect();
                let mut merged: Vec<DeclId> = order;
                merged.sort();
                diagnostics.warnings.push(GroupingWarning {
                    kind: GroupingWarningKind::ForcedMerge,
                    ids: merged,
                });
            }

            let statement_of: BTreeMap<&str, &str> = layer
                .iter()
                .map(|n| (n.id.as_str(), n.statement.as_str()))
                .collect();
            let jobs: Vec<GroupJob> = groups
                .iter()
                .enumerate()
                .map(|(index, group)| {
                    let children: Vec<ChildStatement> = group
                        .iter()
                        .map(|id| ChildStatement {
                            id: id.clone(),
                            statement: statement_of[id.as_str()].to_string(),
                        })
                        .collect();
                    let child_hash = child_statement_hash(&children);
                    let parent_id = parent_id_for(&child_hash);
                    GroupJob {
                        index,
                        depth,
                        parent_id,
                        child_hash,
                        children,
                    }
                })
                .collect();

            debug!(depth, groups = jobs.len(), "synthesizing layer");
            let mut parents: Vec<SynthesizedParent> = Vec::with_capacity(jobs.len());
            for batch in jobs.chunks(batch_size) {
                let futures: Vec<_> = batch
                    .iter()
                    .map(|job| {
                        self.synthesize_group(job, config, &request.reusable_parent_summaries)
                    })
                    .collect();
                let mut batch_parents = future::try_join_all(futures).await?;
                parents.append(&mut batch_parents);
            }
            parents.sort_by_key(|p| p.index);

            // Parent prerequisites are child prerequisites lifted to the
            // owning parent, minus self-edges.
            let mut owner: BTreeMap<DeclId, DeclId> = BTreeMap::new();
            for parent in &parents {
                for child in &parent.node.child_ids {
                    owner.insert(child.clone(), parent.node.id.clone());
                }
            }
            let prereqs_of: BTreeMap<&str, &[DeclId]> = layer
                .iter()
                .map(|n| (n.id.as_str(), n.prerequisite_ids.as_slice()))
                .collect();
            let mut next_layer: Vec<LayerNode> = Vec::with_capacity(parents.len());
            for parent in &parents {
                let mut lifted: BTreeSet<DeclId> = BTreeSet::new();
                for child in &parent.node.child_ids {
                    let Some(child_prereqs) = prereqs_of.get(child.as_str()) else {
                        continue;
                    };
                    for prereq in child_prereqs.iter() {
                        if let Some(owner_id) = owner.get(prereq) {
                            if owner_id != &parent.node.id {
                                lifted.insert(owner_id.clone());
                            }
                        }
                    }
                }
                next_layer.push(LayerNode {
                    id: parent.node.id.clone(),
                    statement: parent.node.statement.clone(),
                    prerequisite_ids: lifted.into_iter().collect(),
                    complexity: Some(parent.node.complexity_score),
                });
            }

            group_plan.push(LayerPlan {
                depth,
                groups: groups.clone(),
            });
            grouping_diagnostics.push(diagnostics);
            for parent in parents {
                policy_by_parent.insert(parent.node.id.clone(), parent.diagnostics);
                nodes.insert(parent.node.id.clone(), parent.node);
            }
            layer = next_layer;
        }

        let root_id = layer
            .first()
            .map(|n| n.id.clone())
            .ok_or_else(|| ProofGraphError::Internal("build produced no root".to_string()))?;
        info!(
            root = %root_id,
            leaves = leaf_ids.len(),
            max_depth = depth,
            parents = policy_by_parent.len(),
            "explanation tree built"
        );
        let tree = ExplanationTree {
            root_id,
            leaf_ids: leaf_ids.clone(),
            nodes,
            max_depth: depth,
            config_hash,
            group_plan,
            grouping_diagnostics,
            policy_diagnostics_by_parent: policy_by_parent,
        };
        finalize(tree, &leaf_ids, config.max_children_per_parent)
    }

    /// Produce one parent: reuse an unchanged prior summary, else generate
    /// with one feedback retry before giving up on the whole build.
    async fn synthesize_group(
        &self,
        job: &GroupJob,
        config: &ExplanationConfig,
        reusable: &BTreeMap<DeclId, ReusableParentSummary>,
    ) -> Result<SynthesizedParent> {
        if let Some(prior) = find_reusable(job, reusable) {
            debug!(parent = %job.parent_id, "group unchanged, reusing prior summary");
            let diagnostics = PolicyDiagnostics {
                accepted_on_attempt: 0,
                reused: true,
                first_attempt_violations: vec![],
                sanitize: SanitizeReport::default(),
            };
            return Ok(make_parent(job, &prior.summary, diagnostics));
        }

        let first_request = SummaryRequest {
            children: job.children.clone(),
            config: config.clone(),
            system_prompt: None,
            violation_feedback: None,
        };
        match generate_parent_summary(self.client, &first_request).await {
            Ok(outcome) => Ok(make_parent(
                job,
                &outcome.summary,
                PolicyDiagnostics {
                    accepted_on_attempt: 1,
                    reused: false,
                    first_attempt_violations: vec![],
                    sanitize: outcome.sanitize_report,
                },
            )),
            Err(ProofGraphError::SummaryValidation(first)) => {
                warn!(
                    parent = %job.parent_id,
                    violations = first.violations.len(),
                    "summary rejected, retrying with feedback"
                );
                let retry_request = SummaryRequest {
                    violation_feedback: Some(first.violations.clone()),
                    ..first_request
                };
                match generate_parent_summary(self.client, &retry_request).await {
                    Ok(outcome) => Ok(make_parent(
                        job,
                        &outcome.summary,
                        PolicyDiagnostics {
                            accepted_on_attempt: 2,
                            reused: false,
                            first_attempt_violations: first.violations,
                            sanitize: outcome.sanitize_report,
                        },
                    )),
                    Err(ProofGraphError::SummaryValidation(second)) => Err(TreePolicyError {
                        parent_id: job.parent_id.clone(),
                        child_ids: job.children.iter().map(|c| c.id.clone()).collect(),
                        attempts: 2,
                        first_attempt_violations: first.violations,
                        final_violations: second.violations,
                        raw_text: second.raw_text,
                    }
                    .into()),
                    Err(other) => Err(other),
                }
            }
            Err(other) => Err(other),
        }
    }
}

fn finalize(
    tree: ExplanationTree,
    expected_leaf_ids: &[DeclId],
    max_children: usize,
) -> Result<ExplanationTree> {
    let issues = validate_explanation_tree(&tree, expected_leaf_ids, max_children);
    if issues.is_empty() {
        return Ok(tree);
    }
    let described: Vec<String> = issues
        .iter()
        .map(|i| format!("{}:{}", i.kind, i.node_id))
        .collect();
    Err(ProofGraphError::Internal(format!(
        "built tree failed invariant checks: {}",
        described.join(", ")
    )))
}

/// Exact id match wins; otherwise a content-hash scan, but only when the
/// hash identifies exactly one prior summary.
fn find_reusable<'r>(
    job: &GroupJob,
    reusable: &'r BTreeMap<DeclId, ReusableParentSummary>,
) -> Option<&'r ReusableParentSummary> {
    if let Some(prior) = reusable.get(&job.parent_id) {
        if prior.child_statement_hash == job.child_hash {
            return Some(prior);
        }
    }
    let mut matches = reusable
        .values()
        .filter(|r| r.child_statement_hash == job.child_hash);
    match (matches.next(), matches.next()) {
        (Some(only), None) => Some(only),
        (Some(_), Some(_)) => {
            debug!(parent = %job.parent_id, "ambiguous reusable hash, regenerating");
            None
        }
        _ => None,
    }
}

fn make_parent(
    job: &GroupJob,
    summary: &ParentSummary,
    diagnostics: PolicyDiagnostics,
) -> SynthesizedParent {
    let why = if summary.why_true_from_children.trim().is_empty() {
        None
    } else {
        Some(summary.why_true_from_children.clone())
    };
    SynthesizedParent {
        index: job.index,
        node: ExplanationTreeNode {
            id: job.parent_id.clone(),
            kind: NodeKind::Parent,
            statement: summary.parent_statement.clone(),
            depth: job.depth,
            child_ids: job.children.iter().map(|c| c.id.clone()).collect(),
            evidence_refs: summary.evidence_refs.clone(),
            complexity_score: summary.complexity_score,
            abstraction_score: summary.abstraction_score,
            confidence: summary.confidence,
            why_true_from_children: why,
            new_terms_introduced: summary.new_terms_introduced.clone(),
            policy_diagnostics: Some(diagnostics.clone()),
        },
        diagnostics,
    }
}

/// Extract reusable summaries from a finished tree for the next build over
/// the same corpus. Parents whose children are missing from the node map
/// are skipped.
pub fn reusable_summaries_from_tree(
    tree: &ExplanationTree,
) -> BTreeMap<DeclId, ReusableParentSummary> {
    let mut out = BTreeMap::new();
    for node in tree.nodes.values() {
        if node.kind != NodeKind::Parent {
            continue;
        }
        let mut children: Vec<ChildStatement> = Vec::with_capacity(node.child_ids.len());
        let mut complete = true;
        for child_id in &node.child_ids {
            match tree.nodes.get(child_id) {
                Some(child) => children.push(ChildStatement {
                    id: child.id.clone(),
                    statement: child.statement.clone(),
                }),
                None => {
                    complete = false;
                    break;
                }
            }
        }
        if !complete {
            continue;
        }
        let summary = ParentSummary {
            parent_statement: node.statement.clone(),
            why_true_from_children: node.why_true_from_children.clone().unwrap_or_default(),
            new_terms_introduced: node.new_terms_introduced.clone(),
            complexity_score: node.complexity_score,
            abstraction_score: node.abstraction_score,
            evidence_refs: node.evidence_refs.clone(),
            confidence: node.confidence,
        };
        out.insert(
            node.id.clone(),
            ReusableParentSummary {
                child_statement_hash: child_statement_hash(&children),
                summary,
                policy_diagnostics: node.policy_diagnostics.clone(),
            },
        );
    }
    out
}
