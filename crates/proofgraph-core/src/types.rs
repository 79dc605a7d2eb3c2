use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Identifier of a declaration or tree node. Declaration names from the
/// upstream corpus are used verbatim; synthesized parents get
/// content-derived ids (see `hash::parent_id_for`).
pub type DeclId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeclCategory {
    /// Declared in the corpus being explained.
    Indexed,
    /// Referenced by the corpus but never declared in it; materialized as a
    /// placeholder so traversal never dereferences a missing key.
    External,
}

/// One declaration in the dependency graph, immutable after construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeclarationNode {
    pub id: DeclId,
    pub category: DeclCategory,
    /// Sorted ids this declaration depends on.
    pub dependency_ids: Vec<DeclId>,
    /// Sorted inverse edges.
    pub dependent_ids: Vec<DeclId>,
}

/// A dependency reference whose target was never declared in the corpus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingDependencyRef {
    pub declaration_id: DeclId,
    pub missing_id: DeclId,
}

/// Input record for one leaf of the explanation tree, supplied by the
/// upstream ingestion layer. The engine never parses source files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeafNodeInput {
    pub id: DeclId,
    pub statement: String,
    #[serde(default)]
    pub prerequisite_ids: Vec<DeclId>,
    /// Optional complexity estimate in [1, 5]. Grouping defaults missing
    /// scores to the configured target and records a warning.
    #[serde(default)]
    pub complexity_score: Option<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Leaf,
    Parent,
}

/// One node of the finished explanation tree. Leaves are created once from
/// input and never mutated; parents are immutable once accepted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExplanationTreeNode {
    pub id: DeclId,
    pub kind: NodeKind,
    pub statement: String,
    /// 0 for leaves, increasing toward the root.
    pub depth: u32,
    /// Ordered children; empty for leaves.
    #[serde(default)]
    pub child_ids: Vec<DeclId>,
    /// Ids this statement is entitled to cite. For leaves, the leaf itself.
    pub evidence_refs: Vec<DeclId>,
    pub complexity_score: f32,
    pub abstraction_score: f32,
    pub confidence: f32,
    #[serde(default)]
    pub why_true_from_children: Option<String>,
    #[serde(default)]
    pub new_terms_introduced: Vec<String>,
    #[serde(default)]
    pub policy_diagnostics: Option<PolicyDiagnostics>,
}

/// What sanitization altered in the child statements sent to the model.
/// Counts are disclosed in the prompt and retained per parent for audit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SanitizeReport {
    pub control_chars_stripped: usize,
    pub secrets_redacted: usize,
    pub injections_neutralized: usize,
}

impl SanitizeReport {
    pub fn is_clean(&self) -> bool {
        self.control_chars_stripped == 0
            && self.secrets_redacted == 0
            && self.injections_neutralized == 0
    }

    pub fn merge(&mut self, other: &SanitizeReport) {
        self.control_chars_stripped += other.control_chars_stripped;
        self.secrets_redacted += other.secrets_redacted;
        self.injections_neutralized += other.injections_neutralized;
    }
}

/// Record of how a parent summary cleared (or reused its way past) the
/// critic, attached per parent for operator audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyDiagnostics {
    /// 1 if the first attempt passed, 2 if the retry passed, 0 if reused.
    pub accepted_on_attempt: u32,
    pub reused: bool,
    /// Violations from the first attempt when a retry was needed.
    #[serde(default)]
    pub first_attempt_violations: Vec<CriticViolation>,
    /// What sanitization altered in this group's child statements. Zeros
    /// for reused parents, where no prompt was built.
    #[serde(default)]
    pub sanitize: SanitizeReport,
}

/// Ordered groups for one synthesized layer, kept for replay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerPlan {
    /// Depth of the parents this layer produced.
    pub depth: u32,
    pub groups: Vec<Vec<DeclId>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupingWarningKind {
    CycleDetected,
    MissingComplexity,
    /// A layer failed to shrink under normal grouping and was force-merged
    /// in topological order to guarantee termination.
    ForcedMerge,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupingWarning {
    pub kind: GroupingWarningKind,
    /// Ids the warning applies to, sorted.
    pub ids: Vec<DeclId>,
}

/// Per-layer grouping output consumed by downstream quality evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupingDiagnostics {
    pub topological_order: Vec<DeclId>,
    pub warnings: Vec<GroupingWarning>,
    /// Max-minus-min complexity per group, same order as the groups.
    pub group_spreads: Vec<f32>,
}

/// The finished multi-level explanation tree.
///
/// All maps are `BTreeMap` so the serialized form is order-independent and
/// the downstream storage layer's canonicalization stays deterministic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExplanationTree {
    pub root_id: DeclId,
    /// Sorted; must equal the input leaf id set.
    pub leaf_ids: Vec<DeclId>,
    pub nodes: BTreeMap<DeclId, ExplanationTreeNode>,
    pub max_depth: u32,
    /// Ties the tree to the generation configuration.
    pub config_hash: String,
    pub group_plan: Vec<LayerPlan>,
    pub grouping_diagnostics: Vec<GroupingDiagnostics>,
    pub policy_diagnostics_by_parent: BTreeMap<DeclId, PolicyDiagnostics>,
}

/// Candidate parent summary as deserialized from an LLM response.
/// Transient; only survives into an `ExplanationTreeNode` after passing
/// critic validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParentSummary {
    pub parent_statement: String,
    pub why_true_from_children: String,
    #[serde(default)]
    pub new_terms_introduced: Vec<String>,
    pub complexity_score: f32,
    pub abstraction_score: f32,
    pub evidence_refs: Vec<DeclId>,
    pub confidence: f32,
}

/// A previously accepted summary supplied by the caller across rebuilds to
/// avoid re-invoking the LLM for unchanged groups.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReusableParentSummary {
    /// Hash of the ordered `(id, statement)` pairs of the children that
    /// produced this summary (see `hash::child_statement_hash`).
    pub child_statement_hash: String,
    pub summary: ParentSummary,
    #[serde(default)]
    pub policy_diagnostics: Option<PolicyDiagnostics>,
}

/// One `(id, statement)` pair handed to the summary pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildStatement {
    pub id: DeclId,
    pub statement: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    Schema,
    EvidenceRefs,
    ComplexityBand,
    TermBudget,
    UnsupportedTerms,
    SecretLeak,
    PromptInjection,
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ViolationKind::Schema => "schema",
            ViolationKind::EvidenceRefs => "evidence_refs",
            ViolationKind::ComplexityBand => "complexity_band",
            ViolationKind::TermBudget => "term_budget",
            ViolationKind::UnsupportedTerms => "unsupported_terms",
            ViolationKind::SecretLeak => "secret_leak",
            ViolationKind::PromptInjection => "prompt_injection",
        };
        write!(f, "{}", s)
    }
}

/// A named, structured reason a generated summary was rejected. All
/// rejection paths (parsing included) share this one reporting shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CriticViolation {
    pub kind: ViolationKind,
    pub message: String,
}

impl CriticViolation {
    pub fn new(kind: ViolationKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TreeIssueKind {
    LeafNotPreserved,
    NotConnected,
    TooManyChildren,
    DuplicateReach,
}

impl fmt::Display for TreeIssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TreeIssueKind::LeafNotPreserved => "leaf_not_preserved",
            TreeIssueKind::NotConnected => "not_connected",
            TreeIssueKind::TooManyChildren => "too_many_children",
            TreeIssueKind::DuplicateReach => "duplicate_reach",
        };
        write!(f, "{}", s)
    }
}

/// A global tree invariant violation found by `validate_explanation_tree`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeIssue {
    pub kind: TreeIssueKind,
    pub node_id: DeclId,
}
