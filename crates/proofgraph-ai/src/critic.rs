//! Critic validation of parsed parent summaries.
//!
//! Every check appends to one ordered violation list; nothing throws from
//! the middle of validation, so callers always see the complete picture.

use std::collections::BTreeSet;

use proofgraph_core::text::{content_tokens, stem};
use proofgraph_core::{
    CriticViolation, DeclId, EntailmentMode, ExplanationConfig, ParentSummary, ViolationKind,
};

use crate::sanitize::{find_injection_markers, find_secret_leaks};

/// Immutable context for validating one summary.
pub struct CriticContext<'a> {
    pub child_ids: &'a [DeclId],
    /// Stemmed content tokens across all child statements.
    pub child_vocabulary: &'a BTreeSet<String>,
    pub config: &'a ExplanationConfig,
}

/// Runs every critic check. Empty result means the summary is accepted.
pub fn validate_summary(summary: &ParentSummary, ctx: &CriticContext<'_>) -> Vec<CriticViolation> {
    let mut violations = Vec::new();

    check_schema_ranges(summary, &mut violations);
    check_evidence_refs(summary, ctx, &mut violations);
    check_term_budget(summary, ctx, &mut violations);
    check_complexity_band(summary, ctx, &mut violations);
    check_token_coverage(summary, ctx, &mut violations);
    check_field_security(summary, &mut violations);

    violations
}

fn check_schema_ranges(summary: &ParentSummary, violations: &mut Vec<CriticViolation>) {
    if summary.parent_statement.trim().is_empty() {
        violations.push(CriticViolation::new(
            ViolationKind::Schema,
            "parent_statement is empty",
        ));
    }
    if summary.why_true_from_children.trim().is_empty() {
        violations.push(CriticViolation::new(
            ViolationKind::Schema,
            "why_true_from_children is empty",
        ));
    }
    if !(1.0..=5.0).contains(&summary.complexity_score) {
        violations.push(CriticViolation::new(
            ViolationKind::Schema,
            format!("complexity_score {} outside [1, 5]", summary.complexity_score),
        ));
    }
    if !(1.0..=5.0).contains(&summary.abstraction_score) {
        violations.push(CriticViolation::new(
            ViolationKind::Schema,
            format!(
                "abstraction_score {} outside [1, 5]",
                summary.abstraction_score
            ),
        ));
    }
    if !(0.0..=1.0).contains(&summary.confidence) {
        violations.push(CriticViolation::new(
            ViolationKind::Schema,
            format!("confidence {} outside [0, 1]", summary.confidence),
        ));
    }
}

fn check_evidence_refs(
    summary: &ParentSummary,
    ctx: &CriticContext<'_>,
    violations: &mut Vec<CriticViolation>,
) {
    if summary.evidence_refs.is_empty() {
        violations.push(CriticViolation::new(
            ViolationKind::EvidenceRefs,
            "evidence_refs is empty",
        ));
        return;
    }

    let provided: BTreeSet<&str> = ctx.child_ids.iter().map(|s| s.as_str()).collect();
    for reference in &summary.evidence_refs {
        if !provided.contains(reference.as_str()) {
            violations.push(CriticViolation::new(
                ViolationKind::EvidenceRefs,
                format!("evidence_refs cites unknown id: {}", reference),
            ));
        }
    }

    if ctx.config.entailment_mode == EntailmentMode::Strict {
        let cited: BTreeSet<&str> = summary.evidence_refs.iter().map(|s| s.as_str()).collect();
        for id in ctx.child_ids {
            if !cited.contains(id.as_str()) {
                violations.push(CriticViolation::new(
                    ViolationKind::EvidenceRefs,
                    format!("strict mode requires citing every child; missing: {}", id),
                ));
            }
        }
    }
}

fn check_term_budget(
    summary: &ParentSummary,
    ctx: &CriticContext<'_>,
    violations: &mut Vec<CriticViolation>,
) {
    let budget = ctx.config.effective_term_budget();
    if summary.new_terms_introduced.len() > budget {
        violations.push(CriticViolation::new(
            ViolationKind::TermBudget,
            format!(
                "{} new term(s) introduced, budget is {}",
                summary.new_terms_introduced.len(),
                budget
            ),
        ));
    }
}

fn check_complexity_band(
    summary: &ParentSummary,
    ctx: &CriticContext<'_>,
    violations: &mut Vec<CriticViolation>,
) {
    let (lo, hi) = ctx.config.complexity_band();
    if summary.complexity_score < lo || summary.complexity_score > hi {
        violations.push(CriticViolation::new(
            ViolationKind::ComplexityBand,
            format!(
                "complexity_score {} outside band [{}, {}]",
                summary.complexity_score, lo, hi
            ),
        ));
    }
}

/// Stemmed content tokens of the parent statement (and, in strict mode, the
/// entailment rationale) must trace to child vocabulary or declared new
/// terms at a rate above the configured floor.
fn check_token_coverage(
    summary: &ParentSummary,
    ctx: &CriticContext<'_>,
    violations: &mut Vec<CriticViolation>,
) {
    let mut allowed = ctx.child_vocabulary.clone();
    for term in &summary.new_terms_introduced {
        allowed.extend(content_tokens(term));
        allowed.insert(stem(&term.to_lowercase()));
    }

    let floor = ctx.config.coverage_floor();
    let mut texts: Vec<(&str, &str)> = vec![("parent_statement", &summary.parent_statement)];
    if ctx.config.entailment_mode == EntailmentMode::Strict {
        texts.push(("why_true_from_children", &summary.why_true_from_children));
    }

    for (field, text) in texts {
        let tokens = content_tokens(text);
        if tokens.is_empty() {
            continue;
        }
        let uncovered: Vec<&String> = tokens.iter().filter(|t| !allowed.contains(*t)).collect();
        let coverage = 1.0 - uncovered.len() as f32 / tokens.len() as f32;
        if coverage < floor {
            let sample: Vec<&str> = uncovered.iter().take(5).map(|s| s.as_str()).collect();
            violations.push(CriticViolation::new(
                ViolationKind::UnsupportedTerms,
                format!(
                    "{} token coverage {:.2} below floor {:.2}; untraceable: {}",
                    field,
                    coverage,
                    floor,
                    sample.join(", ")
                ),
            ));
        }
    }
}

/// The same secret/injection scans applied to raw text, repeated against
/// the parsed fields.
fn check_field_security(summary: &ParentSummary, violations: &mut Vec<CriticViolation>) {
    let fields: Vec<(&str, String)> = vec![
        ("parent_statement", summary.parent_statement.clone()),
        (
            "why_true_from_children",
            summary.why_true_from_children.clone(),
        ),
        ("new_terms_introduced", summary.new_terms_introduced.join(" ")),
    ];

    for (field, text) in fields {
        for name in find_secret_leaks(&text) {
            violations.push(CriticViolation::new(
                ViolationKind::SecretLeak,
                format!("{} matches secret pattern: {}", field, name),
            ));
        }
        for name in find_injection_markers(&text) {
            violations.push(CriticViolation::new(
                ViolationKind::PromptInjection,
                format!("{} matches injection pattern: {}", field, name),
            ));
        }
    }
}
