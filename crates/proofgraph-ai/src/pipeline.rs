//! The summary pipeline: one group of children in, one validated parent
//! summary out. Sanitizes the prompt, calls the injected client, screens
//! the raw response, parses defensively, and runs the critic.

use std::collections::BTreeSet;

use tracing::{debug, warn};

use proofgraph_core::text::content_tokens;
use proofgraph_core::{
    ChildStatement, CriticViolation, ExplanationConfig, ParentSummary, Result,
    SummaryValidationError,
};

use crate::critic::{validate_summary, CriticContext};
use crate::extract::{parse_parent_summary, screen_raw_response};
use crate::llm::{GenerationConfig, LLMClient, Message};
use crate::prompt::{build_system_prompt, build_user_prompt};
use crate::sanitize::{sanitize_statement, SanitizeReport};

/// Request for one parent summary.
#[derive(Debug, Clone)]
pub struct SummaryRequest {
    pub children: Vec<ChildStatement>,
    pub config: ExplanationConfig,
    /// Overrides the built-in system prompt when set.
    pub system_prompt: Option<String>,
    /// Violations from a rejected prior attempt, fed back to the model.
    pub violation_feedback: Option<Vec<CriticViolation>>,
}

/// A summary that passed every critic and security check.
#[derive(Debug, Clone)]
pub struct SummaryOutcome {
    pub summary: ParentSummary,
    pub raw_text: String,
    /// Aggregate of what sanitization altered across the children.
    pub sanitize_report: SanitizeReport,
}

pub async fn generate_parent_summary(
    client: &dyn LLMClient,
    request: &SummaryRequest,
) -> Result<SummaryOutcome> {
    let mut sanitize_report = SanitizeReport::default();
    let sanitized: Vec<ChildStatement> = request
        .children
        .iter()
        .map(|child| {
            let (statement, report) = sanitize_statement(&child.statement);
            sanitize_report.merge(&report);
            ChildStatement {
                id: child.id.clone(),
                statement,
            }
        })
        .collect();
    if !sanitize_report.is_clean() {
        debug!(
            secrets = sanitize_report.secrets_redacted,
            injections = sanitize_report.injections_neutralized,
            control_chars = sanitize_report.control_chars_stripped,
            "child statements required sanitization"
        );
    }

    let system = request
        .system_prompt
        .clone()
        .unwrap_or_else(|| build_system_prompt(&request.config));
    let user = build_user_prompt(
        &sanitized,
        &request.config,
        &sanitize_report,
        request.violation_feedback.as_deref(),
    );
    let messages = [Message::system(system), Message::user(user)];
    let generation = GenerationConfig {
        temperature: request.config.model.temperature,
        max_output_tokens: request.config.model.max_output_tokens,
    };

    let response = client.generate_chat(&messages, &generation).await?;
    let raw_text = response.content;

    // Raw screening comes first: a leak in raw output is fatal no matter
    // what the parsed JSON contains, because raw text may reach logs.
    let mut violations =
        screen_raw_response(&raw_text, request.config.thresholds.min_secret_value_len);
    if !violations.is_empty() {
        warn!(count = violations.len(), "raw response failed security screening");
        return Err(SummaryValidationError {
            violations,
            raw_text,
        }
        .into());
    }

    let summary = match parse_parent_summary(&raw_text) {
        Ok(summary) => summary,
        Err(violation) => {
            violations.push(violation);
            return Err(SummaryValidationError {
                violations,
                raw_text,
            }
            .into());
        }
    };

    let child_ids: Vec<String> = sanitized.iter().map(|c| c.id.clone()).collect();
    let mut child_vocabulary: BTreeSet<String> = BTreeSet::new();
    for child in &sanitized {
        child_vocabulary.extend(content_tokens(&child.statement));
    }
    let ctx = CriticContext {
        child_ids: &child_ids,
        child_vocabulary: &child_vocabulary,
        config: &request.config,
    };
    let critic_violations = validate_summary(&summary, &ctx);
    if !critic_violations.is_empty() {
        debug!(count = critic_violations.len(), "critic rejected summary");
        return Err(SummaryValidationError {
            violations: critic_violations,
            raw_text,
        }
        .into());
    }

    Ok(SummaryOutcome {
        summary,
        raw_text,
        sanitize_report,
    })
}
