use thiserror::Error;

use crate::types::CriticViolation;

#[derive(Error, Debug)]
pub enum ProofGraphError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Summary validation failed: {0}")]
    SummaryValidation(Box<SummaryValidationError>),

    #[error("Tree policy violation: {0}")]
    TreePolicy(Box<TreePolicyError>),

    #[error("Provider error (retriable: {retriable}): {message}")]
    Provider { message: String, retriable: bool },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal invariant violated: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, ProofGraphError>;

/// A generated summary was rejected by the critic or security screening.
///
/// Carries every violation found plus the raw model output so operators can
/// audit exactly what the model said and why it was refused.
#[derive(Error, Debug, Clone)]
#[error("summary rejected with {} violation(s): {}", violations.len(), summarize_violations(violations))]
pub struct SummaryValidationError {
    pub violations: Vec<CriticViolation>,
    pub raw_text: String,
}

/// A group could not be made policy-compliant within the retry budget.
/// Fatal to the whole tree build.
#[derive(Error, Debug, Clone)]
#[error("group {parent_id} [{}] rejected after {attempts} attempt(s): {}", child_ids.join(", "), summarize_violations(final_violations))]
pub struct TreePolicyError {
    pub parent_id: String,
    pub child_ids: Vec<String>,
    pub attempts: u32,
    pub first_attempt_violations: Vec<CriticViolation>,
    pub final_violations: Vec<CriticViolation>,
    pub raw_text: String,
}

fn summarize_violations(violations: &[CriticViolation]) -> String {
    violations
        .iter()
        .map(|v| v.kind.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl From<SummaryValidationError> for ProofGraphError {
    fn from(err: SummaryValidationError) -> Self {
        ProofGraphError::SummaryValidation(Box::new(err))
    }
}

impl From<TreePolicyError> for ProofGraphError {
    fn from(err: TreePolicyError) -> Self {
        ProofGraphError::TreePolicy(Box::new(err))
    }
}
