pub mod anthropic;
pub mod critic;
pub mod extract;
pub mod llm;
pub mod pipeline;
pub mod prompt;
pub mod sanitize;

pub use anthropic::{AnthropicConfig, AnthropicProvider};
pub use llm::*;
pub use pipeline::{generate_parent_summary, SummaryOutcome, SummaryRequest};
