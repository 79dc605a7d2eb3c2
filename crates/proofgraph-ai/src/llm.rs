use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::fmt;

use proofgraph_core::Result;

/// Generation parameters forwarded to the provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Sampling temperature (0.0 to 2.0).
    pub temperature: f32,
    /// Maximum tokens to generate.
    pub max_output_tokens: usize,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: 0.1,
            max_output_tokens: 1024,
        }
    }
}

/// A message in the conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageRole::System => write!(f, "system"),
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
        }
    }
}

/// Response from the LLM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMResponse {
    pub content: String,
    pub model: String,
    pub finish_reason: Option<String>,
    pub total_tokens: Option<usize>,
}

/// Injected LLM dependency of the summary pipeline.
///
/// Implementations surface transport failures as
/// `ProofGraphError::Provider { retriable }` so callers can distinguish
/// rate-limit/timeout conditions from terminal ones. Backoff on retriable
/// failures is the provider's own concern; the pipeline only sees pass/fail.
#[async_trait]
pub trait LLMClient: Send + Sync {
    async fn generate_chat(
        &self,
        messages: &[Message],
        config: &GenerationConfig,
    ) -> Result<LLMResponse>;

    /// Streaming variant. The default adapter runs one full generation and
    /// yields it as a single delta; providers with native streaming
    /// override this.
    async fn generate_stream(
        &self,
        messages: &[Message],
        config: &GenerationConfig,
    ) -> Result<BoxStream<'static, Result<String>>> {
        let response = self.generate_chat(messages, config).await?;
        Ok(futures::stream::once(async move { Ok(response.content) }).boxed())
    }

    fn provider_name(&self) -> &str;

    fn model_name(&self) -> &str;
}
