//! Anthropic Messages API provider.
//!
//! Retries with exponential backoff on retriable failures only
//! (408/429/5xx, connect/timeout); authentication and other client errors
//! abort immediately. The pipeline never sees the backoff, only the final
//! pass/fail with its retriable classification.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::warn;

use proofgraph_core::{ProofGraphError, Result};

use crate::llm::{GenerationConfig, LLMClient, LLMResponse, Message, MessageRole};

const ANTHROPIC_API_BASE: &str = "https://api.anthropic.com/v1";
const API_VERSION: &str = "2023-06-01";
const DEFAULT_MODEL: &str = "claude-3-5-sonnet-20241022";

#[derive(Debug, Clone)]
pub struct AnthropicConfig {
    pub api_key: String,
    pub model: String,
    pub api_base: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

impl Default for AnthropicConfig {
    fn default() -> Self {
        Self {
            api_key: std::env::var("ANTHROPIC_API_KEY").unwrap_or_default(),
            model: DEFAULT_MODEL.to_string(),
            api_base: ANTHROPIC_API_BASE.to_string(),
            timeout_secs: 120,
            max_retries: 3,
        }
    }
}

pub struct AnthropicProvider {
    config: AnthropicConfig,
    client: Client,
}

impl AnthropicProvider {
    pub fn new(config: AnthropicConfig) -> Result<Self> {
        if config.api_key.is_empty() {
            return Err(ProofGraphError::InvalidInput(
                "Anthropic API key is required; set ANTHROPIC_API_KEY".to_string(),
            ));
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ProofGraphError::Provider {
                message: format!("failed to create HTTP client: {}", e),
                retriable: false,
            })?;
        Ok(Self { config, client })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(AnthropicConfig::default())
    }

    async fn try_request(
        &self,
        messages: &[Message],
        generation: &GenerationConfig,
    ) -> Result<AnthropicResponse> {
        let request = AnthropicRequest {
            model: self.config.model.clone(),
            max_tokens: generation.max_output_tokens,
            temperature: generation.temperature,
            system: messages
                .iter()
                .filter(|m| m.role == MessageRole::System)
                .map(|m| m.content.clone())
                .collect::<Vec<_>>()
                .join("\n"),
            messages: messages
                .iter()
                .filter(|m| m.role != MessageRole::System)
                .map(|m| AnthropicMessage {
                    role: m.role.to_string(),
                    content: m.content.clone(),
                })
                .collect(),
        };

        let response = self
            .client
            .post(format!("{}/messages", self.config.api_base))
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&request)
            .send()
            .await
            .map_err(|e| ProofGraphError::Provider {
                message: format!("transport failure: {}", e),
                retriable: e.is_timeout() || e.is_connect(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProofGraphError::Provider {
                message: format!("Anthropic API returned {}: {}", status, body),
                retriable: is_retriable_status(status),
            });
        }

        response
            .json::<AnthropicResponse>()
            .await
            .map_err(|e| ProofGraphError::Provider {
                message: format!("malformed API response: {}", e),
                retriable: false,
            })
    }
}

fn is_retriable_status(status: StatusCode) -> bool {
    status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
}

#[async_trait]
impl LLMClient for AnthropicProvider {
    async fn generate_chat(
        &self,
        messages: &[Message],
        generation: &GenerationConfig,
    ) -> Result<LLMResponse> {
        let mut last_error = None;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s
                tokio::time::sleep(Duration::from_secs(1 << (attempt - 1))).await;
            }
            match self.try_request(messages, generation).await {
                Ok(response) => {
                    let content = response
                        .content
                        .iter()
                        .filter(|block| block.kind == "text")
                        .map(|block| block.text.as_str())
                        .collect::<Vec<_>>()
                        .join("");
                    let total_tokens = response
                        .usage
                        .as_ref()
                        .map(|u| u.input_tokens + u.output_tokens);
                    return Ok(LLMResponse {
                        content,
                        model: response.model,
                        finish_reason: response.stop_reason,
                        total_tokens,
                    });
                }
                Err(err) => {
                    let retriable = matches!(
                        err,
                        ProofGraphError::Provider { retriable: true, .. }
                    );
                    if retriable && attempt < self.config.max_retries {
                        warn!(
                            attempt = attempt + 1,
                            max = self.config.max_retries + 1,
                            "retriable Anthropic failure, backing off"
                        );
                        last_error = Some(err);
                        continue;
                    }
                    return Err(err);
                }
            }
        }

        Err(last_error.unwrap_or(ProofGraphError::Provider {
            message: "all retry attempts failed".to_string(),
            retriable: false,
        }))
    }

    fn provider_name(&self) -> &str {
        "anthropic"
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: usize,
    temperature: f32,
    system: String,
    messages: Vec<AnthropicMessage>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    model: String,
    content: Vec<ContentBlock>,
    stop_reason: Option<String>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct Usage {
    input_tokens: usize,
    output_tokens: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_api_key_is_invalid_input() {
        let config = AnthropicConfig {
            api_key: String::new(),
            ..Default::default()
        };
        assert!(matches!(
            AnthropicProvider::new(config),
            Err(ProofGraphError::InvalidInput(_))
        ));
    }

    #[test]
    fn status_classification() {
        assert!(is_retriable_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_retriable_status(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(is_retriable_status(StatusCode::SERVICE_UNAVAILABLE));
        assert!(!is_retriable_status(StatusCode::UNAUTHORIZED));
        assert!(!is_retriable_status(StatusCode::FORBIDDEN));
        assert!(!is_retriable_status(StatusCode::BAD_REQUEST));
    }
}
