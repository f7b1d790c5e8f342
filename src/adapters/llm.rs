use crate::error::CompletionError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub model_name: String,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub temperature: f32,
    pub max_tokens: usize,
    pub timeout_secs: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model_name: "gpt-4o-mini".to_string(),
            api_key: None,
            base_url: None,
            temperature: 0.0,
            max_tokens: 4000,
            timeout_secs: 120,
        }
    }
}

impl ModelConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMRequest {
    pub system_prompt: Option<String>,
    pub user_prompt: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMResponse {
    pub content: String,
    pub model: String,
    pub usage: Option<Usage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
    pub total_tokens: usize,
}

/// The text-completion collaborator.
#[async_trait]
pub trait LLMAdapter: Send + Sync {
    async fn complete(&self, request: LLMRequest) -> Result<LLMResponse, CompletionError>;
    fn model_name(&self) -> &str;
}

pub fn create_adapter(config: &ModelConfig) -> Result<Box<dyn LLMAdapter>, CompletionError> {
    match config.model_name.as_str() {
        name if name.starts_with("claude") => {
            Ok(Box::new(crate::adapters::AnthropicAdapter::new(config.clone())?))
        }
        name if name.starts_with("gpt-") || name.starts_with("o1-") => {
            Ok(Box::new(crate::adapters::OpenAIAdapter::new(config.clone())?))
        }
        name if name.starts_with("ollama:") => {
            Ok(Box::new(crate::adapters::OllamaAdapter::new(config.clone())?))
        }
        _ if config.base_url.as_ref().map_or(false, |u| u.contains("11434")) => {
            Ok(Box::new(crate::adapters::OllamaAdapter::new(config.clone())?))
        }
        // Unknown models go to OpenAI-compatible endpoints
        _ => Ok(Box::new(crate::adapters::OpenAIAdapter::new(config.clone())?)),
    }
}

pub(crate) fn build_http_client(timeout: Duration) -> Result<reqwest::Client, CompletionError> {
    Ok(reqwest::Client::builder().timeout(timeout).build()?)
}

pub(crate) fn transport_error(err: reqwest::Error, timeout: Duration) -> CompletionError {
    if err.is_timeout() {
        CompletionError::Timeout(timeout)
    } else {
        CompletionError::Transport(err)
    }
}

/// Turns a non-success response into `CompletionError::Status`.
pub(crate) async fn ensure_success(
    provider: &'static str,
    response: reqwest::Response,
) -> Result<reqwest::Response, CompletionError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(CompletionError::Status {
        provider,
        status: status.as_u16(),
        body,
    })
}
