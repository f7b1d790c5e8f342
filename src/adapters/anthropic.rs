use crate::adapters::llm::{
    build_http_client, ensure_success, transport_error, LLMAdapter, LLMRequest, LLMResponse,
    ModelConfig, Usage,
};
use crate::error::CompletionError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

pub struct AnthropicAdapter {
    client: Client,
    config: ModelConfig,
    api_key: String,
    base_url: String,
}

#[derive(Serialize)]
struct AnthropicRequest {
    model: String,
    messages: Vec<Message>,
    max_tokens: usize,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<Content>,
    model: String,
    usage: AnthropicUsage,
}

#[derive(Deserialize)]
struct Content {
    #[serde(default)]
    text: String,
    #[serde(rename = "type")]
    content_type: String,
}

#[derive(Deserialize)]
struct AnthropicUsage {
    input_tokens: usize,
    output_tokens: usize,
}

impl AnthropicAdapter {
    pub fn new(config: ModelConfig) -> Result<Self, CompletionError> {
        let api_key = config
            .api_key
            .clone()
            .or_else(|| std::env::var("ANTHROPIC_API_KEY").ok())
            .ok_or(CompletionError::MissingCredentials {
                provider: "Anthropic",
                env_var: "ANTHROPIC_API_KEY",
            })?;

        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| "https://api.anthropic.com/v1".to_string());

        let client = build_http_client(config.timeout())?;

        Ok(Self {
            client,
            config,
            api_key,
            base_url,
        })
    }
}

#[async_trait]
impl LLMAdapter for AnthropicAdapter {
    async fn complete(&self, request: LLMRequest) -> Result<LLMResponse, CompletionError> {
        let anthropic_request = AnthropicRequest {
            model: self.config.model_name.clone(),
            messages: vec![Message {
                role: "user".to_string(),
                content: request.user_prompt,
            }],
            max_tokens: request.max_tokens.unwrap_or(self.config.max_tokens),
            temperature: request.temperature.unwrap_or(self.config.temperature),
            system: request.system_prompt,
        };

        let response = self
            .client
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&anthropic_request)
            .send()
            .await
            .map_err(|err| transport_error(err, self.config.timeout()))?;
        let response = ensure_success("Anthropic", response).await?;

        let anthropic_response: AnthropicResponse = response
            .json()
            .await
            .map_err(|err| CompletionError::InvalidResponse(err.to_string()))?;

        // Only text blocks carry review output
        let content = anthropic_response
            .content
            .iter()
            .filter(|c| c.content_type == "text")
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");

        Ok(LLMResponse {
            content,
            model: anthropic_response.model,
            usage: Some(Usage {
                prompt_tokens: anthropic_response.usage.input_tokens,
                completion_tokens: anthropic_response.usage.output_tokens,
                total_tokens: anthropic_response.usage.input_tokens
                    + anthropic_response.usage.output_tokens,
            }),
        })
    }

    fn model_name(&self) -> &str {
        &self.config.model_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn complete_joins_text_blocks() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/messages")
            .match_header("x-api-key", "anthropic-test")
            .with_status(200)
            .with_body(
                r#"{"model":"claude-3-5-haiku","content":[{"type":"text","text":"12-14:"},{"type":"text","text":"Missing bounds check."}],"usage":{"input_tokens":7,"output_tokens":3}}"#,
            )
            .create_async()
            .await;

        let adapter = AnthropicAdapter::new(ModelConfig {
            model_name: "claude-3-5-haiku".to_string(),
            api_key: Some("anthropic-test".to_string()),
            base_url: Some(server.url()),
            ..ModelConfig::default()
        })
        .unwrap();

        let response = adapter
            .complete(LLMRequest {
                system_prompt: None,
                user_prompt: "review".to_string(),
                temperature: Some(0.0),
                max_tokens: None,
            })
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(response.content, "12-14:\nMissing bounds check.");
        assert_eq!(response.usage.map(|u| u.total_tokens), Some(10));
    }
}
