use crate::adapters::llm::{
    build_http_client, ensure_success, transport_error, LLMAdapter, LLMRequest, LLMResponse,
    ModelConfig, Usage,
};
use crate::error::CompletionError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

pub struct OpenAIAdapter {
    client: Client,
    config: ModelConfig,
    api_key: String,
    base_url: String,
}

#[derive(Serialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<Message>,
    temperature: f32,
    max_tokens: usize,
}

#[derive(Serialize, Deserialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct OpenAIResponse {
    choices: Vec<Choice>,
    usage: Option<OpenAIUsage>,
    model: String,
}

#[derive(Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Deserialize)]
struct OpenAIUsage {
    prompt_tokens: usize,
    completion_tokens: usize,
    total_tokens: usize,
}

impl OpenAIAdapter {
    pub fn new(config: ModelConfig) -> Result<Self, CompletionError> {
        let api_key = config
            .api_key
            .clone()
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .ok_or(CompletionError::MissingCredentials {
                provider: "OpenAI",
                env_var: "OPENAI_API_KEY",
            })?;

        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| "https://api.openai.com/v1".to_string());

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
impl LLMAdapter for OpenAIAdapter {
    async fn complete(&self, request: LLMRequest) -> Result<LLMResponse, CompletionError> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system_prompt) = request.system_prompt {
            messages.push(Message {
                role: "system".to_string(),
                content: system_prompt,
            });
        }
        messages.push(Message {
            role: "user".to_string(),
            content: request.user_prompt,
        });

        let openai_request = OpenAIRequest {
            model: self.config.model_name.clone(),
            messages,
            temperature: request.temperature.unwrap_or(self.config.temperature),
            max_tokens: request.max_tokens.unwrap_or(self.config.max_tokens),
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&openai_request)
            .send()
            .await
            .map_err(|err| transport_error(err, self.config.timeout()))?;
        let response = ensure_success("OpenAI", response).await?;

        let openai_response: OpenAIResponse = response
            .json()
            .await
            .map_err(|err| CompletionError::InvalidResponse(err.to_string()))?;

        let content = openai_response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| CompletionError::InvalidResponse("response has no choices".into()))?;

        Ok(LLMResponse {
            content,
            model: openai_response.model,
            usage: openai_response.usage.map(|usage| Usage {
                prompt_tokens: usage.prompt_tokens,
                completion_tokens: usage.completion_tokens,
                total_tokens: usage.total_tokens,
            }),
        })
    }

    fn model_name(&self) -> &str {
        &self.config.model_name
    }
}
