use crate::adapters::llm::{
    build_http_client, ensure_success, transport_error, LLMAdapter, LLMRequest, LLMResponse,
    ModelConfig, Usage,
};
use crate::error::CompletionError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

pub struct OllamaAdapter {
    client: Client,
    config: ModelConfig,
    base_url: String,
}

#[derive(Serialize)]
struct OllamaRequest {
    model: String,
    prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    options: OllamaOptions,
    stream: bool,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: usize,
}

#[derive(Deserialize)]
struct OllamaResponse {
    response: String,
    model: String,
    #[serde(default)]
    done: bool,
    prompt_eval_count: Option<usize>,
    eval_count: Option<usize>,
}

impl OllamaAdapter {
    pub fn new(config: ModelConfig) -> Result<Self, CompletionError> {
        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| "http://localhost:11434".to_string());

        let client = build_http_client(config.timeout())?;

        Ok(Self {
            client,
            config,
            base_url,
        })
    }
}

#[async_trait]
impl LLMAdapter for OllamaAdapter {
    async fn complete(&self, request: LLMRequest) -> Result<LLMResponse, CompletionError> {
        let model_name = self
            .config
            .model_name
            .strip_prefix("ollama:")
            .unwrap_or(&self.config.model_name);

        let ollama_request = OllamaRequest {
            model: model_name.to_string(),
            prompt: request.user_prompt,
            system: request.system_prompt,
            options: OllamaOptions {
                temperature: request.temperature.unwrap_or(self.config.temperature),
                num_predict: request.max_tokens.unwrap_or(self.config.max_tokens),
            },
            stream: false,
        };

        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&ollama_request)
            .send()
            .await
            .map_err(|err| transport_error(err, self.config.timeout()))?;
        let response = ensure_success("Ollama", response).await?;

        let ollama_response: OllamaResponse = response
            .json()
            .await
            .map_err(|err| CompletionError::InvalidResponse(err.to_string()))?;

        let usage = ollama_response.done.then(|| {
            let prompt_tokens = ollama_response.prompt_eval_count.unwrap_or(0);
            let completion_tokens = ollama_response.eval_count.unwrap_or(0);
            Usage {
                prompt_tokens,
                completion_tokens,
                total_tokens: prompt_tokens + completion_tokens,
            }
        });

        Ok(LLMResponse {
            content: ollama_response.response,
            model: ollama_response.model,
            usage,
        })
    }

    fn model_name(&self) -> &str {
        &self.config.model_name
    }
}
