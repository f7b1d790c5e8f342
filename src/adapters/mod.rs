pub mod anthropic;
pub mod llm;
pub mod ollama;
pub mod openai;

pub use anthropic::AnthropicAdapter;
pub use llm::{create_adapter, LLMAdapter, LLMRequest, LLMResponse, ModelConfig};
pub use ollama::OllamaAdapter;
pub use openai::OpenAIAdapter;
