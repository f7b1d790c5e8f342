use crate::adapters::llm::ModelConfig;
use crate::core::budget::DEFAULT_TOKEN_LIMIT;
use crate::core::prompt::PromptTemplate;
use crate::core::reviewer::DEFAULT_MAX_CONCURRENCY;
use crate::platforms::PlatformConfig;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const CONFIG_NAMES: [&str; 2] = [".prreview.yml", ".prreview.yaml"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,

    pub api_key: Option<String>,
    pub base_url: Option<String>,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_token_limit")]
    pub token_limit: usize,

    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// File holding a custom review prompt with `{patches}` and `{filename}`.
    pub prompt_template: Option<PathBuf>,

    #[serde(default)]
    pub platforms: PlatformConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model: default_model(),
            max_tokens: default_max_tokens(),
            api_key: None,
            base_url: None,
            timeout_secs: default_timeout_secs(),
            token_limit: default_token_limit(),
            max_concurrency: default_max_concurrency(),
            prompt_template: None,
            platforms: PlatformConfig::default(),
        }
    }
}

impl Config {
    /// Looks for `.prreview.yml`/`.prreview.yaml` in the working directory,
    /// then `~/.prreview.yml`, and falls back to defaults.
    pub fn load() -> Result<Self> {
        for name in CONFIG_NAMES {
            let path = PathBuf::from(name);
            if path.exists() {
                return Self::load_from_path(&path);
            }
        }

        if let Some(home_dir) = dirs::home_dir() {
            let home_config = home_dir.join(CONFIG_NAMES[0]);
            if home_config.exists() {
                return Self::load_from_path(&home_config);
            }
        }

        Ok(Config::default())
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Invalid config {}", path.display()))?;
        tracing::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn merge_with_cli(
        &mut self,
        cli_model: Option<String>,
        cli_token_limit: Option<usize>,
        cli_concurrency: Option<usize>,
    ) {
        if let Some(model) = cli_model {
            self.model = model;
        }
        if let Some(limit) = cli_token_limit {
            self.token_limit = limit;
        }
        if let Some(concurrency) = cli_concurrency {
            self.max_concurrency = concurrency;
        }
    }

    /// Sampling temperature is not configurable; reviews always run at 0.
    pub fn model_config(&self) -> ModelConfig {
        ModelConfig {
            model_name: self.model.clone(),
            api_key: self.api_key.clone(),
            base_url: self.base_url.clone(),
            temperature: 0.0,
            max_tokens: self.max_tokens,
            timeout_secs: self.timeout_secs,
        }
    }

    pub fn prompt_template(&self) -> Result<PromptTemplate> {
        match &self.prompt_template {
            Some(path) => PromptTemplate::from_file(path),
            None => Ok(PromptTemplate::default()),
        }
    }
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_max_tokens() -> usize {
    4000
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_token_limit() -> usize {
    DEFAULT_TOKEN_LIMIT
}

fn default_max_concurrency() -> usize {
    DEFAULT_MAX_CONCURRENCY
}
