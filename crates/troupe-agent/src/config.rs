//! Model configuration.

use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};

/// Which chat-completions dialect the backend speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelProvider {
    /// OpenAI chat completions API.
    OpenAi,
    /// OpenRouter — OpenAI-compatible aggregator.
    OpenRouter,
    /// Groq cloud inference — OpenAI-compatible API.
    Groq,
}

/// Configuration passed opaquely to the model collaborator.
///
/// The engine never inspects this beyond handing it to the backend; it is
/// the `model_parameters` blob of an agent's configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Provider dialect.
    pub provider: ModelProvider,
    /// Model identifier, e.g. `gpt-4o-mini`.
    pub model_id: String,
    /// API key. Load from the environment, not from source.
    pub api_key: String,
    /// Override for the provider's base URL (used by tests and proxies).
    #[serde(default)]
    pub api_base_url: Option<String>,
    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Completion token cap per invocation.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Retry policy for transient failures. `None` uses the default policy.
    #[serde(default)]
    pub retry_policy: Option<RetryPolicy>,
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    4096
}

impl ModelConfig {
    /// The effective base URL for this provider.
    pub fn base_url(&self) -> &str {
        if let Some(url) = &self.api_base_url {
            url
        } else {
            match self.provider {
                ModelProvider::OpenAi => "https://api.openai.com",
                ModelProvider::OpenRouter => "https://openrouter.ai/api",
                ModelProvider::Groq => "https://api.groq.com/openai",
            }
        }
    }
}
