pub mod openai;
pub mod types;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use openai::OpenAiProvider;
pub use types::*;

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn chat(&self, request: LlmRequest) -> Result<LlmResponse>;
}

// ============================================================
// Provider Configuration
// ============================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProviderType {
    #[default]
    OpenAI,
    /// Custom OpenAI-compatible endpoint
    Custom,
    /// Offline provider answering with a canned structured reply
    Stub,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProviderConfig {
    #[serde(rename = "type", default)]
    pub provider_type: ProviderType,
    #[serde(default)]
    pub api_key: Option<String>,
    /// Custom base URL (optional for `openai`)
    #[serde(default)]
    pub base_url: Option<String>,
    /// Client-side request timeout; none unless configured.
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
}

impl ProviderConfig {
    pub fn new(provider_type: ProviderType) -> Self {
        Self {
            provider_type,
            ..Self::default()
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref().filter(|key| !key.trim().is_empty())
    }
}

/// Create a provider from configuration.
pub fn create_provider(config: &ProviderConfig) -> Result<Arc<dyn LlmProvider>> {
    let provider: Arc<dyn LlmProvider> = match config.provider_type {
        ProviderType::OpenAI => {
            let key = config
                .api_key()
                .ok_or_else(|| anyhow!("openai requires api_key"))?;
            let base_url = config.base_url.as_deref().unwrap_or(OPENAI_BASE_URL);
            Arc::new(build_openai(config, key, base_url)?)
        }
        ProviderType::Custom => {
            let key = config
                .api_key()
                .ok_or_else(|| anyhow!("custom provider requires api_key"))?;
            let base_url = config
                .base_url
                .as_deref()
                .ok_or_else(|| anyhow!("custom provider requires base_url"))?;
            Arc::new(build_openai(config, key, base_url)?)
        }
        ProviderType::Stub => Arc::new(StubProvider),
    };
    tracing::info!("using {:?} completion provider", config.provider_type);
    Ok(provider)
}

fn build_openai(config: &ProviderConfig, key: &str, base_url: &str) -> Result<OpenAiProvider> {
    match config.request_timeout_secs {
        Some(secs) => OpenAiProvider::with_timeout(key, base_url, Duration::from_secs(secs)),
        None => Ok(OpenAiProvider::new(key, base_url)),
    }
}

/// Answers every request with a fixed two-segment structured reply that
/// mirrors the last user message. Useful for running without credentials.
pub struct StubProvider;

#[async_trait]
impl LlmProvider for StubProvider {
    async fn chat(&self, request: LlmRequest) -> Result<LlmResponse> {
        let user_text = request
            .messages
            .iter()
            .rev()
            .find(|m| m.role == "user")
            .map(|m| m.content.clone())
            .unwrap_or_default();
        let reply = serde_json::json!({
            "segments": [
                {
                    "text": format!("It sounds like you're saying: \"{user_text}\"."),
                    "strategies": ["reflection", "active_listening"]
                },
                {
                    "text": "Can you tell me more about how that feels?",
                    "strategies": ["open_ended_questions"]
                }
            ]
        });
        Ok(LlmResponse {
            text: Some(reply.to_string()),
            input_tokens: None,
            output_tokens: None,
            stop_reason: Some("end_turn".into()),
        })
    }
}
