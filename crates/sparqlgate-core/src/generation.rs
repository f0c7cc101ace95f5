//! The generation capability seam and an OpenAI-compatible client
//!
//! The gateway treats generation as opaque: an ordered conversation and a
//! few sampling parameters go in, free text comes out.

use crate::error::GenerationError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Speaker of a conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Instruction context
    System,
    /// Caller text
    User,
    /// Model reply
    Assistant,
}

/// One conversation turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Speaker
    pub role: Role,
    /// Text
    pub content: String,
}

impl Message {
    /// System turn
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    /// User turn
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Assistant turn
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// One call to the generation capability
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// Ordered conversation
    pub messages: Vec<Message>,
    /// Model name
    pub model: String,
    /// Sampling temperature
    pub temperature: f32,
    /// Output length cap in tokens
    pub max_output_tokens: u32,
}

/// Opaque text generator
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GenerationCapability: Send + Sync {
    /// Produce free text for the conversation
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError>;
}

/// Settings for the generation capability
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Bearer credential; generation is unavailable without it
    pub api_key: Option<String>,
    /// API root, e.g. `https://api.openai.com/v1`
    pub base_url: String,
    /// Model name
    pub model: String,
    /// Sampling temperature
    pub temperature: f32,
    /// Output length cap in tokens
    pub max_output_tokens: u32,
    /// Per-request timeout
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            temperature: 0.1,
            max_output_tokens: 800,
            timeout_secs: 60,
        }
    }
}

/// Client for any `/chat/completions` compatible endpoint
#[derive(Debug, Clone)]
pub struct OpenAiGenerator {
    client: Client,
    config: LlmConfig,
}

impl OpenAiGenerator {
    /// Build a client
    ///
    /// # Errors
    ///
    /// Returns [`GenerationError::Client`] when the HTTP client cannot be
    /// built.
    pub fn new(config: LlmConfig) -> Result<Self, GenerationError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| GenerationError::Client(e.to_string()))?;
        Ok(Self { client, config })
    }

    fn url(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl GenerationCapability for OpenAiGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or(GenerationError::NotConfigured)?;

        let body = serde_json::json!({
            "model": request.model,
            "messages": request.messages,
            "temperature": request.temperature,
            "max_tokens": request.max_output_tokens,
        });

        let response = self
            .client
            .post(self.url())
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| GenerationError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let data: serde_json::Value = response
            .json()
            .await
            .map_err(|e| GenerationError::InvalidResponse(e.to_string()))?;
        let content = data["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or_default()
            .to_string();
        debug!(model = %request.model, chars = content.len(), "generation reply");
        Ok(content)
    }
}
