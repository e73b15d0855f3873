use crate::config::{ProviderConfig, KIND_OLLAMA, KIND_OPENAI};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub mod gateway;
pub mod ollama;
pub mod openai_compat;
pub mod prompts;

use crate::api::ollama::OllamaProvider;
use crate::api::openai_compat::OpenAiCompatibleProvider;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }
}

/// Every way a generative request can end other than with text.
#[derive(Error, Debug)]
pub enum ApiError {
    /// A required setting is missing; nothing was sent.
    #[error("Configuration error: {0}")]
    Config(String),
    /// The backend integration is not available or not reachable.
    #[error("Backend unavailable: {0}")]
    DependencyUnavailable(String),
    #[error("Request timed out after {}s", .0.as_secs_f64())]
    Timeout(Duration),
    #[error("HTTP client error: {0}")]
    HttpClient(#[source] reqwest::Error),
    #[error("API response error: {0}")]
    Response(String),
    #[error("Malformed response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_connect() {
            ApiError::DependencyUnavailable(e.to_string())
        } else {
            ApiError::HttpClient(e)
        }
    }
}

#[async_trait]
pub trait AiProvider: Send + Sync {
    fn name(&self) -> &str;
    /// Sends one conversation and returns the assistant's reply. Single attempt.
    async fn complete(&self, messages: Vec<Message>) -> Result<String, ApiError>;
}

/// Builds the backend for a provider entry.
pub fn create_provider(config: &ProviderConfig) -> Result<Arc<dyn AiProvider>, ApiError> {
    match config.kind.as_str() {
        KIND_OLLAMA => Ok(Arc::new(OllamaProvider::new(
            config.active_model.clone(),
            config.base_url.clone(),
        )?)),
        KIND_OPENAI => Ok(Arc::new(OpenAiCompatibleProvider::new(
            config.name.clone(),
            config.active_model.clone(),
            config.base_url.clone(),
            config.resolved_api_key(),
        )?)),
        other => Err(ApiError::DependencyUnavailable(format!(
            "no backend integration for provider kind {:?}",
            other
        ))),
    }
}
