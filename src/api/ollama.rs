use crate::api::{AiProvider, ApiError, Message};
use crate::constants::{AI_TEMPERATURE, AI_TOP_P};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

/// Local Ollama daemon speaking `/api/chat`.
pub struct OllamaProvider {
    client: Client,
    pub model: String,
    pub base_url: String,
}

impl OllamaProvider {
    /// The request deadline is owned by the gateway, so the client has none.
    pub fn new(model: String, base_url: String) -> Result<Self, ApiError> {
        let client = Client::builder().build()?;
        Ok(Self {
            client,
            model,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[derive(Deserialize)]
struct OllamaChatResponse {
    message: Message,
}

#[derive(Deserialize)]
struct OllamaError {
    error: String,
}

#[async_trait]
impl AiProvider for OllamaProvider {
    fn name(&self) -> &str {
        "Ollama"
    }

    async fn complete(&self, messages: Vec<Message>) -> Result<String, ApiError> {
        let url = format!("{}/api/chat", self.base_url);
        let response = self
            .client
            .post(url)
            .json(&json!({
                "model": self.model,
                "messages": messages,
                "stream": false,
                "options": {
                    "temperature": AI_TEMPERATURE,
                    "top_p": AI_TOP_P
                }
            }))
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            let detail = serde_json::from_str::<OllamaError>(&body)
                .map(|e| e.error)
                .unwrap_or(body);
            return Err(ApiError::Response(format!(
                "Ollama chat error ({}): {}",
                status, detail
            )));
        }

        let chat: OllamaChatResponse = serde_json::from_str(&body)
            .map_err(|e| ApiError::Decode(format!("Failed to parse Ollama reply: {}", e)))?;
        Ok(chat.message.content)
    }
}
