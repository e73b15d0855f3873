use crate::api::{AiProvider, ApiError, Message};
use crate::constants::{AI_TEMPERATURE, AI_TOP_P};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde_json::json;

/// Any backend exposing an OpenAI-style `/chat/completions` endpoint
/// (OpenAI, Gemini's compatibility layer, DeepSeek, ...).
pub struct OpenAiCompatibleProvider {
    client: Client,
    pub name: String,
    pub model: String,
    pub base_url: String,
    api_key: Option<String>,
}

impl OpenAiCompatibleProvider {
    pub fn new(
        name: String,
        model: String,
        base_url: String,
        api_key: Option<String>,
    ) -> Result<Self, ApiError> {
        let client = Client::builder().build()?;
        Ok(Self {
            client,
            name,
            model,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }
}

#[derive(Deserialize)]
struct ChatCompletion {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

/// Pulls the provider's own message out of an error body when it has one.
fn error_detail(body: String) -> String {
    serde_json::from_str::<ErrorEnvelope>(&body)
        .map(|e| e.error.message)
        .unwrap_or(body)
}

fn first_choice(body: &str) -> Result<String, ApiError> {
    let completion: ChatCompletion = serde_json::from_str(body)
        .map_err(|e| ApiError::Decode(format!("Failed to parse completion: {}", e)))?;
    completion
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or_else(|| ApiError::Decode("completion contained no choices".to_string()))
}

#[async_trait]
impl AiProvider for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, messages: Vec<Message>) -> Result<String, ApiError> {
        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .authorized(self.client.post(url))
            .json(&json!({
                "model": self.model,
                "messages": messages,
                "stream": false,
                "temperature": AI_TEMPERATURE,
                "top_p": AI_TOP_P
            }))
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(ApiError::Response(format!(
                "{} error ({}): {}",
                self.name,
                status,
                error_detail(body)
            )));
        }
        first_choice(&body)
    }
}
