use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{http_client, ModelClient, ModelError, ModelReply, Prompt};
use crate::config::{AgentConfig, ConfigError};

const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";
const ANTHROPIC_DEFAULT_MODEL: &str = "claude-3-5-haiku-latest";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Client for the Anthropic Messages API.
pub struct AnthropicClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    system: &'a str,
    messages: [Message<'a>; 1],
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

impl AnthropicClient {
    pub fn new(
        api_key: &str,
        model: Option<&str>,
        base_url: Option<&str>,
        agent: &AgentConfig,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            client: http_client()?,
            api_key: api_key.to_string(),
            base_url: base_url
                .unwrap_or(ANTHROPIC_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            model: model.unwrap_or(ANTHROPIC_DEFAULT_MODEL).to_string(),
            max_tokens: agent.max_tokens,
            temperature: agent.temperature,
        })
    }
}

#[async_trait]
impl ModelClient for AnthropicClient {
    fn name(&self) -> &str {
        "Anthropic"
    }

    async fn invoke(&self, prompt: &Prompt) -> Result<ModelReply, ModelError> {
        let url = format!("{}/v1/messages", self.base_url);
        let body = MessagesRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            system: &prompt.system,
            messages: [Message {
                role: "user",
                content: &prompt.user,
            }],
        };

        debug!(model = %self.model, prompt_len = prompt.user.len(), "invoking Anthropic messages");

        let resp = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let error_text = resp.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorResponse>(&error_text)
                .map(|e| e.error.message)
                .unwrap_or(error_text);
            warn!(status = %status, error = %message, "Anthropic API error");
            return Err(ModelError::from_status(status, message));
        }

        let reply: MessagesResponse = resp
            .json()
            .await
            .map_err(|e| ModelError::Malformed(e.to_string()))?;

        let text: String = reply
            .content
            .into_iter()
            .filter(|block| block.kind == "text")
            .map(|block| block.text)
            .collect();

        if text.trim().is_empty() {
            return Err(ModelError::EmptyReply);
        }
        Ok(ModelReply::Text(text))
    }
}
