use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{http_client, ModelClient, ModelError, ModelReply, Prompt};
use crate::config::{AgentConfig, ConfigError};

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";
const OPENAI_DEFAULT_MODEL: &str = "gpt-4o-mini";
const OPENROUTER_DEFAULT_MODEL: &str = "openai/gpt-4o-mini";

/// Client for OpenAI-compatible chat completion endpoints.
///
/// Used for OpenAI itself and for OpenRouter, which exposes the same wire
/// format in front of many models.
pub struct OpenAiClient {
    client: reqwest::Client,
    label: &'static str,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    response_format: ResponseFormat,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReplyMessage,
}

#[derive(Deserialize)]
struct ChatReplyMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: Option<ErrorBody>,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

impl OpenAiClient {
    pub fn openai(
        api_key: &str,
        model: Option<&str>,
        base_url: Option<&str>,
        agent: &AgentConfig,
    ) -> Result<Self, ConfigError> {
        Self::build(
            "OpenAI",
            api_key,
            model.unwrap_or(OPENAI_DEFAULT_MODEL),
            base_url.unwrap_or(OPENAI_BASE_URL),
            agent,
        )
    }

    pub fn openrouter(
        api_key: &str,
        model: Option<&str>,
        base_url: Option<&str>,
        agent: &AgentConfig,
    ) -> Result<Self, ConfigError> {
        Self::build(
            "OpenRouter",
            api_key,
            model.unwrap_or(OPENROUTER_DEFAULT_MODEL),
            base_url.unwrap_or(OPENROUTER_BASE_URL),
            agent,
        )
    }

    fn build(
        label: &'static str,
        api_key: &str,
        model: &str,
        base_url: &str,
        agent: &AgentConfig,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            client: http_client()?,
            label,
            api_key: api_key.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            max_tokens: agent.max_tokens,
            temperature: agent.temperature,
        })
    }
}

#[async_trait]
impl ModelClient for OpenAiClient {
    fn name(&self) -> &str {
        self.label
    }

    async fn invoke(&self, prompt: &Prompt) -> Result<ModelReply, ModelError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: &prompt.system,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt.user,
                },
            ],
            response_format: ResponseFormat {
                kind: "json_object",
            },
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        debug!(
            provider = self.label,
            model = %self.model,
            prompt_len = prompt.user.len(),
            "invoking chat completions"
        );

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let error_text = resp.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorResponse>(&error_text)
                .ok()
                .and_then(|e| e.error)
                .map(|e| e.message)
                .unwrap_or(error_text);
            warn!(provider = self.label, status = %status, error = %message, "chat completions error");
            return Err(ModelError::from_status(status, message));
        }

        let chat: ChatResponse = resp
            .json()
            .await
            .map_err(|e| ModelError::Malformed(e.to_string()))?;

        let text = chat
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(ModelError::EmptyReply);
        }
        Ok(ModelReply::Text(text))
    }
}
