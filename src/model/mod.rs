//! Hosted model capability.
//!
//! Every provider implements [`ModelClient`]; the generator only ever sees the
//! trait object, so nothing above this module branches on credentials.

mod anthropic;
mod gemini;
mod offline;
mod openai;
pub mod scripted;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tracing::info;

use crate::config::{Config, ConfigError, Provider};

pub use anthropic::AnthropicClient;
pub use gemini::GeminiModelClient;
pub use offline::OfflineClient;
pub use openai::OpenAiClient;
pub use scripted::ScriptedModel;

/// Backstop timeout on the HTTP clients; the generator applies its own
/// shorter per-attempt timeout on top.
const HTTP_TIMEOUT: Duration = Duration::from_secs(300);

/// User-Agent sent with every provider request
const USER_AGENT: &str = concat!("presswire/", env!("CARGO_PKG_VERSION"));

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("model call timed out after {0:?}")]
    Timeout(Duration),
    #[error("rate limited by provider: {0}")]
    RateLimited(String),
    #[error("provider returned HTTP {status}: {message}")]
    Status { status: u16, message: String },
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("provider returned an empty reply")]
    EmptyReply,
    #[error("unreadable provider response: {0}")]
    Malformed(String),
    #[error("provider error: {0}")]
    Provider(String),
}

impl ModelError {
    /// Whether repeating the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            ModelError::Timeout(_)
            | ModelError::RateLimited(_)
            | ModelError::Transport(_)
            | ModelError::EmptyReply
            | ModelError::Provider(_) => true,
            ModelError::Status { status, .. } => *status >= 500 || *status == 408,
            ModelError::Malformed(_) => false,
        }
    }

    pub(crate) fn from_status(status: reqwest::StatusCode, message: String) -> Self {
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            ModelError::RateLimited(message)
        } else {
            ModelError::Status {
                status: status.as_u16(),
                message,
            }
        }
    }
}

impl From<reqwest::Error> for ModelError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ModelError::Timeout(HTTP_TIMEOUT)
        } else if err.is_decode() {
            ModelError::Malformed(err.to_string())
        } else {
            ModelError::Transport(err.to_string())
        }
    }
}

/// What one model call is asked to do.
#[derive(Debug, Clone)]
pub struct Prompt {
    /// Persona and output rules
    pub system: String,
    /// Instruction, schema and any corrective feedback
    pub user: String,
    /// Name of the schema the reply must satisfy
    pub schema_name: String,
    /// Machine-readable schema, for providers that accept one directly
    pub response_schema: Value,
}

impl Prompt {
    /// Single-string rendering for providers without a system channel.
    pub fn flatten(&self) -> String {
        format!("{}\n\n{}", self.system, self.user)
    }
}

/// Raw reply from one model call.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelReply {
    /// Free text that still has to be parsed
    Text(String),
    /// Already structured output
    Structured(Value),
}

/// A hosted generative model.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Human-readable provider name, used in logs.
    fn name(&self) -> &str;

    async fn invoke(&self, prompt: &Prompt) -> Result<ModelReply, ModelError>;
}

pub(crate) fn http_client() -> Result<reqwest::Client, ConfigError> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(HTTP_TIMEOUT)
        .build()
        .map_err(|e| ConfigError::Invalid("http client", e.to_string()))
}

/// Build the model client selected by configuration.
pub fn from_config(config: &Config) -> Result<Arc<dyn ModelClient>, ConfigError> {
    let provider = config.provider()?;
    let agent = &config.agent;
    let model = agent.model.as_deref();
    let base_url = agent.base_url.as_deref();

    let client: Arc<dyn ModelClient> = match provider {
        Provider::OpenAi => Arc::new(OpenAiClient::openai(
            config.api_key(provider)?,
            model,
            base_url,
            agent,
        )?),
        Provider::OpenRouter => Arc::new(OpenAiClient::openrouter(
            config.api_key(provider)?,
            model,
            base_url,
            agent,
        )?),
        Provider::Anthropic => Arc::new(AnthropicClient::new(
            config.api_key(provider)?,
            model,
            base_url,
            agent,
        )?),
        Provider::Gemini => Arc::new(GeminiModelClient::new(config.api_key(provider)?, model)),
        Provider::Offline => Arc::new(OfflineClient),
    };

    info!(provider = %provider, client = client.name(), "model provider selected");
    Ok(client)
}
