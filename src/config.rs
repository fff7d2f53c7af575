//! Configuration loading and management for presswire.
//!
//! Loads settings from `presswire.toml` with environment variable overrides for
//! sensitive data. The resulting [`Config`] is built once in `main` and handed
//! to every component that needs it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("missing required API key for provider: {0}")]
    MissingApiKey(String),
    #[error("unknown model provider: {0}")]
    UnknownProvider(String),
    #[error("no model provider configured: set one of OPENAI_API_KEY, OPENROUTER_API_KEY, ANTHROPIC_API_KEY, GEMINI_API_KEY or use provider = \"offline\"")]
    NoProvider,
    #[error("invalid setting `{0}`: {1}")]
    Invalid(&'static str, String),
}

/// Hosted model providers the service can talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    OpenAi,
    OpenRouter,
    Anthropic,
    Gemini,
    /// Synthesizes schema-conformant replies locally; no network.
    Offline,
}

impl Provider {
    /// Key-based selection order used when `provider = "auto"`.
    const AUTO_ORDER: [Provider; 4] = [
        Provider::OpenAi,
        Provider::OpenRouter,
        Provider::Anthropic,
        Provider::Gemini,
    ];

    fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "openai" => Some(Provider::OpenAi),
            "openrouter" => Some(Provider::OpenRouter),
            "anthropic" => Some(Provider::Anthropic),
            "gemini" => Some(Provider::Gemini),
            "offline" => Some(Provider::Offline),
            _ => None,
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Provider::OpenAi => "openai",
            Provider::OpenRouter => "openrouter",
            Provider::Anthropic => "anthropic",
            Provider::Gemini => "gemini",
            Provider::Offline => "offline",
        };
        f.write_str(name)
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Socket address to listen on
    pub bind: String,
}

/// LLM provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// "auto", "openai", "openrouter", "anthropic", "gemini" or "offline"
    pub provider: String,
    /// Model identifier; each provider has its own default
    pub model: Option<String>,
    /// Override of the provider's API base URL
    pub base_url: Option<String>,
    /// System persona prepended to every prompt
    pub persona: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// Retry and timeout bounds for the generator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Validation attempts per generation
    pub max_attempts: u32,
    /// Model calls per attempt when the transport fails
    pub transport_attempts: u32,
    /// Timeout applied to each model call
    pub attempt_timeout_secs: u64,
    /// First backoff between transport retries, doubled each time
    pub backoff_ms: u64,
    pub max_backoff_ms: u64,
}

/// API keys configuration (loaded from environment)
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ApiConfig {
    #[serde(default)]
    pub openai_key: Option<String>,
    #[serde(default)]
    pub openrouter_key: Option<String>,
    #[serde(default)]
    pub anthropic_key: Option<String>,
    #[serde(default)]
    pub gemini_key: Option<String>,
}

/// Storage paths configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Base path for data storage
    pub path: PathBuf,
}

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

impl Config {
    /// Load configuration from the default location (presswire.toml in cwd or
    /// home), falling back to defaults when no file exists.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match Self::find_config_file() {
            Some(path) => Self::parse_file(&path)?,
            None => Config::default(),
        };
        config.apply_env();
        config.check()?;
        Ok(config)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::parse_file(path)?;
        config.apply_env();
        config.check()?;
        Ok(config)
    }

    fn parse_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Override settings from environment variables
    fn apply_env(&mut self) {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());

        if let Some(key) = var("OPENAI_API_KEY") {
            self.api.openai_key = Some(key);
        }
        if let Some(key) = var("OPENROUTER_API_KEY") {
            self.api.openrouter_key = Some(key);
        }
        if let Some(key) = var("ANTHROPIC_API_KEY") {
            self.api.anthropic_key = Some(key);
        }
        if let Some(key) = var("GEMINI_API_KEY") {
            self.api.gemini_key = Some(key);
        }
        if let Some(provider) = var("PRESSWIRE_PROVIDER") {
            self.agent.provider = provider;
        }
        if let Some(model) = var("PRESSWIRE_MODEL") {
            self.agent.model = Some(model);
        }
        if let Some(bind) = var("PRESSWIRE_BIND") {
            self.server.bind = bind;
        }
        if let Some(dir) = var("PRESSWIRE_DATA_DIR") {
            self.storage.path = PathBuf::from(dir);
        }
    }

    fn check(&self) -> Result<(), ConfigError> {
        if self.generation.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "generation.max_attempts",
                "must be at least 1".to_string(),
            ));
        }
        if self.generation.transport_attempts == 0 {
            return Err(ConfigError::Invalid(
                "generation.transport_attempts",
                "must be at least 1".to_string(),
            ));
        }
        if self.generation.attempt_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "generation.attempt_timeout_secs",
                "must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Find the config file in standard locations
    fn find_config_file() -> Option<PathBuf> {
        // Check current directory first
        let local_config = PathBuf::from("presswire.toml");
        if local_config.exists() {
            return Some(local_config);
        }

        // Check home directory
        let home_config = dirs::home_dir()?
            .join(".config")
            .join("presswire")
            .join("presswire.toml");
        home_config.exists().then_some(home_config)
    }

    /// Resolve the provider to use.
    ///
    /// With `provider = "auto"` the first provider whose key is present wins,
    /// in the order OpenAI, OpenRouter, Anthropic, Gemini.
    pub fn provider(&self) -> Result<Provider, ConfigError> {
        let requested = self.agent.provider.trim();
        if requested.is_empty() || requested.eq_ignore_ascii_case("auto") {
            return Provider::AUTO_ORDER
                .into_iter()
                .find(|p| self.api_key(*p).is_ok())
                .ok_or(ConfigError::NoProvider);
        }
        let provider = Provider::parse(requested)
            .ok_or_else(|| ConfigError::UnknownProvider(requested.to_string()))?;
        if provider != Provider::Offline {
            self.api_key(provider)?;
        }
        Ok(provider)
    }

    /// Get the API key for a provider
    pub fn api_key(&self, provider: Provider) -> Result<&str, ConfigError> {
        let key = match provider {
            Provider::OpenAi => &self.api.openai_key,
            Provider::OpenRouter => &self.api.openrouter_key,
            Provider::Anthropic => &self.api.anthropic_key,
            Provider::Gemini => &self.api.gemini_key,
            Provider::Offline => return Ok(""),
        };
        key.as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingApiKey(provider.to_string()))
    }
}

impl GenerationConfig {
    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_secs(self.attempt_timeout_secs)
    }

    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8000".to_string(),
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            provider: "auto".to_string(),
            model: None,
            base_url: None,
            persona: "You are an expert press release writer and editor for Irish businesses. \
                      You follow AP style, write for journalists and optimise for Irish search terms."
                .to_string(),
            max_tokens: 2048,
            temperature: 0.4,
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            transport_attempts: 3,
            attempt_timeout_secs: 60,
            backoff_ms: 250,
            max_backoff_ms: 2_000,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./data"),
        }
    }
}
