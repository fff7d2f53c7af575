//! Schema-constrained generation on top of a hosted model.
//!
//! [`Generator::generate`] prompts the model with an instruction plus a
//! machine-readable schema, validates the reply, and re-prompts with the exact
//! list of violations until the reply conforms or the attempt bound is hit.
//! Transport failures are retried separately and never consume a validation
//! attempt.

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::config::Config;
use crate::model::{ModelClient, ModelError, ModelReply, Prompt};
use crate::schema::{OutputSchema, SchemaError, Violation};

/// Longest slice of a rejected reply echoed back in a corrective prompt.
const ECHO_LIMIT: usize = 4_000;

#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("invalid generation request: {0}")]
    InvalidRequest(String),
    #[error("model unavailable after {calls} call(s): {source}")]
    ModelUnavailable {
        calls: u32,
        #[source]
        source: ModelError,
    },
    #[error("model output for `{schema}` still invalid after {attempts} attempt(s): {}", join_violations(.violations))]
    SchemaViolation {
        schema: String,
        attempts: u32,
        violations: Vec<Violation>,
    },
}

/// Machine-readable error kind, as exposed to API clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidRequest,
    ModelUnavailable,
    SchemaViolation,
}

impl GenerationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GenerationError::InvalidRequest(_) => ErrorKind::InvalidRequest,
            GenerationError::ModelUnavailable { .. } => ErrorKind::ModelUnavailable,
            GenerationError::SchemaViolation { .. } => ErrorKind::SchemaViolation,
        }
    }

    pub fn violations(&self) -> &[Violation] {
        match self {
            GenerationError::SchemaViolation { violations, .. } => violations,
            _ => &[],
        }
    }
}

impl From<SchemaError> for GenerationError {
    fn from(err: SchemaError) -> Self {
        GenerationError::InvalidRequest(err.to_string())
    }
}

fn join_violations(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(Violation::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Retry and timeout bounds for a [`Generator`].
#[derive(Debug, Clone)]
pub struct GeneratorSettings {
    pub persona: String,
    pub max_attempts: u32,
    pub transport_attempts: u32,
    pub attempt_timeout: Duration,
    pub backoff: Duration,
    pub max_backoff: Duration,
}

impl GeneratorSettings {
    pub fn from_config(config: &Config) -> Self {
        let generation = &config.generation;
        Self {
            persona: config.agent.persona.clone(),
            max_attempts: generation.max_attempts,
            transport_attempts: generation.transport_attempts,
            attempt_timeout: generation.attempt_timeout(),
            backoff: generation.backoff(),
            max_backoff: generation.max_backoff(),
        }
    }
}

impl Default for GeneratorSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// One call to [`Generator::generate`].
#[derive(Debug, Clone)]
pub struct GenerationRequest<'a> {
    pub instruction: String,
    pub schema: &'a OutputSchema,
    /// Falls back to the generator's configured bound
    pub max_attempts: Option<u32>,
    /// Task-specific persona; falls back to the configured one
    pub system: Option<String>,
}

impl<'a> GenerationRequest<'a> {
    pub fn new(instruction: impl Into<String>, schema: &'a OutputSchema) -> Self {
        Self {
            instruction: instruction.into(),
            schema,
            max_attempts: None,
            system: None,
        }
    }

    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    pub fn system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }
}

/// A reply that satisfied every constraint of its schema.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationResult {
    pub schema: String,
    pub fields: Map<String, Value>,
    /// Validation attempt that succeeded, starting at 1
    pub attempts: u32,
    /// Model calls repeated because of transport failures
    pub transport_retries: u32,
}

impl GenerationResult {
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Deserialize the validated fields into a typed struct.
    pub fn into_typed<T: DeserializeOwned>(self) -> Result<T, GenerationError> {
        let schema = self.schema;
        let attempts = self.attempts;
        serde_json::from_value(Value::Object(self.fields)).map_err(|e| {
            GenerationError::SchemaViolation {
                schema,
                attempts,
                violations: vec![Violation::new("$", format!("does not decode: {e}"))],
            }
        })
    }
}

/// A rejected attempt, replayed to the model as corrective feedback.
struct Rejection {
    attempt: u32,
    reply: String,
    violations: Vec<Violation>,
}

/// Produces schema-conformant values from a hosted model.
///
/// The generator holds no per-call state, so one instance is shared by all
/// concurrent requests.
pub struct Generator {
    model: Arc<dyn ModelClient>,
    settings: GeneratorSettings,
}

impl Generator {
    pub fn new(model: Arc<dyn ModelClient>, settings: GeneratorSettings) -> Self {
        Self { model, settings }
    }

    pub fn model_name(&self) -> &str {
        self.model.name()
    }

    pub fn settings(&self) -> &GeneratorSettings {
        &self.settings
    }

    #[instrument(skip_all, fields(schema = %request.schema.name(), model = self.model.name()))]
    pub async fn generate(
        &self,
        request: GenerationRequest<'_>,
    ) -> Result<GenerationResult, GenerationError> {
        let instruction = request.instruction.trim();
        if instruction.is_empty() {
            return Err(GenerationError::InvalidRequest(
                "instruction is empty".to_string(),
            ));
        }
        let max_attempts = request.max_attempts.unwrap_or(self.settings.max_attempts);
        if max_attempts == 0 {
            return Err(GenerationError::InvalidRequest(
                "max_attempts must be at least 1".to_string(),
            ));
        }

        let schema = request.schema;
        let system = request.system.as_deref().unwrap_or(&self.settings.persona);
        let mut history: Vec<Rejection> = Vec::new();
        let mut transport_retries = 0;

        for attempt in 1..=max_attempts {
            let prompt = build_prompt(system, instruction, schema, &history);
            let (reply, retries) = self.call_model(&prompt).await?;
            transport_retries += retries;

            match parse_reply(&reply).and_then(|value| schema.validate(&value)) {
                Ok(fields) => {
                    info!(attempt, transport_retries, "generation succeeded");
                    return Ok(GenerationResult {
                        schema: schema.name().to_string(),
                        fields,
                        attempts: attempt,
                        transport_retries,
                    });
                }
                Err(violations) => {
                    warn!(
                        attempt,
                        max_attempts,
                        violations = %join_violations(&violations),
                        "model reply rejected"
                    );
                    history.push(Rejection {
                        attempt,
                        reply: reply_text(&reply),
                        violations,
                    });
                }
            }
        }

        let violations = history.pop().map(|r| r.violations).unwrap_or_default();
        Err(GenerationError::SchemaViolation {
            schema: schema.name().to_string(),
            attempts: max_attempts,
            violations,
        })
    }

    /// One validation attempt's worth of model calls: retried with backoff
    /// while the failure is transient and the transport bound allows.
    async fn call_model(&self, prompt: &Prompt) -> Result<(ModelReply, u32), GenerationError> {
        let limit = self.settings.transport_attempts.max(1);
        let mut backoff = self.settings.backoff;
        let mut calls = 0;

        loop {
            calls += 1;
            debug!(call = calls, "awaiting model");
            let outcome = tokio::time::timeout(self.settings.attempt_timeout, self.model.invoke(prompt))
                .await
                .unwrap_or(Err(ModelError::Timeout(self.settings.attempt_timeout)));

            match outcome {
                Ok(reply) => return Ok((reply, calls - 1)),
                Err(err) if err.is_retryable() && calls < limit => {
                    warn!(call = calls, error = %err, backoff_ms = backoff.as_millis() as u64, "model call failed, retrying");
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(self.settings.max_backoff);
                }
                Err(err) => {
                    warn!(call = calls, error = %err, "model unavailable");
                    return Err(GenerationError::ModelUnavailable { calls, source: err });
                }
            }
        }
    }
}

fn build_prompt(
    system: &str,
    instruction: &str,
    schema: &OutputSchema,
    history: &[Rejection],
) -> Prompt {
    let described = schema.describe();
    let schema_json =
        serde_json::to_string_pretty(&described).unwrap_or_else(|_| described.to_string());

    let mut user = format!(
        r#"{instruction}

You MUST respond with a single JSON object matching this JSON Schema:
{schema_json}

Respect every maxLength, minItems, maxItems, minimum and maximum. Do not include any markdown formatting, code blocks, or explanations. Only output the raw JSON object."#
    );

    for rejection in history {
        user.push_str(&format!(
            "\n\n---\nYour reply on attempt {} was rejected:\n{}\n\nProblems:\n",
            rejection.attempt,
            truncate(&rejection.reply, ECHO_LIMIT)
        ));
        for violation in &rejection.violations {
            let allowed = schema
                .field(&violation.field)
                .map(|f| format!(" (constraints: {})", serde_json::json!(f.constraints())))
                .unwrap_or_default();
            user.push_str(&format!("- {violation}{allowed}\n"));
        }
        user.push_str("Fix every problem listed and answer again with the complete JSON object.");
    }

    Prompt {
        system: system.to_string(),
        user,
        schema_name: schema.name().to_string(),
        response_schema: described,
    }
}

fn parse_reply(reply: &ModelReply) -> Result<Value, Vec<Violation>> {
    match reply {
        ModelReply::Structured(value) => Ok(value.clone()),
        ModelReply::Text(text) => extract_json(text)
            .ok_or_else(|| vec![Violation::new("$", "reply is not a valid JSON object")]),
    }
}

fn reply_text(reply: &ModelReply) -> String {
    match reply {
        ModelReply::Structured(value) => value.to_string(),
        ModelReply::Text(text) => text.clone(),
    }
}

/// Pull a JSON value out of free text: the whole reply, a fenced block, or
/// the outermost braces, in that order.
fn extract_json(text: &str) -> Option<Value> {
    let cleaned = strip_markdown_json(text);
    if let Ok(value) = serde_json::from_str(&cleaned) {
        return Some(value);
    }
    let start = cleaned.find('{')?;
    let end = cleaned.rfind('}')?;
    if start < end {
        serde_json::from_str(&cleaned[start..=end]).ok()
    } else {
        None
    }
}

/// Strip markdown code block wrappers from JSON response
fn strip_markdown_json(text: &str) -> String {
    let trimmed = text.trim().trim_start_matches('\u{feff}');

    // Remove ```json ... ``` or ``` ... ```
    if let Some(rest) = trimmed.strip_prefix("```") {
        let without_prefix = rest.strip_prefix("json").unwrap_or(rest);
        if let Some(end_idx) = without_prefix.rfind("```") {
            return without_prefix[..end_idx].trim().to_string();
        }
    }

    trimmed.to_string()
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}…", &text[..idx]),
        None => text.to_string(),
    }
}
