use async_trait::async_trait;
use rstructor::{GeminiClient, GeminiModel, LLMClient};
use tracing::debug;

use super::{ModelClient, ModelError, ModelReply, Prompt};

/// Gemini backend, driven through rstructor's client.
pub struct GeminiModelClient {
    api_key: String,
    model: String,
}

impl GeminiModelClient {
    pub fn new(api_key: &str, model: Option<&str>) -> Self {
        Self {
            api_key: api_key.to_string(),
            model: model.unwrap_or("gemini-2.0-flash").to_string(),
        }
    }
}

#[async_trait]
impl ModelClient for GeminiModelClient {
    fn name(&self) -> &str {
        "Gemini"
    }

    async fn invoke(&self, prompt: &Prompt) -> Result<ModelReply, ModelError> {
        let client = GeminiClient::new(self.api_key.as_str())
            .map_err(|e| classify_error(e.to_string()))?
            .model(parse_gemini_model(&self.model));

        debug!(model = %self.model, schema = %prompt.schema_name, "invoking Gemini");

        let result = client
            .generate_with_metadata(&prompt.flatten())
            .await
            .map_err(|e| classify_error(e.to_string()))?;

        if result.text.trim().is_empty() {
            return Err(ModelError::EmptyReply);
        }
        Ok(ModelReply::Text(result.text))
    }
}

/// Parse a model string into a GeminiModel
fn parse_gemini_model(model: &str) -> GeminiModel {
    match model {
        "gemini-2.0-flash" => GeminiModel::Gemini20Flash,
        "gemini-2.5-flash" => GeminiModel::Gemini25Flash,
        "gemini-2.5-pro" => GeminiModel::Gemini25Pro,
        _ => GeminiModel::Gemini20Flash, // Default
    }
}

/// rstructor reports failures as text; recover the HTTP class from it so
/// auth and request errors are not retried.
fn classify_error(message: String) -> ModelError {
    let status = message
        .split(|c: char| !c.is_ascii_digit())
        .filter(|token| token.len() == 3)
        .filter_map(|token| token.parse::<u16>().ok())
        .find(|code| (400..600).contains(code));

    let status = status.or_else(|| {
        let lower = message.to_lowercase();
        if lower.contains("resource_exhausted") || lower.contains("rate limit") {
            Some(429)
        } else if lower.contains("unauthenticated") || lower.contains("api key") {
            Some(401)
        } else if lower.contains("permission_denied") {
            Some(403)
        } else if lower.contains("invalid_argument") {
            Some(400)
        } else {
            None
        }
    });

    match status {
        Some(429) => ModelError::RateLimited(message),
        Some(status) => ModelError::Status { status, message },
        None => ModelError::Provider(message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bad_key_is_not_retried() {
        let err = classify_error("API error (400): API key not valid. Please pass a valid API key.".into());
        assert!(matches!(err, ModelError::Status { status: 400, .. }));
        assert!(!err.is_retryable());

        let err = classify_error("Gemini request failed: UNAUTHENTICATED".into());
        assert!(matches!(err, ModelError::Status { status: 401, .. }));
        assert!(!err.is_retryable());

        let err = classify_error("PERMISSION_DENIED: caller lacks access".into());
        assert!(matches!(err, ModelError::Status { status: 403, .. }));
    }

    #[test]
    fn transient_failures_stay_retryable() {
        let err = classify_error("HTTP 429 Too Many Requests".into());
        assert!(matches!(err, ModelError::RateLimited(_)));
        assert!(err.is_retryable());

        let err = classify_error("server returned 503: model overloaded".into());
        assert!(matches!(err, ModelError::Status { status: 503, .. }));
        assert!(err.is_retryable());

        let err = classify_error("connection reset by peer".into());
        assert!(matches!(err, ModelError::Provider(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn model_names_map_to_variants() {
        assert!(matches!(parse_gemini_model("gemini-2.5-pro"), GeminiModel::Gemini25Pro));
        assert!(matches!(parse_gemini_model("unknown"), GeminiModel::Gemini20Flash));
    }
}
