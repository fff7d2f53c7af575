use async_trait::async_trait;
use serde_json::{json, Map, Value};

use super::{ModelClient, ModelError, ModelReply, Prompt};

/// Local stand-in for a hosted model.
///
/// Builds a placeholder object that satisfies the prompt's response schema, so
/// the service can be exercised end to end without credentials.
pub struct OfflineClient;

#[async_trait]
impl ModelClient for OfflineClient {
    fn name(&self) -> &str {
        "offline"
    }

    async fn invoke(&self, prompt: &Prompt) -> Result<ModelReply, ModelError> {
        let properties = prompt
            .response_schema
            .get("properties")
            .and_then(Value::as_object)
            .ok_or_else(|| ModelError::Provider("prompt carries no response schema".to_string()))?;

        let mut reply = Map::new();
        for (name, spec) in properties {
            reply.insert(name.clone(), placeholder(name, spec));
        }
        Ok(ModelReply::Structured(Value::Object(reply)))
    }
}

fn placeholder(name: &str, spec: &Value) -> Value {
    if let Some(default) = spec.get("default") {
        return default.clone();
    }
    let kind = match spec.get("type") {
        Some(Value::Array(types)) => types.first().and_then(Value::as_str).unwrap_or("string"),
        Some(Value::String(kind)) => kind.as_str(),
        _ => "string",
    };
    let limit = |key: &str| spec.get(key).and_then(Value::as_u64);

    match kind {
        "number" => {
            let min = spec.get("minimum").and_then(Value::as_f64).unwrap_or(0.0);
            let max = spec.get("maximum").and_then(Value::as_f64).unwrap_or(100.0);
            json!(min + (max - min) * 0.75)
        }
        "array" => {
            let count = limit("minItems").unwrap_or(1).max(1);
            let count = limit("maxItems").map_or(count, |max| count.min(max));
            Value::Array(
                (1..=count)
                    .map(|i| json!(format!("{} {i}", name.replace('_', " "))))
                    .collect(),
            )
        }
        "object" => json!({
            "@context": "https://schema.org",
            "@type": "NewsArticle",
        }),
        _ => {
            let text = format!("Offline {}", name.replace('_', " "));
            let text = match limit("maxLength") {
                Some(max) => text.chars().take(max as usize).collect(),
                None => text,
            };
            Value::String(text)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldSpec, OutputSchema};

    #[tokio::test]
    async fn synthesized_reply_satisfies_schema() {
        let schema = OutputSchema::new(
            "offline",
            vec![
                FieldSpec::text("seo_title", "title").max_chars(5),
                FieldSpec::number("score", "score").range(10.0, 20.0),
                FieldSpec::text_list("keywords", "keywords").items(Some(5), Some(10)),
                FieldSpec::text("og_type", "type").with_default(json!("article")),
                FieldSpec::object("schema_markup", "markup"),
            ],
        )
        .unwrap();
        let prompt = Prompt {
            system: String::new(),
            user: String::new(),
            schema_name: schema.name().to_string(),
            response_schema: schema.describe(),
        };

        let ModelReply::Structured(value) = OfflineClient.invoke(&prompt).await.unwrap() else {
            panic!("offline client returns structured replies");
        };
        let fields = schema.validate(&value).unwrap();
        assert_eq!(fields["og_type"], json!("article"));
        assert_eq!(fields["keywords"].as_array().unwrap().len(), 5);
    }
}
