//! Declarative output schemas and the validator that interprets them.
//!
//! An [`OutputSchema`] lists the fields a model reply must carry, the semantic
//! kind of each field and its constraints. [`OutputSchema::validate`] is the one
//! place where replies are checked: it coerces what can be coerced, fills
//! defaults and reports every violated constraint at once.

use serde::Serialize;
use serde_json::{json, Map, Number, Value};
use std::collections::HashSet;
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchemaError {
    #[error("schema `{0}` declares no required field")]
    NoRequiredField(String),
    #[error("schema `{schema}` declares field `{field}` more than once")]
    DuplicateField { schema: String, field: String },
    #[error("field `{field}`: {reason}")]
    InvalidConstraint { field: String, reason: String },
}

/// Semantic type of a schema field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Text,
    OptionalText,
    Number,
    TextList,
    Object,
}

impl FieldKind {
    fn json_type(self) -> Value {
        match self {
            FieldKind::Text => json!("string"),
            FieldKind::OptionalText => json!(["string", "null"]),
            FieldKind::Number => json!("number"),
            FieldKind::TextList => json!("array"),
            FieldKind::Object => json!("object"),
        }
    }

    fn expected(self) -> &'static str {
        match self {
            FieldKind::Text => "string",
            FieldKind::OptionalText => "string or null",
            FieldKind::Number => "number",
            FieldKind::TextList => "array of strings",
            FieldKind::Object => "object",
        }
    }
}

/// A single constraint on a field value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Constraint {
    /// Upper bound on text length, counted in characters.
    MaxChars { max: usize },
    /// Bounds on the number of list items.
    ItemCount {
        min: Option<usize>,
        max: Option<usize>,
    },
    /// Inclusive numeric range.
    Range { min: f64, max: f64 },
}

/// Declaration of one field in an [`OutputSchema`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldSpec {
    name: String,
    kind: FieldKind,
    description: String,
    constraints: Vec<Constraint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    default: Option<Value>,
}

impl FieldSpec {
    fn new(name: &str, kind: FieldKind, description: &str) -> Self {
        Self {
            name: name.to_string(),
            kind,
            description: description.to_string(),
            constraints: Vec::new(),
            default: None,
        }
    }

    pub fn text(name: &str, description: &str) -> Self {
        Self::new(name, FieldKind::Text, description)
    }

    pub fn optional_text(name: &str, description: &str) -> Self {
        Self::new(name, FieldKind::OptionalText, description)
    }

    pub fn number(name: &str, description: &str) -> Self {
        Self::new(name, FieldKind::Number, description)
    }

    pub fn text_list(name: &str, description: &str) -> Self {
        Self::new(name, FieldKind::TextList, description)
    }

    pub fn object(name: &str, description: &str) -> Self {
        Self::new(name, FieldKind::Object, description)
    }

    pub fn max_chars(mut self, max: usize) -> Self {
        self.constraints.push(Constraint::MaxChars { max });
        self
    }

    pub fn items(mut self, min: Option<usize>, max: Option<usize>) -> Self {
        self.constraints.push(Constraint::ItemCount { min, max });
        self
    }

    pub fn range(mut self, min: f64, max: f64) -> Self {
        self.constraints.push(Constraint::Range { min, max });
        self
    }

    /// Value used when the model omits the field. A field with a default is
    /// not required.
    pub fn with_default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> FieldKind {
        self.kind
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    pub fn is_required(&self) -> bool {
        self.default.is_none() && self.kind != FieldKind::OptionalText
    }

    fn check_declaration(&self) -> Result<(), SchemaError> {
        let invalid = |reason: String| SchemaError::InvalidConstraint {
            field: self.name.clone(),
            reason,
        };
        if self.name.trim().is_empty() {
            return Err(invalid("field name is empty".to_string()));
        }
        for constraint in &self.constraints {
            match (constraint, self.kind) {
                (Constraint::MaxChars { .. }, FieldKind::Text | FieldKind::OptionalText) => {}
                (Constraint::ItemCount { min, max }, FieldKind::TextList) => {
                    if let (Some(min), Some(max)) = (min, max) {
                        if min > max {
                            return Err(invalid(format!("item count min {min} > max {max}")));
                        }
                    }
                }
                (Constraint::Range { min, max }, FieldKind::Number) => {
                    if !(min <= max) {
                        return Err(invalid(format!("range [{min}, {max}] is empty")));
                    }
                }
                (constraint, kind) => {
                    return Err(invalid(format!(
                        "constraint {constraint:?} does not apply to {kind:?} fields"
                    )));
                }
            }
        }
        if let Some(default) = &self.default {
            let mut scratch = Vec::new();
            if check_value(self, default.clone(), &mut scratch).is_none() || !scratch.is_empty() {
                return Err(invalid("default value violates the field's own constraints".to_string()));
            }
        }
        Ok(())
    }
}

/// One failed check against a schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    pub field: String,
    pub reason: String,
}

impl Violation {
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.reason)
    }
}

/// Declarative description of the structured value a generation must yield.
///
/// Schemas are immutable once built; [`OutputSchema::new`] rejects
/// declarations that could never be satisfied or that are ambiguous.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputSchema {
    name: String,
    fields: Vec<FieldSpec>,
}

impl OutputSchema {
    pub fn new(name: &str, fields: Vec<FieldSpec>) -> Result<Self, SchemaError> {
        let mut seen = HashSet::new();
        for field in &fields {
            if !seen.insert(field.name.as_str()) {
                return Err(SchemaError::DuplicateField {
                    schema: name.to_string(),
                    field: field.name.clone(),
                });
            }
            field.check_declaration()?;
        }
        if !fields.iter().any(FieldSpec::is_required) {
            return Err(SchemaError::NoRequiredField(name.to_string()));
        }
        Ok(Self {
            name: name.to_string(),
            fields,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Machine-readable description in JSON Schema vocabulary, embedded in
    /// prompts so the model sees names, types and constraints.
    pub fn describe(&self) -> Value {
        let mut properties = Map::new();
        for field in &self.fields {
            let mut prop = Map::new();
            prop.insert("type".into(), field.kind.json_type());
            prop.insert("description".into(), json!(field.description));
            if field.kind == FieldKind::TextList {
                prop.insert("items".into(), json!({ "type": "string" }));
            }
            for constraint in &field.constraints {
                match constraint {
                    Constraint::MaxChars { max } => {
                        prop.insert("maxLength".into(), json!(max));
                    }
                    Constraint::ItemCount { min, max } => {
                        if let Some(min) = min {
                            prop.insert("minItems".into(), json!(min));
                        }
                        if let Some(max) = max {
                            prop.insert("maxItems".into(), json!(max));
                        }
                    }
                    Constraint::Range { min, max } => {
                        prop.insert("minimum".into(), json!(min));
                        prop.insert("maximum".into(), json!(max));
                    }
                }
            }
            if let Some(default) = &field.default {
                prop.insert("default".into(), default.clone());
            }
            properties.insert(field.name.clone(), Value::Object(prop));
        }
        let required: Vec<&str> = self
            .fields
            .iter()
            .filter(|f| f.is_required())
            .map(|f| f.name.as_str())
            .collect();

        json!({
            "title": self.name,
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    /// Check a reply against the schema.
    ///
    /// On success the returned map holds exactly the declared fields, with
    /// defaults filled and numbers coerced. Every violation is reported, not
    /// just the first one.
    pub fn validate(&self, value: &Value) -> Result<Map<String, Value>, Vec<Violation>> {
        let Some(object) = value.as_object() else {
            return Err(vec![Violation::new("$", "expected a JSON object")]);
        };

        let mut normalized = Map::new();
        let mut violations = Vec::new();

        for field in &self.fields {
            let raw = object.get(&field.name).cloned().unwrap_or(Value::Null);
            let raw = match (raw, &field.default) {
                (Value::Null, Some(default)) => default.clone(),
                (raw, _) => raw,
            };
            if raw.is_null() && field.kind != FieldKind::OptionalText {
                violations.push(Violation::new(&field.name, "missing required field"));
                continue;
            }
            if let Some(value) = check_value(field, raw, &mut violations) {
                normalized.insert(field.name.clone(), value);
            }
        }

        if violations.is_empty() {
            Ok(normalized)
        } else {
            Err(violations)
        }
    }
}

/// Type-check and coerce one value, then apply the field's constraints.
///
/// Returns `None` when the value has the wrong type (a violation is recorded);
/// constraint failures are recorded but the coerced value is still returned.
fn check_value(field: &FieldSpec, raw: Value, violations: &mut Vec<Violation>) -> Option<Value> {
    let mismatch = |found: &Value| {
        Violation::new(
            &field.name,
            format!("expected {}, found {}", field.kind.expected(), type_name(found)),
        )
    };

    let value = match (field.kind, raw) {
        (FieldKind::Text, Value::String(s)) => Value::String(s),
        (FieldKind::OptionalText, v @ (Value::String(_) | Value::Null)) => v,
        (FieldKind::Number, Value::Number(n)) => Value::Number(n),
        (FieldKind::Number, Value::String(s)) => match coerce_number(&s) {
            Some(n) => Value::Number(n),
            None => {
                violations.push(Violation::new(
                    &field.name,
                    format!("expected number, found non-numeric string {s:?}"),
                ));
                return None;
            }
        },
        (FieldKind::TextList, Value::Array(items)) => {
            if let Some(pos) = items.iter().position(|item| !item.is_string()) {
                violations.push(Violation::new(
                    &field.name,
                    format!("item {pos} is {}, expected string", type_name(&items[pos])),
                ));
                return None;
            }
            Value::Array(items)
        }
        (FieldKind::Object, v @ Value::Object(_)) => v,
        (_, other) => {
            violations.push(mismatch(&other));
            return None;
        }
    };

    for constraint in &field.constraints {
        if let Some(reason) = violated(constraint, &value) {
            violations.push(Violation::new(&field.name, reason));
        }
    }
    Some(value)
}

fn violated(constraint: &Constraint, value: &Value) -> Option<String> {
    match constraint {
        Constraint::MaxChars { max } => {
            let len = value.as_str()?.chars().count();
            (len > *max).then(|| format!("length {len} > max {max}"))
        }
        Constraint::ItemCount { min, max } => {
            let count = value.as_array()?.len();
            match (min, max) {
                (Some(min), _) if count < *min => Some(format!("count {count} < min {min}")),
                (_, Some(max)) if count > *max => Some(format!("count {count} > max {max}")),
                _ => None,
            }
        }
        Constraint::Range { min, max } => {
            let n = value.as_f64()?;
            (!(n >= *min && n <= *max)).then(|| format!("value {n} outside [{min}, {max}]"))
        }
    }
}

fn coerce_number(s: &str) -> Option<Number> {
    let parsed: f64 = s.trim().parse().ok()?;
    Number::from_f64(parsed)
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> OutputSchema {
        OutputSchema::new(
            "sample",
            vec![
                FieldSpec::text("headline", "headline").max_chars(10),
                FieldSpec::optional_text("subheadline", "sub").max_chars(5),
                FieldSpec::number("score", "score").range(0.0, 100.0),
                FieldSpec::text_list("keywords", "keywords").items(Some(2), Some(3)),
                FieldSpec::text_list("notes", "notes").with_default(json!([])),
            ],
        )
        .unwrap()
    }

    #[test]
    fn accepts_compliant_value_and_fills_defaults() {
        let fields = sample()
            .validate(&json!({
                "headline": "Launch",
                "score": 42,
                "keywords": ["a", "b"],
                "extra": true
            }))
            .unwrap();

        assert_eq!(fields["notes"], json!([]));
        assert_eq!(fields["subheadline"], Value::Null);
        assert!(!fields.contains_key("extra"));
    }

    #[test]
    fn reports_every_violation() {
        let violations = sample()
            .validate(&json!({
                "headline": "A headline that is too long",
                "subheadline": "too long",
                "score": 150,
                "keywords": ["only-one"]
            }))
            .unwrap_err();

        let fields: Vec<&str> = violations.iter().map(|v| v.field.as_str()).collect();
        assert_eq!(fields, vec!["headline", "subheadline", "score", "keywords"]);
        assert_eq!(violations[0].reason, "length 27 > max 10");
        assert_eq!(violations[2].reason, "value 150 outside [0, 100]");
        assert_eq!(violations[3].reason, "count 1 < min 2");
    }

    #[test]
    fn missing_and_mistyped_fields() {
        let violations = sample()
            .validate(&json!({ "headline": 7, "keywords": ["a", 3] }))
            .unwrap_err();

        assert_eq!(
            violations,
            vec![
                Violation::new("headline", "expected string, found number"),
                Violation::new("score", "missing required field"),
                Violation::new("keywords", "item 1 is number, expected string"),
            ]
        );
    }

    #[test]
    fn coerces_numeric_strings() {
        let fields = sample()
            .validate(&json!({ "headline": "x", "score": " 75.5 ", "keywords": ["a", "b"] }))
            .unwrap();
        assert_eq!(fields["score"].as_f64(), Some(75.5));
    }

    #[test]
    fn length_counts_characters_not_bytes() {
        let fields = sample()
            .validate(&json!({ "headline": "Éire Óg ár", "score": 1, "keywords": ["a", "b"] }))
            .unwrap();
        assert_eq!(fields["headline"], json!("Éire Óg ár"));
    }

    #[test]
    fn non_object_reply_is_rejected() {
        let violations = sample().validate(&json!(["headline"])).unwrap_err();
        assert_eq!(violations, vec![Violation::new("$", "expected a JSON object")]);
    }

    #[test]
    fn revalidating_normalized_output_is_idempotent() {
        let schema = sample();
        let first = schema
            .validate(&json!({ "headline": "x", "score": "12", "keywords": ["a", "b", "c"] }))
            .unwrap();
        let second = schema.validate(&Value::Object(first.clone())).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn rejects_malformed_declarations() {
        let err = OutputSchema::new("empty", vec![FieldSpec::optional_text("a", "a")]).unwrap_err();
        assert_eq!(err, SchemaError::NoRequiredField("empty".into()));

        let err = OutputSchema::new(
            "dup",
            vec![FieldSpec::text("a", "a"), FieldSpec::text("a", "again")],
        )
        .unwrap_err();
        assert!(matches!(err, SchemaError::DuplicateField { .. }));

        let err = OutputSchema::new("bad", vec![FieldSpec::number("n", "n").max_chars(3)]).unwrap_err();
        assert!(matches!(err, SchemaError::InvalidConstraint { .. }));

        let err = OutputSchema::new(
            "bad-default",
            vec![
                FieldSpec::text("a", "a"),
                FieldSpec::text_list("k", "k").items(Some(1), None).with_default(json!([])),
            ],
        )
        .unwrap_err();
        assert!(matches!(err, SchemaError::InvalidConstraint { .. }));
    }

    #[test]
    fn describe_lists_constraints() {
        let described = sample().describe();
        assert_eq!(described["required"], json!(["headline", "score", "keywords"]));
        assert_eq!(described["properties"]["headline"]["maxLength"], json!(10));
        assert_eq!(described["properties"]["keywords"]["minItems"], json!(2));
        assert_eq!(described["properties"]["score"]["maximum"], json!(100.0));
    }
}
