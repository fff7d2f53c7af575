//! Press release tasks: drafting, enhancement and SEO metadata.
//!
//! Each task is the same [`Generator`] call with its own schema and
//! instruction template. The typed structs mirror the schemas field for field.

use lazy_static::lazy_static;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::agent::{GenerationError, GenerationRequest, GenerationResult, Generator};
use crate::schema::{FieldSpec, OutputSchema};

pub const DEFAULT_AUDIENCE: &str = "Irish media and business community";

/// Characters of body text included in the SEO prompt.
const SEO_BODY_EXCERPT: usize = 500;

const DRAFT_PERSONA: &str = "You are an expert press release writer for Irish businesses. \
Create compelling, newsworthy press releases that follow AP style guidelines. Focus on clear, \
impactful headlines, inverted pyramid structure, a professional tone suitable for journalists, \
Irish market context and SEO for Irish search terms.";

const ENHANCE_PERSONA: &str = "You are an expert press release editor and SEO specialist. \
Analyse and enhance press releases for Irish businesses to maximise their impact. Give specific, \
actionable improvements to headline impact, structure, SEO for Irish search queries, grammar \
and style.";

const SEO_PERSONA: &str =
    "Generate SEO metadata optimised for Irish search queries and news distribution.";

lazy_static! {
    pub static ref DRAFT_SCHEMA: OutputSchema = OutputSchema::new(
        "press_release_content",
        vec![
            FieldSpec::text("headline", "Compelling headline").max_chars(100),
            FieldSpec::optional_text("subheadline", "Supporting subheadline").max_chars(150),
            FieldSpec::text("body", "Main press release body with proper formatting"),
            FieldSpec::text("boilerplate", "Company boilerplate text"),
            FieldSpec::text("seo_title", "SEO-optimised title").max_chars(60),
            FieldSpec::text("meta_description", "Meta description").max_chars(160),
            FieldSpec::text_list("keywords", "Relevant keywords for SEO").items(Some(1), None),
            FieldSpec::text_list("suggested_improvements", "Ways to strengthen the release")
                .with_default(json!([])),
            FieldSpec::number("readability_score", "Readability from 0 to 100").range(0.0, 100.0),
        ],
    )
    .expect("draft schema is well-formed");
    pub static ref ENHANCEMENT_SCHEMA: OutputSchema = OutputSchema::new(
        "press_release_enhancement",
        vec![
            FieldSpec::optional_text("improved_headline", "Stronger headline, if any"),
            FieldSpec::optional_text("improved_body", "Rewritten body, if any"),
            FieldSpec::text_list("seo_suggestions", "SEO suggestions").with_default(json!([])),
            FieldSpec::text_list("grammar_corrections", "Grammar corrections")
                .with_default(json!([])),
            FieldSpec::text_list("style_improvements", "Style improvements")
                .with_default(json!([])),
            FieldSpec::number("overall_score", "Overall quality from 0 to 100").range(0.0, 100.0),
        ],
    )
    .expect("enhancement schema is well-formed");
    pub static ref SEO_SCHEMA: OutputSchema = OutputSchema::new(
        "seo_metadata",
        vec![
            FieldSpec::text("seo_title", "SEO title").max_chars(60),
            FieldSpec::text("meta_description", "Meta description").max_chars(160),
            FieldSpec::text_list("keywords", "Keywords for the Irish market")
                .items(Some(5), Some(10)),
            FieldSpec::text("og_title", "Open Graph title"),
            FieldSpec::text("og_description", "Open Graph description"),
            FieldSpec::text("og_type", "Open Graph type").with_default(json!("article")),
            FieldSpec::object("schema_markup", "Schema.org NewsArticle structured data"),
        ],
    )
    .expect("SEO schema is well-formed");
}

/// Generated press release content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PrContent {
    pub headline: String,
    pub subheadline: Option<String>,
    pub body: String,
    pub boilerplate: String,
    pub seo_title: String,
    pub meta_description: String,
    pub keywords: Vec<String>,
    #[serde(default)]
    pub suggested_improvements: Vec<String>,
    pub readability_score: f64,
}

/// Suggestions for improving an existing press release.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PrEnhancement {
    pub improved_headline: Option<String>,
    pub improved_body: Option<String>,
    #[serde(default)]
    pub seo_suggestions: Vec<String>,
    #[serde(default)]
    pub grammar_corrections: Vec<String>,
    #[serde(default)]
    pub style_improvements: Vec<String>,
    pub overall_score: f64,
}

/// SEO metadata for a press release.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SeoMetadata {
    pub seo_title: String,
    pub meta_description: String,
    pub keywords: Vec<String>,
    pub og_title: String,
    pub og_description: String,
    pub og_type: String,
    pub schema_markup: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DraftInput {
    pub company_name: String,
    pub announcement: String,
    pub company_info: String,
    pub contact_email: String,
    #[serde(default = "default_audience", deserialize_with = "audience_or_default")]
    pub target_audience: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnhanceInput {
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeoInput {
    pub headline: String,
    pub body: String,
    pub company: String,
}

fn default_audience() -> String {
    DEFAULT_AUDIENCE.to_string()
}

/// An explicit `null` audience means the default one.
fn audience_or_default<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let audience: Option<String> = Option::deserialize(deserializer)?;
    Ok(audience.unwrap_or_else(default_audience))
}

fn require(field: &str, value: &str) -> Result<(), GenerationError> {
    if value.trim().is_empty() {
        Err(GenerationError::InvalidRequest(format!("{field} must not be empty")))
    } else {
        Ok(())
    }
}

fn looks_like_email(email: &str) -> bool {
    match email.trim().split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.contains(char::is_whitespace)
        }
        None => false,
    }
}

impl DraftInput {
    pub fn check(&self) -> Result<(), GenerationError> {
        require("company_name", &self.company_name)?;
        require("announcement", &self.announcement)?;
        require("company_info", &self.company_info)?;
        if !looks_like_email(&self.contact_email) {
            return Err(GenerationError::InvalidRequest(format!(
                "contact_email {:?} is not a valid email address",
                self.contact_email
            )));
        }
        Ok(())
    }

    fn instruction(&self) -> String {
        let audience = if self.target_audience.trim().is_empty() {
            DEFAULT_AUDIENCE
        } else {
            self.target_audience.trim()
        };
        format!(
            "Company: {}\nAnnouncement: {}\nCompany Info: {}\nTarget Audience: {}\n\n\
             Create a professional press release following standard format:\n\
             1. Compelling headline\n\
             2. Location and date line\n\
             3. Lead paragraph with who, what, when, where, why\n\
             4. Supporting paragraphs with details and quotes\n\
             5. Company boilerplate\n\
             6. Contact information placeholder\n\n\
             Optimise for Irish media distribution.",
            self.company_name.trim(),
            self.announcement.trim(),
            self.company_info.trim(),
            audience
        )
    }
}

impl EnhanceInput {
    pub fn check(&self) -> Result<(), GenerationError> {
        require("content", &self.content)
    }

    fn instruction(&self) -> String {
        format!(
            "Please analyse and enhance this press release:\n\n{}\n\n\
             Provide specific improvements for:\n\
             1. Headline impact\n\
             2. Content structure and flow\n\
             3. SEO optimisation for the Irish market\n\
             4. Grammar and style\n\
             5. Overall newsworthiness\n\n\
             Score the content quality from 0-100.",
            self.content.trim()
        )
    }
}

impl SeoInput {
    pub fn check(&self) -> Result<(), GenerationError> {
        require("headline", &self.headline)?;
        require("body", &self.body)?;
        require("company", &self.company)
    }

    fn instruction(&self) -> String {
        let excerpt: String = self.body.trim().chars().take(SEO_BODY_EXCERPT).collect();
        format!(
            "Headline: {}\nCompany: {}\nContent: {}...\n\n\
             Generate comprehensive SEO metadata including:\n\
             - SEO title (max 60 chars)\n\
             - Meta description (max 160 chars)\n\
             - 5-10 relevant keywords for the Irish market\n\
             - Open Graph tags\n\
             - Schema.org NewsArticle markup structure",
            self.headline.trim(),
            self.company.trim(),
            excerpt
        )
    }
}

/// Draft content together with how it was obtained.
#[derive(Debug, Clone)]
pub struct Drafted<T> {
    pub value: T,
    pub attempts: u32,
}

fn typed<T: serde::de::DeserializeOwned>(result: GenerationResult) -> Result<Drafted<T>, GenerationError> {
    let attempts = result.attempts;
    Ok(Drafted {
        value: result.into_typed()?,
        attempts,
    })
}

/// Generate a complete press release.
pub async fn generate_press_release(
    generator: &Generator,
    input: &DraftInput,
) -> Result<Drafted<PrContent>, GenerationError> {
    input.check()?;
    let request = GenerationRequest::new(input.instruction(), &DRAFT_SCHEMA).system(DRAFT_PERSONA);
    typed(generator.generate(request).await?)
}

/// Suggest improvements for an existing press release.
pub async fn enhance_press_release(
    generator: &Generator,
    input: &EnhanceInput,
) -> Result<Drafted<PrEnhancement>, GenerationError> {
    input.check()?;
    let request =
        GenerationRequest::new(input.instruction(), &ENHANCEMENT_SCHEMA).system(ENHANCE_PERSONA);
    typed(generator.generate(request).await?)
}

/// Generate SEO metadata for a press release.
pub async fn generate_seo_metadata(
    generator: &Generator,
    input: &SeoInput,
) -> Result<Drafted<SeoMetadata>, GenerationError> {
    input.check()?;
    let request = GenerationRequest::new(input.instruction(), &SEO_SCHEMA).system(SEO_PERSONA);
    typed(generator.generate(request).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::GeneratorSettings;
    use crate::model::ScriptedModel;
    use std::collections::BTreeSet;
    use std::sync::Arc;

    fn property_names(schema: Value) -> BTreeSet<String> {
        schema["properties"]
            .as_object()
            .map(|props| props.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn declared_names(schema: &OutputSchema) -> BTreeSet<String> {
        schema.fields().iter().map(|f| f.name().to_string()).collect()
    }

    #[test]
    fn typed_structs_mirror_declarative_schemas() {
        let pairs = [
            (serde_json::to_value(schemars::schema_for!(PrContent)).unwrap(), &*DRAFT_SCHEMA),
            (serde_json::to_value(schemars::schema_for!(PrEnhancement)).unwrap(), &*ENHANCEMENT_SCHEMA),
            (serde_json::to_value(schemars::schema_for!(SeoMetadata)).unwrap(), &*SEO_SCHEMA),
        ];
        for (derived, declared) in pairs {
            assert_eq!(property_names(derived), declared_names(declared), "{}", declared.name());
        }
    }

    fn draft_input() -> DraftInput {
        DraftInput {
            company_name: "Acme Ltd".into(),
            announcement: "announce product launch".into(),
            company_info: "a Cork software firm".into(),
            contact_email: "press@acme.ie".into(),
            target_audience: DEFAULT_AUDIENCE.into(),
        }
    }

    #[test]
    fn draft_input_checks() {
        assert!(draft_input().check().is_ok());

        let mut input = draft_input();
        input.contact_email = "not-an-email".into();
        assert!(matches!(input.check(), Err(GenerationError::InvalidRequest(_))));

        let mut input = draft_input();
        input.company_name = " ".into();
        assert!(matches!(input.check(), Err(GenerationError::InvalidRequest(m)) if m.contains("company_name")));
    }

    #[test]
    fn missing_or_null_audience_takes_default() {
        let base = json!({
            "company_name": "Acme Ltd",
            "announcement": "announce product launch",
            "company_info": "a Cork software company",
            "contact_email": "press@acme.ie"
        });
        let absent: DraftInput = serde_json::from_value(base.clone()).unwrap();
        assert_eq!(absent.target_audience, DEFAULT_AUDIENCE);

        let mut with_null = base.clone();
        with_null["target_audience"] = Value::Null;
        let null: DraftInput = serde_json::from_value(with_null).unwrap();
        assert_eq!(null.target_audience, DEFAULT_AUDIENCE);

        let mut with_value = base;
        with_value["target_audience"] = json!("Munster tech press");
        let given: DraftInput = serde_json::from_value(with_value).unwrap();
        assert_eq!(given.target_audience, "Munster tech press");
    }

    #[test]
    fn seo_instruction_uses_body_excerpt() {
        let input = SeoInput {
            headline: "Acme launches".into(),
            body: "é".repeat(2_000),
            company: "Acme Ltd".into(),
        };
        let instruction = input.instruction();
        assert!(instruction.contains(&format!("Content: {}...", "é".repeat(SEO_BODY_EXCERPT))));
        assert!(!instruction.contains(&"é".repeat(SEO_BODY_EXCERPT + 1)));
    }

    #[tokio::test]
    async fn enhancement_decodes_defaults() {
        let model = Arc::new(ScriptedModel::new().reply_json(json!({ "overall_score": 82 })));
        let generator = Generator::new(model, GeneratorSettings::default());

        let drafted = enhance_press_release(
            &generator,
            &EnhanceInput {
                content: "Acme Ltd today announced...".into(),
            },
        )
        .await
        .unwrap();

        assert_eq!(drafted.value.overall_score, 82.0);
        assert!(drafted.value.improved_headline.is_none());
        assert!(drafted.value.seo_suggestions.is_empty());
    }
}
