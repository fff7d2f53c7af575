//! # PressWire
//!
//! A press release drafting service for Irish businesses, backed by hosted LLMs.
//!
//! ## Features
//!
//! - **Schema-Constrained Output**: every model reply is validated against a
//!   declarative [`OutputSchema`]; invalid replies are re-prompted with the exact
//!   violations until they conform or the attempt bound is reached
//! - **Provider Agnostic**: OpenAI, OpenRouter, Anthropic and Gemini behind one
//!   [`model::ModelClient`] trait, plus an offline provider for development
//! - **Storage**: generated drafts are kept in sled
//! - **HTTP API**: axum routes to draft, enhance and generate SEO metadata

pub mod agent;
pub mod config;
pub mod model;
pub mod press_release;
pub mod schema;
pub mod server;
pub mod storage;

pub use agent::{GenerationError, GenerationRequest, GenerationResult, Generator, GeneratorSettings};
pub use config::Config;
pub use press_release::{PrContent, PrEnhancement, SeoMetadata};
pub use schema::{FieldSpec, OutputSchema, Violation};
pub use storage::Storage;
