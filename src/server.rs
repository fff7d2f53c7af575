//! HTTP surface.
//!
//! Handlers run inside the request future, so a client disconnect drops the
//! in-flight model call along with it.

use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::agent::{ErrorKind, GenerationError, Generator};
use crate::press_release::{self, DraftInput, EnhanceInput, PrContent, PrEnhancement, SeoInput, SeoMetadata};
use crate::schema::Violation;
use crate::storage::{NewPressRelease, Page, Status, Storage, StorageError, StoredPressRelease};

const API_PREFIX: &str = "/api/v1/press-releases";
const DEFAULT_PAGE: usize = 20;
const MAX_PAGE: usize = 100;

/// State shared across all routes.
#[derive(Clone)]
pub struct AppState {
    pub generator: Arc<Generator>,
    pub storage: Storage,
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Generation(#[from] GenerationError),
    #[error("malformed request body: {0}")]
    Body(#[from] JsonRejection),
    #[error("malformed query string: {0}")]
    Query(#[from] QueryRejection),
    #[error("malformed path: {0}")]
    Path(#[from] PathRejection),
    #[error("press release {0} not found")]
    NotFound(u64),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("storage task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    kind: &'a str,
    message: String,
    #[serde(skip_serializing_if = "no_violations")]
    violations: &'a [Violation],
}

fn no_violations(violations: &&[Violation]) -> bool {
    violations.is_empty()
}

impl ApiError {
    fn status_and_kind(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Generation(err) => match err.kind() {
                ErrorKind::InvalidRequest => (StatusCode::UNPROCESSABLE_ENTITY, "invalid_request"),
                ErrorKind::ModelUnavailable => (StatusCode::SERVICE_UNAVAILABLE, "model_unavailable"),
                ErrorKind::SchemaViolation => (StatusCode::BAD_GATEWAY, "schema_violation"),
            },
            ApiError::Body(_) | ApiError::Query(_) | ApiError::Path(_) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "invalid_request")
            }
            ApiError::NotFound(_) | ApiError::Storage(StorageError::NotFound(_)) => {
                (StatusCode::NOT_FOUND, "not_found")
            }
            ApiError::Storage(_) | ApiError::Task(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "storage")
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind) = self.status_and_kind();
        if status.is_server_error() {
            error!(kind, error = %self, "request failed");
        } else {
            warn!(kind, error = %self, "request rejected");
        }
        let violations: &[Violation] = match &self {
            ApiError::Generation(err) => err.violations(),
            _ => &[],
        };
        let body = ErrorBody {
            kind,
            message: self.to_string(),
            violations,
        };
        (status, Json(json!({ "error": body }))).into_response()
    }
}

#[derive(Deserialize)]
pub struct PaginationQuery {
    pub skip: Option<usize>,
    pub limit: Option<usize>,
}

#[derive(Deserialize)]
pub struct StatusUpdate {
    pub status: Status,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api", get(api_root))
        .route(&format!("{API_PREFIX}/generate"), post(generate))
        .route(&format!("{API_PREFIX}/enhance"), post(enhance))
        .route(&format!("{API_PREFIX}/seo"), post(seo))
        .route(API_PREFIX, get(list))
        .route(&format!("{API_PREFIX}/{{id}}"), get(get_one).patch(update_status))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind and serve until the process is stopped.
pub async fn serve(bind: &str, state: AppState) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!(bind, model = state.generator.model_name(), "presswire listening");
    axum::serve(listener, router(state)).await?;
    Ok(())
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "healthy" }))
}

async fn api_root() -> Json<serde_json::Value> {
    Json(json!({
        "name": "PressWire.ie API",
        "status": "operational",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "press_releases": API_PREFIX,
            "generate": format!("{API_PREFIX}/generate"),
            "enhance": format!("{API_PREFIX}/enhance"),
            "seo": format!("{API_PREFIX}/seo"),
        }
    }))
}

async fn generate(
    State(state): State<AppState>,
    payload: Result<Json<DraftInput>, JsonRejection>,
) -> Result<(HeaderMap, Json<PrContent>), ApiError> {
    let Json(input) = payload?;
    let drafted = press_release::generate_press_release(&state.generator, &input).await?;

    let mut headers = HeaderMap::new();
    let record = NewPressRelease::from_draft(input, drafted.clone());
    // The draft is returned even if it could not be stored.
    match on_storage(&state.storage, move |storage| storage.insert(record)).await {
        Ok(stored) => {
            info!(id = stored.id, slug = %stored.slug, "draft stored");
            if let Ok(location) = HeaderValue::from_str(&format!("{API_PREFIX}/{}", stored.id)) {
                headers.insert(header::LOCATION, location);
            }
        }
        Err(e) => warn!(error = %e, "failed to store draft"),
    }

    Ok((headers, Json(drafted.value)))
}

async fn enhance(
    State(state): State<AppState>,
    payload: Result<Json<EnhanceInput>, JsonRejection>,
) -> Result<Json<PrEnhancement>, ApiError> {
    let Json(input) = payload?;
    let drafted = press_release::enhance_press_release(&state.generator, &input).await?;
    Ok(Json(drafted.value))
}

async fn seo(
    State(state): State<AppState>,
    payload: Result<Json<SeoInput>, JsonRejection>,
) -> Result<Json<SeoMetadata>, ApiError> {
    let Json(input) = payload?;
    let drafted = press_release::generate_seo_metadata(&state.generator, &input).await?;
    Ok(Json(drafted.value))
}

async fn list(
    State(state): State<AppState>,
    query: Result<Query<PaginationQuery>, QueryRejection>,
) -> Result<Json<Page>, ApiError> {
    let Query(query) = query?;
    let skip = query.skip.unwrap_or(0);
    let limit = query.limit.unwrap_or(DEFAULT_PAGE).min(MAX_PAGE);
    Ok(Json(state.storage.list(skip, limit)?))
}

async fn get_one(
    State(state): State<AppState>,
    id: Result<Path<u64>, PathRejection>,
) -> Result<Json<StoredPressRelease>, ApiError> {
    let Path(id) = id?;
    state
        .storage
        .get(id)?
        .map(Json)
        .ok_or(ApiError::NotFound(id))
}

async fn update_status(
    State(state): State<AppState>,
    id: Result<Path<u64>, PathRejection>,
    payload: Result<Json<StatusUpdate>, JsonRejection>,
) -> Result<Json<StoredPressRelease>, ApiError> {
    let Path(id) = id?;
    let Json(update) = payload?;
    let stored = on_storage(&state.storage, move |storage| storage.set_status(id, update.status)).await?;
    info!(id, status = ?stored.status, "status updated");
    Ok(Json(stored))
}

/// Run a storage write on the blocking pool; every write flushes to disk.
async fn on_storage<T, F>(storage: &Storage, op: F) -> Result<T, ApiError>
where
    F: FnOnce(&Storage) -> Result<T, StorageError> + Send + 'static,
    T: Send + 'static,
{
    let storage = storage.clone();
    Ok(tokio::task::spawn_blocking(move || op(&storage)).await??)
}
