//! HTTP routes exercised in-process with tower's `oneshot`.

use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use presswire::model::{ModelClient, ModelError, OfflineClient, ScriptedModel};
use presswire::server::{router, AppState};
use presswire::{Generator, GeneratorSettings, Storage};
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

fn settings() -> GeneratorSettings {
    GeneratorSettings {
        persona: "press release writer".into(),
        max_attempts: 2,
        transport_attempts: 1,
        attempt_timeout: Duration::from_secs(5),
        backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(1),
    }
}

fn app(model: Arc<dyn ModelClient>) -> (Router, Storage, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let storage = Storage::open(dir.path()).unwrap();
    let state = AppState {
        generator: Arc::new(Generator::new(model, settings())),
        storage: storage.clone(),
    };
    (router(state), storage, dir)
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn draft_request() -> Value {
    json!({
        "company_name": "Acme Ltd",
        "announcement": "the launch of its first product",
        "company_info": "a Cork software company",
        "contact_email": "press@acme.ie"
    })
}

#[tokio::test]
async fn health_and_index() {
    let (app, _storage, _dir) = app(Arc::new(OfflineClient));

    let response = app.clone().oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({ "status": "healthy" }));

    let response = app.oneshot(get("/api")).await.unwrap();
    let index = body_json(response).await;
    assert_eq!(index["status"], "operational");
    assert_eq!(index["endpoints"]["press_releases"], "/api/v1/press-releases");
}

#[tokio::test]
async fn generate_stores_draft_and_links_it() {
    let (app, storage, _dir) = app(Arc::new(OfflineClient));

    let response = app
        .clone()
        .oneshot(post_json("/api/v1/press-releases/generate", draft_request()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let location = response.headers()[header::LOCATION].to_str().unwrap().to_string();
    let draft = body_json(response).await;
    assert!(draft["headline"].as_str().unwrap().chars().count() <= 100);
    assert!(draft["seo_title"].as_str().unwrap().chars().count() <= 60);
    assert_eq!(storage.count(), 1);

    let response = app.clone().oneshot(get(&location)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let stored = body_json(response).await;
    assert_eq!(stored["company_name"], "Acme Ltd");
    assert_eq!(stored["status"], "draft");
    assert_eq!(stored["target_audience"], "Irish media and business community");
    assert_eq!(stored["headline"], draft["headline"]);

    let response = app
        .oneshot(get("/api/v1/press-releases?skip=0&limit=5"))
        .await
        .unwrap();
    let page = body_json(response).await;
    assert_eq!(page["total"], 1);
    assert_eq!(page["limit"], 5);
    assert_eq!(page["items"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn enhance_and_seo_return_schema_shaped_json() {
    let (app, _storage, _dir) = app(Arc::new(OfflineClient));

    let response = app
        .clone()
        .oneshot(post_json(
            "/api/v1/press-releases/enhance",
            json!({ "content": "Acme Ltd today announced..." }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let enhancement = body_json(response).await;
    let score = enhancement["overall_score"].as_f64().unwrap();
    assert!((0.0..=100.0).contains(&score));

    let response = app
        .oneshot(post_json(
            "/api/v1/press-releases/seo",
            json!({ "headline": "Acme launches", "body": "Acme Ltd today...", "company": "Acme Ltd" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let seo = body_json(response).await;
    let keywords = seo["keywords"].as_array().unwrap().len();
    assert!((5..=10).contains(&keywords));
    assert_eq!(seo["og_type"], "article");
}

#[tokio::test]
async fn caller_mistakes_are_invalid_requests() {
    let model = Arc::new(ScriptedModel::new());
    let (app, _storage, _dir) = app(model.clone());

    let mut bad_email = draft_request();
    bad_email["contact_email"] = json!("nobody");
    let response = app
        .clone()
        .oneshot(post_json("/api/v1/press-releases/generate", bad_email))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body_json(response).await["error"]["kind"], "invalid_request");

    let response = app
        .oneshot(post_json("/api/v1/press-releases/enhance", json!({ "text": "wrong field" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body_json(response).await["error"]["kind"], "invalid_request");

    assert_eq!(model.calls(), 0);
}

#[tokio::test]
async fn model_failures_are_service_errors() {
    let model = Arc::new(ScriptedModel::new().fail(ModelError::RateLimited("quota".into())));
    let (app, storage, _dir) = app(model);

    let response = app
        .oneshot(post_json("/api/v1/press-releases/generate", draft_request()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body_json(response).await["error"]["kind"], "model_unavailable");
    assert_eq!(storage.count(), 0);
}

#[tokio::test]
async fn non_converging_model_is_a_bad_gateway_with_violations() {
    let model = Arc::new(ScriptedModel::new().reply_json(json!({ "overall_score": 150 })));
    let (app, _storage, _dir) = app(model.clone());

    let response = app
        .oneshot(post_json(
            "/api/v1/press-releases/enhance",
            json!({ "content": "Acme Ltd today announced..." }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let error = body_json(response).await["error"].clone();
    assert_eq!(error["kind"], "schema_violation");
    assert_eq!(error["violations"][0]["field"], "overall_score");
    assert_eq!(error["violations"][0]["reason"], "value 150 outside [0, 100]");
    assert_eq!(model.calls(), 2);
}

#[tokio::test]
async fn unknown_press_release_is_not_found() {
    let (app, _storage, _dir) = app(Arc::new(OfflineClient));
    let response = app.oneshot(get("/api/v1/press-releases/999")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["error"]["kind"], "not_found");
}

#[tokio::test]
async fn malformed_query_and_path_are_invalid_requests() {
    let (app, _storage, _dir) = app(Arc::new(OfflineClient));

    for uri in [
        "/api/v1/press-releases?limit=abc",
        "/api/v1/press-releases?skip=-1",
        "/api/v1/press-releases/abc",
    ] {
        let response = app.clone().oneshot(get(uri)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY, "{uri}");
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "application/json",
            "{uri}"
        );
        let error = body_json(response).await["error"].clone();
        assert_eq!(error["kind"], "invalid_request", "{uri}");
        assert!(error["message"].as_str().unwrap().starts_with("malformed"), "{uri}");
    }
}

fn patch_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("PATCH")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn status_moves_through_publishing_workflow() {
    let (app, storage, _dir) = app(Arc::new(OfflineClient));

    let response = app
        .clone()
        .oneshot(post_json("/api/v1/press-releases/generate", draft_request()))
        .await
        .unwrap();
    let location = response.headers()[header::LOCATION].to_str().unwrap().to_string();

    let response = app
        .clone()
        .oneshot(patch_json(&location, json!({ "status": "published" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let updated = body_json(response).await;
    assert_eq!(updated["status"], "published");

    let id = updated["id"].as_u64().unwrap();
    let stored = storage.get(id).unwrap().unwrap();
    assert_eq!(serde_json::to_value(stored.status).unwrap(), "published");

    let response = app
        .clone()
        .oneshot(patch_json(&location, json!({ "status": "retracted" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body_json(response).await["error"]["kind"], "invalid_request");

    let response = app
        .oneshot(patch_json("/api/v1/press-releases/999", json!({ "status": "archived" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["error"]["kind"], "not_found");
}
