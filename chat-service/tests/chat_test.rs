//! Router-level tests for `POST /chat`.
//!
//! The model is replaced by a scripted pipeline, so nothing is downloaded.

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use chat_service::services::generator::{GENERATION_FAILED_TEXT, MODEL_UNAVAILABLE_TEXT};
use chat_service::services::providers::mock::{MockBehavior, MockPipeline};
use chat_service::services::TextGenerator;
use chat_service::startup::{build_router, AppState};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::util::ServiceExt;

fn app_with(behavior: MockBehavior) -> (Router, Arc<MockPipeline>) {
    let mock = Arc::new(MockPipeline::new(behavior));
    let generator = TextGenerator::new(mock.clone());
    let state = AppState::new(Arc::new(generator), "mock-model");
    (build_router(state), mock)
}

fn unavailable_app() -> Router {
    let state = AppState::new(Arc::new(TextGenerator::unavailable()), "mock-model");
    build_router(state)
}

fn json_request(body: impl Into<Body>) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri("/chat")
        .header(header::CONTENT_TYPE, "application/json")
        .body(body.into())
        .unwrap()
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

#[tokio::test]
async fn chat_returns_continuation_without_prompt() {
    let (app, mock) = app_with(MockBehavior::Echo(" there, how are you?  ".into()));

    let (status, body) = send(app, json_request(r#"{"prompt": "Hello"}"#)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "text": "there, how are you?" }));
    assert_eq!(mock.calls(), 1);
}

#[tokio::test]
async fn chat_returns_trimmed_output_when_prompt_not_echoed() {
    let (app, _mock) = app_with(MockBehavior::Fixed("\n  A different answer. ".into()));

    let (status, body) = send(app, json_request(r#"{"prompt": "Hello"}"#)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "text": "A different answer." }));
}

#[tokio::test]
async fn chat_accepts_empty_prompt() {
    let (app, mock) = app_with(MockBehavior::Echo(" something".into()));

    let (status, body) = send(app, json_request(r#"{"prompt": ""}"#)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "text": "something" }));
    assert_eq!(mock.calls(), 1);
}

#[tokio::test]
async fn chat_with_unloaded_model_returns_fallback() {
    let (status, body) = send(unavailable_app(), json_request(r#"{"prompt": "Hello"}"#)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "text": MODEL_UNAVAILABLE_TEXT }));
}

#[tokio::test]
async fn chat_fallback_is_stable_across_requests() {
    let app = unavailable_app();

    for _ in 0..3 {
        let (status, body) = send(app.clone(), json_request(r#"{"prompt": "Hello"}"#)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["text"], MODEL_UNAVAILABLE_TEXT);
    }
}

#[tokio::test]
async fn chat_absorbs_pipeline_errors() {
    let (app, mock) = app_with(MockBehavior::Fail("CUDA out of memory".into()));

    let (status, body) = send(app, json_request(r#"{"prompt": "Hello"}"#)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "text": GENERATION_FAILED_TEXT }));
    assert_eq!(mock.calls(), 1);
}

#[tokio::test]
async fn chat_treats_empty_pipeline_output_as_failure() {
    let (app, _mock) = app_with(MockBehavior::Empty);

    let (status, body) = send(app, json_request(r#"{"prompt": "Hello"}"#)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["text"], GENERATION_FAILED_TEXT);
}

#[tokio::test]
async fn chat_absorbs_pipeline_panic() {
    let (app, mock) = app_with(MockBehavior::Panic);

    let (status, body) = send(app.clone(), json_request(r#"{"prompt": "Hello"}"#)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "text": GENERATION_FAILED_TEXT }));

    // The shared generator survives and keeps answering.
    let (status, body) = send(app, json_request(r#"{"prompt": "Again"}"#)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["text"], GENERATION_FAILED_TEXT);
    assert_eq!(mock.calls(), 2);
}

#[tokio::test]
async fn chat_rejects_object_without_prompt() {
    let (app, mock) = app_with(MockBehavior::Fixed("unused".into()));

    let (status, body) = send(app, json_request("{}")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "error": "Invalid request body" }));
    assert_eq!(mock.calls(), 0);
}

#[tokio::test]
async fn chat_rejects_invalid_json() {
    let (app, _mock) = app_with(MockBehavior::Fixed("unused".into()));

    let (status, body) = send(app, json_request("{prompt: Hello")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "error": "Invalid request body" }));
}

#[tokio::test]
async fn chat_rejects_empty_body() {
    let (app, _mock) = app_with(MockBehavior::Fixed("unused".into()));

    let (status, body) = send(app, json_request(Body::empty())).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "error": "Invalid request body" }));
}

#[tokio::test]
async fn chat_rejects_body_without_json_content_type() {
    let (app, _mock) = app_with(MockBehavior::Fixed("unused".into()));
    let request = Request::builder()
        .method(Method::POST)
        .uri("/chat")
        .body(Body::from(r#"{"prompt": "Hello"}"#))
        .unwrap();

    let (status, body) = send(app, request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "error": "Invalid request body" }));
}

#[tokio::test]
async fn chat_rejects_non_string_prompt() {
    let (app, mock) = app_with(MockBehavior::Fixed("unused".into()));

    let (status, body) = send(app, json_request(r#"{"prompt": 42}"#)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid request body");
    assert_eq!(mock.calls(), 0);
}

#[tokio::test]
async fn ready_reports_service_unavailable_without_model() {
    let request = Request::builder()
        .method(Method::GET)
        .uri("/ready")
        .body(Body::empty())
        .unwrap();

    let (status, body) = send(unavailable_app(), request).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body, json!({ "error": "Service unavailable" }));
}

#[tokio::test]
async fn ready_succeeds_with_loaded_model() {
    let (app, _mock) = app_with(MockBehavior::Fixed("ok".into()));
    let request = Request::builder()
        .method(Method::GET)
        .uri("/ready")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn chat_allows_any_origin() {
    let (app, _mock) = app_with(MockBehavior::Fixed("ok".into()));
    let request = Request::builder()
        .method(Method::OPTIONS)
        .uri("/chat")
        .header(header::ORIGIN, "http://example.com")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();

    assert!(response.status().is_success());
    assert_eq!(
        response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .unwrap(),
        "*"
    );
}

#[tokio::test]
async fn chat_only_accepts_post() {
    let (app, _mock) = app_with(MockBehavior::Fixed("ok".into()));
    let request = Request::builder()
        .method(Method::GET)
        .uri("/chat")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}
