// Tests for the local control API

mod common;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use common::{DialMode, FakeMicrophone, FakeStore, FakeTransport};
use practice_stream::session::{StreamingController, StreamingSettings};
use practice_stream::transport::OpenPolicy;
use practice_stream::{create_router, AppState};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

fn app(microphone: Arc<FakeMicrophone>) -> (Router, Arc<FakeTransport>) {
    let transport = FakeTransport::new(DialMode::OpenEvent);
    let settings = StreamingSettings {
        open_policy: OpenPolicy {
            timeout_ms: 1000,
            retry_attempts: 1,
            backoff_ms: 0,
        },
        ..StreamingSettings::default()
    };
    let controller = Arc::new(StreamingController::new(
        settings,
        transport.clone(),
        microphone,
        FakeStore::new(),
    ));

    (create_router(AppState::new(controller)), transport)
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(match body {
            Some(body) => Body::from(body.to_string()),
            None => Body::empty(),
        })
        .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);

    (status, value)
}

#[tokio::test]
async fn test_health_check() {
    let (app, _) = app(FakeMicrophone::new());

    let response = app
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_status_when_idle() {
    let (app, _) = app(FakeMicrophone::new());

    let (status, body) = send(&app, "GET", "/stream/status", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "idle");
    assert_eq!(body["frames_sent"], 0);
    assert!(body["recording_id"].is_null());
}

#[tokio::test]
async fn test_start_status_stop_cycle() {
    let (app, transport) = app(FakeMicrophone::new());

    let (status, body) = send(
        &app,
        "POST",
        "/stream/start",
        Some(json!({"recording_id": "rec-api", "countdown_beats": 4, "bpm": 120.0})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["recording_id"], "rec-api");
    assert_eq!(body["status"], "streaming");

    let (status, body) = send(&app, "GET", "/stream/status", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "streaming");
    assert_eq!(body["recording_id"], "rec-api");

    // A second start while streaming is refused
    let (status, _) = send(&app, "POST", "/stream/start", Some(json!({}))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(transport.dial_count(), 1);

    let (status, body) = send(&app, "POST", "/stream/stop", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "idle");
    assert_eq!(body["stats"]["recording_id"], "rec-api");

    assert_eq!(transport.sent_of_type("STOP").len(), 1);
}

#[tokio::test]
async fn test_start_generates_recording_id() {
    let (app, transport) = app(FakeMicrophone::new());

    let (status, body) = send(&app, "POST", "/stream/start", Some(json!({}))).await;

    assert_eq!(status, StatusCode::OK);
    let recording_id = body["recording_id"].as_str().unwrap();
    assert!(recording_id.starts_with("rec-"));
    assert_eq!(transport.sent_of_type("START")[0]["RECORDING_ID"], recording_id);

    send(&app, "POST", "/stream/stop", None).await;
}

#[tokio::test]
async fn test_start_failure_returns_error() {
    let (app, transport) = app(FakeMicrophone::with_permission(false));

    let (status, body) = send(&app, "POST", "/stream/start", Some(json!({}))).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].as_str().unwrap().contains("permission"));
    assert_eq!(transport.dial_count(), 0);

    let (_, body) = send(&app, "GET", "/stream/status", None).await;
    assert_eq!(body["state"], "idle");
}

#[tokio::test]
async fn test_stop_when_idle_is_ok() {
    let (app, _) = app(FakeMicrophone::new());

    let (status, body) = send(&app, "POST", "/stream/stop", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "idle");
}
