// Integration tests for the HTTP control API, driven in-process through the
// router

mod common;

use anyhow::Result;
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use common::{MockCapture, MockTransport};
use intercom_stream::{create_router, AppState, InputController};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

fn app() -> Router {
    let session = common::session(16000, &MockCapture::new(), &MockTransport::new());
    let controller = Arc::new(InputController::new(session, Duration::from_millis(50)));
    create_router(AppState::new(controller))
}

async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> Result<(StatusCode, Value)> {
    let request = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => request
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))?,
        None => request.body(Body::empty())?,
    };

    let response = app.clone().oneshot(request).await?;
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await?;
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    Ok((status, value))
}

#[tokio::test]
async fn test_set_sample_rate_while_idle() -> Result<()> {
    let app = app();

    let (status, body) = call(&app, "PUT", "/session/sample_rate", Some(json!({ "sample_rate": 48000 }))).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["stats"]["sample_rate"], 48000);

    let (_, body) = call(&app, "GET", "/session/status", None).await?;
    assert_eq!(body["status"], "idle");
    assert_eq!(body["stats"]["sample_rate"], 48000);

    Ok(())
}

#[tokio::test]
async fn test_unsupported_sample_rate_is_bad_request() -> Result<()> {
    let app = app();

    let (status, body) = call(&app, "PUT", "/session/sample_rate", Some(json!({ "sample_rate": 22050 }))).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap_or_default().contains("22050"));

    let (_, body) = call(&app, "GET", "/session/status", None).await?;
    assert_eq!(body["stats"]["sample_rate"], 16000);

    Ok(())
}

#[tokio::test]
async fn test_sample_rate_locked_while_recording() -> Result<()> {
    let app = app();

    let (status, body) = call(&app, "POST", "/session/start", None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "listening");

    let (status, body) = call(&app, "PUT", "/session/sample_rate", Some(json!({ "sample_rate": 8000 }))).await?;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["status"], "listening");

    let (status, body) = call(&app, "POST", "/session/stop", None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "idle");
    assert_eq!(body["stats"]["sample_rate"], 16000);

    Ok(())
}

#[tokio::test]
async fn test_mode_switch_and_health() -> Result<()> {
    let app = app();

    let (status, body) = call(&app, "PUT", "/ptt/mode", Some(json!({ "mode": "toggle" }))).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["mode"], "toggle");

    let (status, body) = call(&app, "POST", "/ptt/activate", None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "listening");

    let (status, _) = call(&app, "GET", "/health", None).await?;
    assert_eq!(status, StatusCode::OK);

    Ok(())
}
