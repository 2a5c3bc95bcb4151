//! HTTP surface: status codes and JSON shape of `/trace`.

mod common;

use assert_json_diff::assert_json_include;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::*;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;
use trace_runtime::capture::lifecycle::LifecycleMode;
use trace_runtime::rest::{router, AppState};

fn app(launcher: ScriptedLauncher, mode: LifecycleMode, deadline_ms: u64) -> axum::Router {
    let service = service(Arc::new(launcher), mode, fast_settings(deadline_ms));
    router(Arc::new(AppState::new(Arc::new(service))))
}

async fn get(app: axum::Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

fn trace_uri(target: &str) -> String {
    let query: String = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("url", target)
        .finish();
    format!("/trace?{query}")
}

#[tokio::test]
async fn test_trace_without_url_is_bad_request() {
    let launcher = ScriptedLauncher::new(PageScript::new(Vec::new()));
    let journal = launcher.journal();

    let (status, body) = get(app(launcher, LifecycleMode::Ephemeral, 200), "/trace").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_json_include!(
        actual: body,
        expected: json!({"success": false, "error": "No URL provided"})
    );
    assert_eq!(journal.launches(), 0);
}

#[tokio::test]
async fn test_trace_match_returns_data() {
    let script = PageScript::new(vec![ScriptedResponse::json(
        30,
        API,
        r#"{"video":{"id":42,"hls":"https://cdn.example/42.m3u8"}}"#,
    )]);
    let launcher = ScriptedLauncher::new(script);

    let (status, body) = get(app(launcher, LifecycleMode::Ephemeral, 2_000), &trace_uri(TARGET)).await;

    assert_eq!(status, StatusCode::OK);
    assert_json_include!(
        actual: body.clone(),
        expected: json!({
            "success": true,
            "data": {"video": {"id": 42, "hls": "https://cdn.example/42.m3u8"}}
        })
    );
    assert!(body.get("error").is_none());
    let time_taken = body["time_taken"].as_str().unwrap();
    assert!(time_taken.ends_with('s'), "{time_taken}");
    let (_, decimals) = time_taken.trim_end_matches('s').split_once('.').unwrap();
    assert_eq!(decimals.len(), 2);
}

#[tokio::test]
async fn test_trace_timeout_is_not_found() {
    let launcher = ScriptedLauncher::new(PageScript::new(Vec::new()));

    let (status, body) = get(app(launcher, LifecycleMode::Ephemeral, 200), &trace_uri(TARGET)).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_json_include!(
        actual: body.clone(),
        expected: json!({"success": false, "error": "API not found"})
    );
    assert!(body.get("data").is_none());
}

#[tokio::test]
async fn test_trace_engine_failure_is_server_error() {
    let (status, body) = get(
        app(ScriptedLauncher::failing(), LifecycleMode::Ephemeral, 200),
        &trace_uri(TARGET),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["success"], json!(false));
    assert!(body["error"].as_str().unwrap().contains("unavailable"));
}

#[tokio::test]
async fn test_health_and_status() {
    let launcher = ScriptedLauncher::new(PageScript::new(Vec::new()));
    let router = app(launcher, LifecycleMode::Shared, 1_500);

    let (status, body) = get(router.clone(), "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], json!("ok"));

    let (status, body) = get(router, "/api/v1/status").await;
    assert_eq!(status, StatusCode::OK);
    assert_json_include!(
        actual: body,
        expected: json!({
            "running": true,
            "engine_mode": "shared",
            "active_pages": 0,
            "deadline_seconds": 1.5,
            "signature": "fetch-video"
        })
    );
}
