// Copyright 2026 Trace Contributors
// SPDX-License-Identifier: Apache-2.0

//! HTTP REST API.
//!
//! `GET /trace?url=...` runs one capture and answers with
//! `{success, time_taken, data | error}`.

use crate::capture::orchestrator::CaptureService;
use crate::capture::{CaptureOutcome, CaptureReport};
use crate::error::CaptureError;
use anyhow::Context;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::Value;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

/// State shared by all handlers.
pub struct AppState {
    pub service: Arc<CaptureService>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(service: Arc<CaptureService>) -> Self {
        Self {
            service,
            started_at: Instant::now(),
        }
    }
}

/// Build the axum Router with all REST endpoints.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/trace", get(handle_trace))
        .route("/health", get(health))
        .route("/api/v1/status", get(handle_status))
        .layer(cors)
        .with_state(state)
}

/// Serve the REST API on `addr` until `shutdown` resolves.
pub async fn start<F>(addr: SocketAddr, state: Arc<AppState>, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("Trace API listening on http://{addr}");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

/// HTTP status for a capture outcome.
pub fn status_for(outcome: &CaptureOutcome) -> StatusCode {
    match outcome.error() {
        None => StatusCode::OK,
        Some(CaptureError::MissingInput | CaptureError::InvalidUrl(_)) => StatusCode::BAD_REQUEST,
        Some(CaptureError::Timeout) => StatusCode::NOT_FOUND,
        Some(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for CaptureReport {
    fn into_response(self) -> Response {
        (status_for(&self.outcome), Json(self.to_response())).into_response()
    }
}

// ── Handlers ────────────────────────────────────────────────────

#[derive(serde::Deserialize, Default)]
struct TraceParams {
    url: Option<String>,
}

async fn handle_trace(
    State(state): State<Arc<AppState>>,
    Query(params): Query<TraceParams>,
) -> CaptureReport {
    let started = Instant::now();
    let service = Arc::clone(&state.service);

    // The capture runs on its own task so a client disconnect does not
    // abandon it halfway through teardown.
    tokio::spawn(async move { service.handle(params.url.as_deref()).await })
        .await
        .unwrap_or_else(|e| {
            error!("capture task failed: {e}");
            CaptureReport::failed(
                CaptureError::Unexpected(format!("capture task failed: {e}")),
                started.elapsed(),
            )
        })
}

async fn health() -> Json<Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn handle_status(State(state): State<Arc<AppState>>) -> Json<Value> {
    let service = &state.service;
    Json(serde_json::json!({
        "running": true,
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_seconds": state.started_at.elapsed().as_secs_f64(),
        "engine_mode": service.engines().mode().to_string(),
        "active_pages": service.engines().active_pages(),
        "deadline_seconds": service.deadline().as_secs_f64(),
        "signature": service.signature().to_string(),
    }))
}
