//! Auxiliary HTTP endpoints: Prometheus exposition and runtime diagnostics.

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use prometheus::{Encoder, Registry, TextEncoder};
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;

const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Router serving `/metrics` in Prometheus text exposition format.
pub fn metrics_router(registry: Arc<Registry>) -> Router {
    Router::new()
        .route("/metrics", get(serve_metrics))
        .with_state(registry)
}

async fn serve_metrics(State(registry): State<Arc<Registry>>) -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    match encoder.encode(&registry.gather(), &mut buffer) {
        Ok(()) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)],
            buffer,
        ),
        Err(err) => {
            tracing::error!(error = %err, "metrics encoding failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [(header::CONTENT_TYPE, "text/plain")],
                err.to_string().into_bytes(),
            )
        }
    }
}

#[derive(Clone)]
struct DiagnosticsState {
    started: Instant,
}

/// Router serving `/debug/status` with basic process information.
pub fn diagnostics_router() -> Router {
    Router::new()
        .route("/debug/status", get(serve_status))
        .with_state(DiagnosticsState {
            started: Instant::now(),
        })
}

async fn serve_status(State(state): State<DiagnosticsState>) -> impl IntoResponse {
    Json(json!({
        "status": "serving",
        "uptime_seconds": state.started.elapsed().as_secs(),
        "pid": std::process::id(),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
