//! Liveness probe and Prometheus scrape endpoint.

use super::AppState;
use axum::body::Body;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use prometheus::{Encoder, TextEncoder, TEXT_FORMAT};
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// `GET /health` — liveness check, unauthenticated.
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse { status: "healthy", version: env!("CARGO_PKG_VERSION") })
}

/// `HEAD /` — connection probe some S3 clients send before anything else.
pub async fn head_root() -> Response {
    Response::builder()
        .status(StatusCode::OK)
        .header("server", "s3gate")
        .body(Body::empty())
        .unwrap()
}

/// `GET /metrics` — Prometheus text exposition, unauthenticated.
pub async fn metrics_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = state.metrics.registry.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return (StatusCode::INTERNAL_SERVER_ERROR, format!("failed to encode metrics: {e}")).into_response();
    }
    (StatusCode::OK, [("content-type", TEXT_FORMAT)], buffer).into_response()
}
