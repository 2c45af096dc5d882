//! Prometheus metrics for the gateway.
//!
//! All metric types use atomics internally (no locks on the hot path). The
//! `Metrics` struct is `Clone`-cheap (Arc-based registry + Arc-based
//! collectors).

use axum::body::Body;
use axum::extract::State;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::Response;
use prometheus::{Gauge, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry};
use std::sync::Arc;
use std::time::Instant;

use crate::api::handlers::AppState;

#[derive(Clone)]
pub struct Metrics {
    pub registry: Registry,

    pub http_requests_total: IntCounterVec,
    pub http_request_duration_seconds: HistogramVec,

    /// Gauges grounded on the `DistBackend` concurrency model: how many
    /// `<bucket>.kv` files are currently open, and cumulative time spent
    /// waiting on the owner/bucket lock hierarchy.
    pub dist_open_buckets: Gauge,
    pub dist_lock_wait_seconds: Gauge,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let http_requests_total = IntCounterVec::new(
            Opts::new("s3gate_http_requests_total", "Total HTTP requests by method, status, and operation"),
            &["method", "status", "operation"],
        )
        .unwrap();
        registry.register(Box::new(http_requests_total.clone())).unwrap();

        let http_request_duration_seconds = HistogramVec::new(
            HistogramOpts::new("s3gate_http_request_duration_seconds", "HTTP request duration in seconds"),
            &["method", "operation"],
        )
        .unwrap();
        registry.register(Box::new(http_request_duration_seconds.clone())).unwrap();

        let dist_open_buckets = Gauge::new("s3gate_dist_open_buckets", "Currently open DistBackend .kv files").unwrap();
        registry.register(Box::new(dist_open_buckets.clone())).unwrap();

        let dist_lock_wait_seconds = Gauge::new(
            "s3gate_dist_lock_wait_seconds",
            "Cumulative seconds spent waiting on DistBackend's owner/bucket lock hierarchy",
        )
        .unwrap();
        registry.register(Box::new(dist_lock_wait_seconds.clone())).unwrap();

        #[cfg(target_os = "linux")]
        {
            let pc = prometheus::process_collector::ProcessCollector::for_self();
            let _ = registry.register(Box::new(pc));
        }

        Metrics {
            registry,
            http_requests_total,
            http_request_duration_seconds,
            dist_open_buckets,
            dist_lock_wait_seconds,
        }
    }
}

/// Classify a request into a bounded operation label, mirroring the same
/// service/bucket/object path-segment counting the router's dispatch uses.
pub fn classify_s3_operation(method: &str, path: &str) -> &'static str {
    match path {
        "/health" => return "health",
        "/metrics" => return "metrics",
        _ => {}
    }

    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    match (method, segments.len()) {
        ("GET", 0) => "list_buckets",
        ("HEAD", 0) => "head_root",
        ("GET", 1) => "list_objects",
        ("PUT", 1) => "create_bucket",
        ("DELETE", 1) => "delete_bucket",
        ("HEAD", 1) => "head_bucket",
        ("GET", _) => "get_object",
        ("PUT", _) => "put_object",
        ("POST", _) => "post_object",
        ("DELETE", _) => "delete_object",
        _ => "unknown",
    }
}

/// Axum middleware that records HTTP request metrics.
pub async fn http_metrics_middleware(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let operation = classify_s3_operation(&method, &path);

    let start = Instant::now();
    let response = next.run(request).await;
    let duration = start.elapsed().as_secs_f64();

    let status = response.status().as_u16().to_string();
    state.metrics.http_requests_total.with_label_values(&[&method, &status, operation]).inc();
    state
        .metrics
        .http_request_duration_seconds
        .with_label_values(&[&method, operation])
        .observe(duration);

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_every_dispatch_level() {
        assert_eq!(classify_s3_operation("GET", "/health"), "health");
        assert_eq!(classify_s3_operation("GET", "/metrics"), "metrics");
        assert_eq!(classify_s3_operation("GET", "/"), "list_buckets");
        assert_eq!(classify_s3_operation("HEAD", "/"), "head_root");
        assert_eq!(classify_s3_operation("GET", "/mybucket"), "list_objects");
        assert_eq!(classify_s3_operation("PUT", "/mybucket"), "create_bucket");
        assert_eq!(classify_s3_operation("DELETE", "/mybucket"), "delete_bucket");
        assert_eq!(classify_s3_operation("HEAD", "/mybucket"), "head_bucket");
        assert_eq!(classify_s3_operation("GET", "/mybucket/mykey"), "get_object");
        assert_eq!(classify_s3_operation("PUT", "/mybucket/mykey"), "put_object");
        assert_eq!(classify_s3_operation("DELETE", "/mybucket/mykey"), "delete_object");
        assert_eq!(classify_s3_operation("GET", "/mybucket/deep/nested/key"), "get_object");
    }
}
