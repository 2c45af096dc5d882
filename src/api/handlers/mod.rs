//! S3 request handlers, split by dispatch level:
//! - `service` — `GET /` (ListBuckets)
//! - `bucket` — bucket CRUD and listing
//! - `object` — object GET/PUT/POST/DELETE
//! - `status` — health check and metrics

pub mod bucket;
pub mod object;
pub mod service;
pub mod status;

use crate::metrics::Metrics;
use crate::storage::StorageBackend;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use std::sync::Arc;

/// Shared application state, reachable from every handler via `State<Arc<AppState>>`.
pub struct AppState {
    pub backend: Box<dyn StorageBackend>,
    /// The host this gateway answers to at the service level. Requests whose
    /// `Host` header extends this by one label are bucket-level, virtual-hosted
    /// requests; empty disables virtual-host addressing entirely (path-style only).
    pub service_host: String,
    pub metrics: Arc<Metrics>,
}

fn xml_response(xml: impl Into<String>) -> Response {
    (StatusCode::OK, [("Content-Type", "application/xml")], xml.into()).into_response()
}

fn hval(s: &str) -> HeaderValue {
    HeaderValue::from_bytes(s.as_bytes()).unwrap_or_else(|_| HeaderValue::from_static(""))
}
