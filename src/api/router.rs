//! Three-level HTTP dispatch (service / bucket / object) plus the
//! virtual-host rewrite that lets `{bucket}.{service_host}` addressing and
//! path-style addressing share one axum route table.

use super::errors::S3Error;
use super::handlers::{self, AppState};
use axum::body::Body;
use axum::http::{Request, Uri};
use axum::routing::get;
use axum::Router;
use futures::future::BoxFuture;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};
use tower_http::trace::TraceLayer;

/// Catches any verb a route's `MethodRouter` doesn't recognize, so callers
/// get the spec's `<Error>` envelope instead of axum's bare 405.
async fn method_not_allowed() -> S3Error {
    S3Error::MethodNotAllowed
}

pub fn build_router(state: Arc<AppState>) -> Router {
    let service_host = state.service_host.clone();

    let app = Router::new()
        .route("/health", get(handlers::status::health_check).fallback(method_not_allowed))
        .route("/metrics", get(handlers::status::metrics_handler).fallback(method_not_allowed))
        .route(
            "/",
            get(handlers::service::list_buckets)
                .head(handlers::status::head_root)
                .fallback(method_not_allowed),
        )
        .route(
            "/:bucket",
            get(handlers::bucket::list_objects)
                .put(handlers::bucket::create_bucket)
                .delete(handlers::bucket::delete_bucket)
                .head(handlers::bucket::head_bucket)
                .fallback(method_not_allowed),
        )
        .route(
            "/:bucket/*key",
            get(handlers::object::get_object)
                .put(handlers::object::put_object)
                .post(handlers::object::post_object)
                .delete(handlers::object::delete_object)
                .fallback(method_not_allowed),
        )
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            crate::metrics::http_metrics_middleware,
        ))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    app.layer(VirtualHostLayer {
        service_host: Arc::new(service_host),
    })
}

/// Rewrites `{bucket}.{service_host}` (and bucket-less, `service_host`-free)
/// `Host` headers into an equivalent path-style request, so every route
/// above only ever has to deal with `/bucket` and `/bucket/key` paths.
#[derive(Clone)]
struct VirtualHostLayer {
    service_host: Arc<String>,
}

impl<S> Layer<S> for VirtualHostLayer {
    type Service = VirtualHostMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        VirtualHostMiddleware {
            inner,
            service_host: self.service_host.clone(),
        }
    }
}

#[derive(Clone)]
struct VirtualHostMiddleware<S> {
    inner: S,
    service_host: Arc<String>,
}

impl<S> Service<Request<Body>> for VirtualHostMiddleware<S>
where
    S: Service<Request<Body>> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<Body>) -> Self::Future {
        // Service-level endpoints (/, /health, /metrics) are host-independent.
        let path = req.uri().path();
        if path == "/" || path == "/health" || path == "/metrics" {
            let mut inner = self.inner.clone();
            return Box::pin(async move { inner.call(req).await });
        }

        let host = req
            .headers()
            .get("host")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        if let Some(bucket) = crate::api::auth::router_bucket_from_host(&host, &self.service_host) {
            if let Some(rewritten) = rewrite_uri(req.uri(), &bucket) {
                *req.uri_mut() = rewritten;
            }
        }

        let mut inner = self.inner.clone();
        Box::pin(async move { inner.call(req).await })
    }
}

fn rewrite_uri(uri: &Uri, bucket: &str) -> Option<Uri> {
    let path = uri.path();
    let new_path = if path == "/" {
        format!("/{bucket}")
    } else {
        format!("/{bucket}{path}")
    };
    let new_path_and_query = match uri.query() {
        Some(q) => format!("{new_path}?{q}"),
        None => new_path,
    };
    new_path_and_query.parse().ok()
}
