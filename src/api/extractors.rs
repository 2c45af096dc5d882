//! Axum extractors that wire request authentication and path validation
//! into handler signatures.

use super::auth::{self, CanonicalRequest};
use super::errors::S3Error;
use super::handlers::AppState;
use crate::types::{is_valid_bucket_name, Owner};
use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts, Path},
    http::request::Parts,
};
use std::sync::Arc;

/// The authenticated caller, resolved by recomputing the AWS v2 signature
/// against the configured service host and the backend's access-key table.
#[derive(Debug, Clone)]
pub struct AuthenticatedOwner(pub Owner);

#[async_trait]
impl<S> FromRequestParts<S> for AuthenticatedOwner
where
    S: Send + Sync,
    Arc<AppState>: FromRef<S>,
{
    type Rejection = S3Error;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app_state = Arc::<AppState>::from_ref(state);

        let host = parts
            .headers
            .get("host")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        let request_target = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or(parts.uri.path());

        let req = CanonicalRequest {
            method: parts.method.as_str(),
            headers: &parts.headers,
            host,
            service_host: &app_state.service_host,
            request_target,
        };

        let owner = auth::authenticate(app_state.backend.as_ref(), &req).await?;
        Ok(AuthenticatedOwner(owner))
    }
}

/// A path segment validated as a well-formed bucket name. Does not check
/// that the bucket exists — handlers that need existence ask the backend.
#[derive(Debug, Clone)]
pub struct BucketName(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for BucketName
where
    S: Send + Sync,
{
    type Rejection = S3Error;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(bucket): Path<String> =
            Path::from_request_parts(parts, state).await.map_err(|_| S3Error::MalformedRequest)?;
        if !is_valid_bucket_name(&bucket) {
            return Err(S3Error::MalformedRequest);
        }
        Ok(BucketName(bucket))
    }
}

/// A validated bucket name plus the remainder of the path as an object key,
/// normalized by stripping any leading slash the wildcard segment leaves in.
#[derive(Debug, Clone)]
pub struct ObjectPath {
    pub bucket: String,
    pub key: String,
}

#[async_trait]
impl<S> FromRequestParts<S> for ObjectPath
where
    S: Send + Sync,
{
    type Rejection = S3Error;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path((bucket, key)): Path<(String, String)> = Path::from_request_parts(parts, state)
            .await
            .map_err(|_| S3Error::MalformedRequest)?;
        if !is_valid_bucket_name(&bucket) {
            return Err(S3Error::MalformedRequest);
        }
        let key = key.trim_start_matches('/').to_string();
        if key.is_empty() {
            return Err(S3Error::MalformedRequest);
        }
        Ok(ObjectPath { bucket, key })
    }
}
