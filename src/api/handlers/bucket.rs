//! Bucket-level handlers: CREATE, DELETE, HEAD, LIST.

use super::{xml_response, AppState};
use crate::api::errors::S3Error;
use crate::api::extractors::{AuthenticatedOwner, BucketName};
use crate::api::xml::{ListBucketResult, ObjectEntry};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use std::sync::Arc;
use tracing::{info, instrument};

#[derive(Debug, serde::Deserialize, Default)]
pub struct ListQuery {
    pub prefix: Option<String>,
    pub delimiter: Option<String>,
    pub marker: Option<String>,
    #[serde(rename = "max-keys")]
    pub max_keys: Option<u64>,
    /// Extension beyond stock S3: skip this many enumerated names before
    /// prefix/delimiter filtering even runs.
    #[serde(rename = "skip-keys")]
    pub skip_keys: Option<u64>,
}

#[instrument(skip(state))]
pub async fn create_bucket(
    State(state): State<Arc<AppState>>,
    AuthenticatedOwner(owner): AuthenticatedOwner,
    BucketName(bucket): BucketName,
) -> Result<Response, S3Error> {
    info!(%bucket, owner = %owner.id, "create bucket");
    state.backend.create_bucket(&owner, &bucket).await?;
    Ok((StatusCode::OK, [("Location", format!("/{bucket}"))]).into_response())
}

#[instrument(skip(state))]
pub async fn delete_bucket(
    State(state): State<Arc<AppState>>,
    AuthenticatedOwner(owner): AuthenticatedOwner,
    BucketName(bucket): BucketName,
) -> Result<Response, S3Error> {
    info!(%bucket, owner = %owner.id, "delete bucket");
    state.backend.del_bucket(&owner, &bucket).await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

#[instrument(skip(state))]
pub async fn head_bucket(
    State(state): State<Arc<AppState>>,
    AuthenticatedOwner(owner): AuthenticatedOwner,
    BucketName(bucket): BucketName,
) -> Result<Response, S3Error> {
    if state.backend.check_bucket(&owner, &bucket).await {
        Ok(StatusCode::OK.into_response())
    } else {
        Err(S3Error::NoSuchBucket(bucket))
    }
}

#[instrument(skip(state))]
pub async fn list_objects(
    State(state): State<Arc<AppState>>,
    AuthenticatedOwner(owner): AuthenticatedOwner,
    BucketName(bucket): BucketName,
    Query(query): Query<ListQuery>,
) -> Result<Response, S3Error> {
    let prefix = query.prefix.clone().unwrap_or_default();
    let delimiter = query.delimiter.clone().unwrap_or_default();
    let marker = query.marker.clone().unwrap_or_default();
    let max_keys = query.max_keys.unwrap_or(1000);
    let skip_keys = query.skip_keys.unwrap_or(0);

    info!(%bucket, %prefix, owner = %owner.id, "list objects");

    let (objects, common_prefixes, is_truncated) = state
        .backend
        .list(&owner, &bucket, &prefix, &delimiter, &marker, max_keys, skip_keys)
        .await?;

    let result = ListBucketResult {
        name: bucket,
        prefix,
        marker,
        delimiter,
        max_keys,
        is_truncated,
        contents: objects
            .into_iter()
            .map(|o| ObjectEntry { key: o.key, size: o.size, last_modified: o.last_modified, etag: o.etag })
            .collect(),
        common_prefixes,
    };
    Ok(xml_response(result.to_xml()))
}
