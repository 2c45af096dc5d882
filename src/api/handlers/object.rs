//! Object-level handlers: GET, PUT, POST (multipart form upload), DELETE.

use super::{hval, AppState};
use crate::api::errors::S3Error;
use crate::api::extractors::{AuthenticatedOwner, ObjectPath};
use crate::storage::TempSpool;
use axum::body::Body;
use axum::extract::{Multipart, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use futures::TryStreamExt;
use std::sync::Arc;
use tokio_util::io::StreamReader;
use tracing::{info, instrument};

fn base64_decode(input: &str) -> Option<Vec<u8>> {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.decode(input.trim()).ok()
}

/// Extract `filename=...` from a `Content-Disposition: attachment; filename=...`
/// header, unquoting if present.
fn content_disposition_filename(headers: &HeaderMap) -> Option<String> {
    let value = headers.get("content-disposition")?.to_str().ok()?;
    let (_, rest) = value.split_once("filename=")?;
    Some(rest.trim().trim_matches('"').to_string())
}

fn default_filename(key: &str) -> String {
    key.rsplit('/').next().unwrap_or(key).to_string()
}

fn etag_header(md5: &[u8]) -> String {
    format!("\"{}\"", hex::encode(md5))
}

#[instrument(skip(state, body))]
pub async fn put_object(
    State(state): State<Arc<AppState>>,
    AuthenticatedOwner(owner): AuthenticatedOwner,
    ObjectPath { bucket, key }: ObjectPath,
    headers: HeaderMap,
    body: Body,
) -> Result<Response, S3Error> {
    let media_type = headers
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/octet-stream")
        .to_string();
    let filename = content_disposition_filename(&headers).unwrap_or_else(|| default_filename(&key));

    let reader = StreamReader::new(body.into_data_stream().map_err(std::io::Error::other));
    let (spool, size, digest) = TempSpool::capture_with_md5(reader, 0)
        .await
        .map_err(|e| S3Error::InternalError(e.to_string()))?;
    let computed = digest.to_vec();

    if let Some(header_val) = headers.get("content-md5").and_then(|v| v.to_str().ok()) {
        let expected = base64_decode(header_val).ok_or(S3Error::MalformedRequest)?;
        if expected != computed {
            return Err(S3Error::BadDigest);
        }
    }

    info!(%bucket, %key, size, owner = %owner.id, "put object");
    state
        .backend
        .put(&owner, &bucket, &key, &filename, &media_type, Box::new(spool), size, Some(&computed))
        .await?;

    Ok((StatusCode::OK, [("ETag", etag_header(&computed))]).into_response())
}

/// `POST /{bucket}/{key}` with a multipart form whose `file` field supplies
/// body, filename, and media type.
#[instrument(skip(state, multipart))]
pub async fn post_object(
    State(state): State<Arc<AppState>>,
    AuthenticatedOwner(owner): AuthenticatedOwner,
    ObjectPath { bucket, key }: ObjectPath,
    mut multipart: Multipart,
) -> Result<Response, S3Error> {
    while let Some(field) = multipart.next_field().await.map_err(|_| S3Error::MalformedRequest)? {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field.file_name().map(str::to_string).unwrap_or_else(|| default_filename(&key));
        let media_type = field.content_type().map(str::to_string).unwrap_or_else(|| "application/octet-stream".to_string());

        let reader = StreamReader::new(field.map_err(std::io::Error::other));
        let (spool, size, digest) = TempSpool::capture_with_md5(reader, 0)
            .await
            .map_err(|e| S3Error::InternalError(e.to_string()))?;
        let computed = digest.to_vec();

        info!(%bucket, %key, size, owner = %owner.id, "post object (multipart)");
        state
            .backend
            .put(&owner, &bucket, &key, &filename, &media_type, Box::new(spool), size, Some(&computed))
            .await?;
        return Ok((StatusCode::OK, [("ETag", etag_header(&computed))]).into_response());
    }
    Err(S3Error::MalformedRequest)
}

#[instrument(skip(state))]
pub async fn get_object(
    State(state): State<Arc<AppState>>,
    AuthenticatedOwner(owner): AuthenticatedOwner,
    ObjectPath { bucket, key }: ObjectPath,
) -> Result<Response, S3Error> {
    info!(%bucket, %key, owner = %owner.id, "get object");
    let result = state.backend.get(&owner, &bucket, &key).await?;

    let mut headers = HeaderMap::new();
    headers.insert("Content-Type", hval(&result.media_type));
    headers.insert("Content-Length", hval(&result.size.to_string()));
    headers.insert("ETag", hval(&etag_header(&result.md5)));
    headers.insert(
        "Content-Disposition",
        hval(&format!("attachment; filename=\"{}\"", result.filename)),
    );

    let stream = tokio_util::io::ReaderStream::new(result.body);
    Ok((StatusCode::OK, headers, Body::from_stream(stream)).into_response())
}

#[instrument(skip(state))]
pub async fn delete_object(
    State(state): State<Arc<AppState>>,
    AuthenticatedOwner(owner): AuthenticatedOwner,
    ObjectPath { bucket, key }: ObjectPath,
) -> Result<Response, S3Error> {
    info!(%bucket, %key, owner = %owner.id, "delete object");
    state.backend.del(&owner, &bucket, &key).await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}
