//! S3 API error envelope.
//!
//! Maps directly onto the error kinds table: each variant carries its own
//! HTTP status and renders the same `<Error>` XML shape clients expect.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum S3Error {
    #[error("bad URI, unparseable form, or bad parameters")]
    MalformedRequest,

    #[error("Content-MD5 does not match the computed digest")]
    BadDigest,

    #[error("missing or garbled auth header and no presigned params")]
    NoAuthorization,

    #[error("recomputed signature does not match the one provided")]
    SignatureMismatch,

    #[error("the specified bucket does not exist")]
    NoSuchBucket(String),

    #[error("the specified key does not exist")]
    NoSuchKey(String),

    #[error("the bucket you tried to delete is not empty")]
    BucketNotEmpty(String),

    #[error("wrong verb at this dispatch level")]
    MethodNotAllowed,

    #[error("internal error: {0}")]
    InternalError(String),
}

impl S3Error {
    pub fn code(&self) -> &'static str {
        match self {
            S3Error::MalformedRequest => "MalformedRequest",
            S3Error::BadDigest => "BadDigest",
            S3Error::NoAuthorization => "NoAuthorization",
            S3Error::SignatureMismatch => "SignatureMismatch",
            S3Error::NoSuchBucket(_) => "NoSuchBucket",
            S3Error::NoSuchKey(_) => "NoSuchKey",
            S3Error::BucketNotEmpty(_) => "BucketNotEmpty",
            S3Error::MethodNotAllowed => "MethodNotAllowed",
            S3Error::InternalError(_) => "InternalError",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            S3Error::MalformedRequest => StatusCode::BAD_REQUEST,
            S3Error::BadDigest => StatusCode::BAD_REQUEST,
            S3Error::NoAuthorization => StatusCode::BAD_REQUEST,
            S3Error::SignatureMismatch => StatusCode::FORBIDDEN,
            S3Error::NoSuchBucket(_) => StatusCode::NOT_FOUND,
            S3Error::NoSuchKey(_) => StatusCode::NOT_FOUND,
            S3Error::BucketNotEmpty(_) => StatusCode::CONFLICT,
            S3Error::MethodNotAllowed => StatusCode::BAD_REQUEST,
            S3Error::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn resource(&self) -> &str {
        match self {
            S3Error::NoSuchBucket(r) | S3Error::NoSuchKey(r) | S3Error::BucketNotEmpty(r) => r,
            _ => "",
        }
    }

    pub fn to_xml(&self) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<Error>
    <Code>{}</Code>
    <Message>{}</Message>
    <Resource>{}</Resource>
    <RequestId>00000000-0000-0000-0000-000000000000</RequestId>
</Error>"#,
            self.code(),
            self,
            self.resource(),
        )
    }
}

impl IntoResponse for S3Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = self.to_xml();
        tracing::warn!(code = self.code(), status = %status, "request failed");
        (status, [("Content-Type", "application/xml")], body).into_response()
    }
}

impl From<crate::storage::StorageError> for S3Error {
    fn from(err: crate::storage::StorageError) -> Self {
        use crate::storage::StorageError as SE;
        match err {
            SE::MalformedRequest(_) => S3Error::MalformedRequest,
            SE::BadDigest => S3Error::BadDigest,
            SE::NoSuchBucket(b) => S3Error::NoSuchBucket(b),
            SE::NoSuchKey(k) => S3Error::NoSuchKey(k),
            SE::BucketNotEmpty(b) => S3Error::BucketNotEmpty(b),
            SE::MethodNotAllowed => S3Error::MethodNotAllowed,
            SE::Internal(e) => S3Error::InternalError(e),
        }
    }
}
