//! Storage backend trait definitions.
//!
//! Every concrete backend (`DirBackend`, `DistBackend`) implements this
//! trait; handlers only ever see `Box<dyn StorageBackend>`.

use crate::types::{Bucket, Object, Owner};
use async_trait::async_trait;
use thiserror::Error;
use tokio::io::AsyncRead;

/// Errors that can occur during storage operations, mapped 1:1 onto the
/// S3 error codes in `api::errors::S3Error`.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("malformed request: {0}")]
    MalformedRequest(String),

    #[error("content-md5 mismatch")]
    BadDigest,

    #[error("no such bucket: {0}")]
    NoSuchBucket(String),

    #[error("no such key: {0}")]
    NoSuchKey(String),

    #[error("bucket not empty: {0}")]
    BucketNotEmpty(String),

    #[error("method not allowed")]
    MethodNotAllowed,

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<std::io::Error> for StorageError {
    fn from(e: std::io::Error) -> Self {
        StorageError::Internal(e.to_string())
    }
}

/// The result of a successful `get`.
pub struct GetResult {
    pub filename: String,
    pub media_type: String,
    pub body: Box<dyn AsyncRead + Send + Unpin>,
    pub size: u64,
    pub md5: Vec<u8>,
}

/// Abstract storage backend for S3-like object storage.
///
/// Object-safe so it can be used behind `Box<dyn StorageBackend>`.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    async fn list_buckets(&self, owner: &Owner) -> Result<Vec<Bucket>, StorageError>;

    async fn create_bucket(&self, owner: &Owner, bucket: &str) -> Result<(), StorageError>;

    async fn check_bucket(&self, owner: &Owner, bucket: &str) -> bool;

    async fn del_bucket(&self, owner: &Owner, bucket: &str) -> Result<(), StorageError>;

    #[allow(clippy::too_many_arguments)]
    async fn list(
        &self,
        owner: &Owner,
        bucket: &str,
        prefix: &str,
        delimiter: &str,
        marker: &str,
        limit: u64,
        skip: u64,
    ) -> Result<(Vec<Object>, Vec<String>, bool), StorageError>;

    #[allow(clippy::too_many_arguments)]
    async fn put<'a>(
        &'a self,
        owner: &'a Owner,
        bucket: &'a str,
        key: &'a str,
        filename: &'a str,
        media_type: &'a str,
        body: Box<dyn AsyncRead + Send + Unpin + 'a>,
        size: u64,
        md5: Option<&'a [u8]>,
    ) -> Result<(), StorageError>;

    async fn get(&self, owner: &Owner, bucket: &str, key: &str) -> Result<GetResult, StorageError>;

    async fn del(&self, owner: &Owner, bucket: &str, key: &str) -> Result<(), StorageError>;

    /// Resolve an access key to the `Owner` that should sign/own requests
    /// using it, or `None` if the access key is unrecognized.
    async fn get_owner(&self, access_key: &str) -> Option<Owner>;
}

/// Generate the blanket `impl StorageBackend for Box<dyn StorageBackend>`
/// that forwards every method through dynamic dispatch.
macro_rules! impl_storage_backend_for_box {
    () => {
        #[async_trait]
        impl StorageBackend for Box<dyn StorageBackend> {
            async fn list_buckets(&self, owner: &Owner) -> Result<Vec<Bucket>, StorageError> {
                (**self).list_buckets(owner).await
            }
            async fn create_bucket(&self, owner: &Owner, bucket: &str) -> Result<(), StorageError> {
                (**self).create_bucket(owner, bucket).await
            }
            async fn check_bucket(&self, owner: &Owner, bucket: &str) -> bool {
                (**self).check_bucket(owner, bucket).await
            }
            async fn del_bucket(&self, owner: &Owner, bucket: &str) -> Result<(), StorageError> {
                (**self).del_bucket(owner, bucket).await
            }
            async fn list(
                &self,
                owner: &Owner,
                bucket: &str,
                prefix: &str,
                delimiter: &str,
                marker: &str,
                limit: u64,
                skip: u64,
            ) -> Result<(Vec<Object>, Vec<String>, bool), StorageError> {
                (**self).list(owner, bucket, prefix, delimiter, marker, limit, skip).await
            }
            async fn put<'a>(
                &'a self,
                owner: &'a Owner,
                bucket: &'a str,
                key: &'a str,
                filename: &'a str,
                media_type: &'a str,
                body: Box<dyn AsyncRead + Send + Unpin + 'a>,
                size: u64,
                md5: Option<&'a [u8]>,
            ) -> Result<(), StorageError> {
                (**self).put(owner, bucket, key, filename, media_type, body, size, md5).await
            }
            async fn get(&self, owner: &Owner, bucket: &str, key: &str) -> Result<GetResult, StorageError> {
                (**self).get(owner, bucket, key).await
            }
            async fn del(&self, owner: &Owner, bucket: &str, key: &str) -> Result<(), StorageError> {
                (**self).del(owner, bucket, key).await
            }
            async fn get_owner(&self, access_key: &str) -> Option<Owner> {
                (**self).get_owner(access_key).await
            }
        }
    };
}

impl_storage_backend_for_box!();
