//! The external blob-store client contract consumed by `DistBackend`:
//! assign a file id, upload content against it, download by id, delete by
//! id. This gateway never implements a blob *server*, only the client
//! side of the two-phase put/delete protocol.

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};

#[derive(Debug, Error)]
pub enum BlobError {
    #[error("blob store request failed: {0}")]
    Request(String),
    #[error("no such blob: {0}")]
    NotFound(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Reserve a new file id ahead of upload, matching the seaweedfs
    /// assign/upload split so a failed upload never leaves a partially
    /// written blob addressable by a committed fid.
    async fn assign_fid(&self) -> Result<String, BlobError>;

    async fn upload_assigned<'a>(
        &'a self,
        fid: &'a str,
        body: Box<dyn AsyncRead + Send + Unpin + 'a>,
    ) -> Result<u64, BlobError>;

    async fn download(&self, fid: &str) -> Result<Box<dyn AsyncRead + Send + Unpin>, BlobError>;

    async fn delete(&self, fid: &str) -> Result<(), BlobError>;
}

/// Production implementation: an HTTP client against a SeaweedFS-style
/// master (for `assign`) and volume server (for upload/download/delete).
pub struct HttpBlobStore {
    client: reqwest::Client,
    master_url: String,
}

impl HttpBlobStore {
    pub fn new(master_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            master_url: master_url.into(),
        }
    }
}

#[async_trait]
impl BlobStore for HttpBlobStore {
    async fn assign_fid(&self) -> Result<String, BlobError> {
        #[derive(serde::Deserialize)]
        struct AssignResponse {
            fid: String,
        }
        let url = format!("{}/dir/assign", self.master_url.trim_end_matches('/'));
        let resp = self
            .client
            .post(&url)
            .send()
            .await
            .map_err(|e| BlobError::Request(e.to_string()))?
            .error_for_status()
            .map_err(|e| BlobError::Request(e.to_string()))?
            .json::<AssignResponse>()
            .await
            .map_err(|e| BlobError::Request(e.to_string()))?;
        Ok(resp.fid)
    }

    async fn upload_assigned<'a>(
        &'a self,
        fid: &'a str,
        mut body: Box<dyn AsyncRead + Send + Unpin + 'a>,
    ) -> Result<u64, BlobError> {
        let mut buf = Vec::new();
        body.read_to_end(&mut buf).await?;
        let size = buf.len() as u64;
        let url = format!("{}/{}", self.master_url.trim_end_matches('/'), fid);
        self.client
            .put(&url)
            .body(buf)
            .send()
            .await
            .map_err(|e| BlobError::Request(e.to_string()))?
            .error_for_status()
            .map_err(|e| BlobError::Request(e.to_string()))?;
        Ok(size)
    }

    async fn download(&self, fid: &str) -> Result<Box<dyn AsyncRead + Send + Unpin>, BlobError> {
        let url = format!("{}/{}", self.master_url.trim_end_matches('/'), fid);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| BlobError::Request(e.to_string()))?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(BlobError::NotFound(fid.to_string()));
        }
        let bytes = resp
            .error_for_status()
            .map_err(|e| BlobError::Request(e.to_string()))?
            .bytes()
            .await
            .map_err(|e| BlobError::Request(e.to_string()))?;
        Ok(Box::new(std::io::Cursor::new(bytes.to_vec())))
    }

    async fn delete(&self, fid: &str) -> Result<(), BlobError> {
        let url = format!("{}/{}", self.master_url.trim_end_matches('/'), fid);
        self.client
            .delete(&url)
            .send()
            .await
            .map_err(|e| BlobError::Request(e.to_string()))?;
        Ok(())
    }
}

/// Reference implementation backing a bare directory of files, keyed by a
/// monotonically assigned id. Used by tests and by deployments that pass a
/// filesystem path as `--blob-master` instead of standing up a real
/// SeaweedFS cluster.
pub struct LocalBlobStore {
    dir: PathBuf,
    counter: AtomicU64,
}

impl LocalBlobStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            counter: AtomicU64::new(1),
        }
    }

    fn path_for(&self, fid: &str) -> PathBuf {
        self.dir.join(fid)
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn assign_fid(&self) -> Result<String, BlobError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let id = self.counter.fetch_add(1, Ordering::SeqCst);
        Ok(format!("{id:016x}"))
    }

    async fn upload_assigned<'a>(
        &'a self,
        fid: &'a str,
        mut body: Box<dyn AsyncRead + Send + Unpin + 'a>,
    ) -> Result<u64, BlobError> {
        let path = self.path_for(fid);
        let mut file = tokio::fs::File::create(&path).await?;
        let written = tokio::io::copy(&mut body, &mut file).await?;
        file.flush().await?;
        Ok(written)
    }

    async fn download(&self, fid: &str) -> Result<Box<dyn AsyncRead + Send + Unpin>, BlobError> {
        let path = self.path_for(fid);
        let file = tokio::fs::File::open(&path)
            .await
            .map_err(|_| BlobError::NotFound(fid.to_string()))?;
        Ok(Box::new(file))
    }

    async fn delete(&self, fid: &str) -> Result<(), BlobError> {
        let path = self.path_for(fid);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[tokio::test]
    async fn local_blob_store_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path());
        let fid = store.assign_fid().await.unwrap();
        let written = store
            .upload_assigned(&fid, Box::new(Cursor::new(b"payload".to_vec())))
            .await
            .unwrap();
        assert_eq!(written, 7);

        let mut reader = store.download(&fid).await.unwrap();
        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"payload");

        store.delete(&fid).await.unwrap();
        assert!(store.download(&fid).await.is_err());
    }

    #[tokio::test]
    async fn assigned_fids_are_unique() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path());
        let a = store.assign_fid().await.unwrap();
        let b = store.assign_fid().await.unwrap();
        assert_ne!(a, b);
    }
}
