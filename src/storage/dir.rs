//! Flat-filesystem storage backend.
//!
//! Objects are stored as individual files directly under
//! `<root>/<owner>/<bucket>/`, named
//! `<b64url(key)>#<b64url(filename)>#<b64url(media)>#<b64url(md5)>`.
//! This keeps an object's full identity recoverable from its filename
//! alone, so a directory listing plus filename decode is enough to
//! reconstruct every `Object` without a side index.

use crate::storage::list_filter::ListFilter;
use crate::storage::traits::{GetResult, StorageBackend, StorageError};
use crate::types::{Bucket, Object, Owner};
use async_trait::async_trait;
use base64::Engine;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};

const B64: base64::engine::general_purpose::GeneralPurpose = base64::engine::general_purpose::URL_SAFE;

pub struct DirBackend {
    root: PathBuf,
}

impl DirBackend {
    pub async fn new(root: impl Into<PathBuf>) -> std::io::Result<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    fn owner_dir(&self, owner: &Owner) -> PathBuf {
        self.root.join(&owner.id)
    }

    fn bucket_dir(&self, owner: &Owner, bucket: &str) -> PathBuf {
        self.owner_dir(owner).join(bucket)
    }

    async fn list_entries(dir: &Path) -> std::io::Result<Vec<(String, tokio::fs::DirEntry)>> {
        let mut out = Vec::new();
        let mut rd = tokio::fs::read_dir(dir).await?;
        while let Some(entry) = rd.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            out.push((name, entry));
        }
        Ok(out)
    }
}

fn encode_filename(key: &str, filename: &str, media: &str, md5: &[u8]) -> String {
    [
        B64.encode(key.as_bytes()),
        B64.encode(filename.as_bytes()),
        B64.encode(media.as_bytes()),
        B64.encode(md5),
    ]
    .join("#")
}

struct DecodedName {
    key: String,
    filename: String,
    media: String,
    md5: Vec<u8>,
}

fn decode_filename(name: &str) -> Result<DecodedName, StorageError> {
    let parts: Vec<&str> = name.splitn(4, '#').collect();
    if parts.len() != 4 {
        return Err(StorageError::Internal(format!(
            "corrupt object filename: {name}"
        )));
    }
    let decode = |s: &str| {
        B64.decode(s)
            .map_err(|e| StorageError::Internal(format!("corrupt object filename: {e}")))
    };
    let key = String::from_utf8(decode(parts[0])?)
        .map_err(|e| StorageError::Internal(e.to_string()))?;
    let filename = String::from_utf8(decode(parts[1])?)
        .map_err(|e| StorageError::Internal(e.to_string()))?;
    let media = String::from_utf8(decode(parts[2])?)
        .map_err(|e| StorageError::Internal(e.to_string()))?;
    let md5 = decode(parts[3])?;
    Ok(DecodedName {
        key,
        filename,
        media,
        md5,
    })
}

#[async_trait]
impl StorageBackend for DirBackend {
    async fn list_buckets(&self, owner: &Owner) -> Result<Vec<Bucket>, StorageError> {
        let dir = self.owner_dir(owner);
        tokio::fs::create_dir_all(&dir).await?;
        let mut buckets = Vec::new();
        for (name, entry) in Self::list_entries(&dir).await? {
            let meta = entry.metadata().await?;
            if !meta.is_dir() {
                continue;
            }
            let created: DateTime<Utc> = meta.modified().map(DateTime::from).unwrap_or_else(|_| Utc::now());
            buckets.push(Bucket { name, created });
        }
        buckets.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(buckets)
    }

    async fn create_bucket(&self, owner: &Owner, bucket: &str) -> Result<(), StorageError> {
        tokio::fs::create_dir_all(self.bucket_dir(owner, bucket)).await?;
        Ok(())
    }

    async fn check_bucket(&self, owner: &Owner, bucket: &str) -> bool {
        tokio::fs::metadata(self.bucket_dir(owner, bucket))
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
    }

    async fn del_bucket(&self, owner: &Owner, bucket: &str) -> Result<(), StorageError> {
        let dir = self.bucket_dir(owner, bucket);
        let mut entries = tokio::fs::read_dir(&dir)
            .await
            .map_err(|_| StorageError::NoSuchBucket(bucket.to_string()))?;
        if entries.next_entry().await?.is_some() {
            return Err(StorageError::BucketNotEmpty(bucket.to_string()));
        }
        tokio::fs::remove_dir(&dir).await?;
        Ok(())
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
        let dir = self.bucket_dir(owner, bucket);
        if !self.check_bucket(owner, bucket).await {
            return Err(StorageError::NoSuchBucket(bucket.to_string()));
        }

        let mut decoded = Vec::new();
        for (name, entry) in Self::list_entries(&dir).await? {
            // Skip dotfiles: an in-flight or abandoned `.{name}.tmp` from
            // `put` (see below) is not yet, or never was, a committed
            // object and must not fail the whole listing.
            if name.starts_with('.') {
                continue;
            }
            let d = decode_filename(&name)?;
            let meta = entry.metadata().await?;
            decoded.push((d, meta));
        }
        // Sorted before filtering: a correctness fix over the reference
        // implementation, which filtered in raw (unordered) readdir order.
        decoded.sort_by(|a, b| a.0.key.cmp(&b.0.key));

        let mut filter = ListFilter::new(prefix, delimiter, marker, limit, skip);
        let mut objects = Vec::new();
        for (d, meta) in decoded {
            match filter.check(&d.key) {
                Ok(true) => {
                    let etag = if d.md5.len() == 16 {
                        hex::encode(&d.md5)
                    } else {
                        String::new()
                    };
                    let last_modified = meta.modified().map(DateTime::from).unwrap_or_else(|_| Utc::now());
                    objects.push(Object {
                        key: d.key,
                        last_modified,
                        etag,
                        size: meta.len(),
                        owner: owner.clone(),
                    });
                }
                Ok(false) => {}
                Err(()) => break,
            }
        }
        let (common_prefixes, truncated) = filter.result();
        Ok((objects, common_prefixes, truncated))
    }

    async fn put<'a>(
        &'a self,
        owner: &'a Owner,
        bucket: &'a str,
        key: &'a str,
        filename: &'a str,
        media_type: &'a str,
        mut body: Box<dyn AsyncRead + Send + Unpin + 'a>,
        _size: u64,
        md5: Option<&'a [u8]>,
    ) -> Result<(), StorageError> {
        let dir = self.bucket_dir(owner, bucket);
        if !self.check_bucket(owner, bucket).await {
            return Err(StorageError::NoSuchBucket(bucket.to_string()));
        }

        // Remove any existing entry for this key first (overwrite semantics).
        if let Some(existing) = find_file(&dir, key).await? {
            tokio::fs::remove_file(existing).await.ok();
        }

        let name = encode_filename(key, filename, media_type, md5.unwrap_or(&[]));
        let final_path = dir.join(&name);
        let tmp_path = dir.join(format!(".{name}.tmp"));
        let mut file = tokio::fs::File::create(&tmp_path).await?;
        if let Err(e) = write_and_rename(&mut file, &mut *body, &tmp_path, &final_path).await {
            tokio::fs::remove_file(&tmp_path).await.ok();
            return Err(e.into());
        }
        Ok(())
    }

    async fn get(&self, owner: &Owner, bucket: &str, key: &str) -> Result<GetResult, StorageError> {
        let dir = self.bucket_dir(owner, bucket);
        let path = find_file(&dir, key)
            .await?
            .ok_or_else(|| StorageError::NoSuchKey(key.to_string()))?;
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| StorageError::Internal("non-utf8 filename".into()))?;
        let decoded = decode_filename(name)?;
        let file = tokio::fs::File::open(&path).await?;
        let meta = file.metadata().await?;
        let size = meta.len();

        let md5 = if decoded.md5.len() == 16 {
            decoded.md5
        } else {
            let mut f = tokio::fs::File::open(&path).await?;
            let mut hasher = <md5::Md5 as md5::Digest>::new();
            let mut buf = [0u8; 64 * 1024];
            loop {
                let n = f.read(&mut buf).await?;
                if n == 0 {
                    break;
                }
                md5::Digest::update(&mut hasher, &buf[..n]);
            }
            md5::Digest::finalize(hasher).to_vec()
        };

        Ok(GetResult {
            filename: decoded.filename,
            media_type: decoded.media,
            body: Box::new(file),
            size,
            md5,
        })
    }

    async fn del(&self, owner: &Owner, bucket: &str, key: &str) -> Result<(), StorageError> {
        let dir = self.bucket_dir(owner, bucket);
        let path = find_file(&dir, key)
            .await?
            .ok_or_else(|| StorageError::NoSuchKey(key.to_string()))?;
        tokio::fs::remove_file(path).await?;
        Ok(())
    }

    async fn get_owner(&self, access_key: &str) -> Option<Owner> {
        Some(Owner::anonymous(access_key))
    }
}

async fn write_and_rename(
    file: &mut tokio::fs::File,
    body: &mut (dyn AsyncRead + Send + Unpin),
    tmp_path: &Path,
    final_path: &Path,
) -> std::io::Result<()> {
    tokio::io::copy(body, file).await?;
    file.flush().await?;
    tokio::fs::rename(tmp_path, final_path).await?;
    Ok(())
}

/// Linear scan for the file whose decoded key matches `key` exactly.
/// Mirrors the reference's `findFile`, but compares the decoded key
/// instead of the encoded-filename prefix so it can't be fooled by one
/// key being a base64 prefix of another.
async fn find_file(dir: &Path, key: &str) -> std::io::Result<Option<PathBuf>> {
    let mut rd = match tokio::fs::read_dir(dir).await {
        Ok(rd) => rd,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };
    while let Some(entry) = rd.next_entry().await? {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with('.') {
            continue;
        }
        if let Ok(decoded) = decode_filename(&name) {
            if decoded.key == key {
                return Ok(Some(entry.path()));
            }
        }
    }
    Ok(None)
}
