//! Distributed storage backend: ordered per-bucket metadata tables (one
//! `redb` database per `<owner>/<bucket>.kv` file) plus an external
//! content-addressed blob store reached through the `BlobStore` contract.
//!
//! Two-level lock hierarchy: a master lock guards the owner map, then each
//! owner's own lock guards its bucket map. Both locks are always dropped
//! before a `redb` transaction is opened — metadata mutation never happens
//! while holding either map lock, and nothing ever holds two bucket
//! transactions at once.

use crate::storage::blob::BlobStore;
use crate::storage::list_filter::ListFilter;
use crate::storage::traits::{GetResult, StorageBackend, StorageError};
use crate::types::{Bucket, Object, Owner};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use md5::Digest;
use parking_lot::Mutex;
use redb::{Database, ReadableTable, TableDefinition, WriteTransaction};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, ReadBuf};
use tracing::warn;

const OBJECTS: TableDefinition<&str, &[u8]> = TableDefinition::new("objects");

#[derive(Serialize, Deserialize)]
struct Record {
    filename: String,
    content_type: String,
    fid: String,
    created_millis: i64,
    size: u64,
    md5: Vec<u8>,
}

impl Record {
    fn encode(&self) -> Vec<u8> {
        bincode::serialize(self).expect("Record fields are all plain data")
    }

    fn decode(bytes: &[u8]) -> Result<Self, StorageError> {
        bincode::deserialize(bytes).map_err(|e| StorageError::Internal(format!("corrupt record: {e}")))
    }

    fn created(&self) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(self.created_millis)
            .single()
            .unwrap_or_else(Utc::now)
    }
}

/// Wraps an `AsyncRead` to compute its MD5 as it's streamed through,
/// without buffering. The hasher is shared so the digest can be read back
/// out after the wrapped reader has been fully consumed elsewhere (e.g. by
/// `BlobStore::upload_assigned`).
struct Md5Tee<R> {
    inner: R,
    hasher: Arc<Mutex<md5::Md5>>,
}

impl<R: AsyncRead + Unpin> AsyncRead for Md5Tee<R> {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<std::io::Result<()>> {
        let this = self.get_mut();
        let before = buf.filled().len();
        let poll = Pin::new(&mut this.inner).poll_read(cx, buf);
        if poll.is_ready() {
            let filled = &buf.filled()[before..];
            if !filled.is_empty() {
                this.hasher.lock().update(filled);
            }
        }
        poll
    }
}

fn insert_record(txn: &WriteTransaction, key: &str, record: &Record) -> Result<(), StorageError> {
    let mut table = txn.open_table(OBJECTS).map_err(|e| StorageError::Internal(e.to_string()))?;
    table
        .insert(key, record.encode().as_slice())
        .map_err(|e| StorageError::Internal(e.to_string()))?;
    Ok(())
}

struct BucketHandle {
    db: Database,
    created: DateTime<Utc>,
}

struct OwnerState {
    dir: PathBuf,
    buckets: Mutex<HashMap<String, Arc<BucketHandle>>>,
}

pub struct DistBackend {
    blob: Arc<dyn BlobStore>,
    meta_dir: PathBuf,
    owners: Mutex<HashMap<String, Arc<OwnerState>>>,
}

impl DistBackend {
    pub async fn new(meta_dir: impl Into<PathBuf>, blob: Arc<dyn BlobStore>) -> std::io::Result<Self> {
        let meta_dir = meta_dir.into();
        tokio::fs::create_dir_all(&meta_dir).await?;

        let mut owners = HashMap::new();
        let mut rd = tokio::fs::read_dir(&meta_dir).await?;
        while let Some(entry) = rd.next_entry().await? {
            if !entry.metadata().await?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            let state = open_owner(entry.path()).await?;
            owners.insert(name, Arc::new(state));
        }

        Ok(Self {
            blob,
            meta_dir,
            owners: Mutex::new(owners),
        })
    }

    /// Returns the owner's state, creating its directory entry (but not
    /// any buckets) if this is the first time it's been seen.
    fn owner_state(&self, owner: &Owner) -> Arc<OwnerState> {
        let mut owners = self.owners.lock();
        owners
            .entry(owner.id.clone())
            .or_insert_with(|| {
                Arc::new(OwnerState {
                    dir: self.meta_dir.join(&owner.id),
                    buckets: Mutex::new(HashMap::new()),
                })
            })
            .clone()
    }

    fn find_bucket(&self, owner: &Owner, bucket: &str) -> Option<Arc<BucketHandle>> {
        let state = self.owner_state(owner);
        let buckets = state.buckets.lock();
        buckets.get(bucket).cloned()
    }
}

async fn open_owner(dir: PathBuf) -> std::io::Result<OwnerState> {
    let mut buckets = HashMap::new();
    let mut rd = tokio::fs::read_dir(&dir).await?;
    while let Some(entry) = rd.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        let Some(bucket_name) = name.strip_suffix(".kv") else {
            continue;
        };
        let meta = entry.metadata().await?;
        let created = meta.modified().map(DateTime::from).unwrap_or_else(|_| Utc::now());
        let path = entry.path();
        let db = tokio::task::spawn_blocking(move || Database::create(path))
            .await
            .expect("blocking task panicked")
            .map_err(std::io::Error::other)?;
        buckets.insert(bucket_name.to_string(), Arc::new(BucketHandle { db, created }));
    }
    Ok(OwnerState { dir, buckets: Mutex::new(buckets) })
}

fn bucket_path(dir: &Path, bucket: &str) -> PathBuf {
    dir.join(format!("{bucket}.kv"))
}

#[async_trait]
impl StorageBackend for DistBackend {
    async fn list_buckets(&self, owner: &Owner) -> Result<Vec<Bucket>, StorageError> {
        let state = self.owner_state(owner);
        let buckets = state.buckets.lock();
        let mut out: Vec<Bucket> = buckets
            .iter()
            .map(|(name, handle)| Bucket {
                name: name.clone(),
                created: handle.created,
            })
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(out)
    }

    async fn create_bucket(&self, owner: &Owner, bucket: &str) -> Result<(), StorageError> {
        let state = self.owner_state(owner);
        {
            let buckets = state.buckets.lock();
            if buckets.contains_key(bucket) {
                return Ok(()); // idempotent, matches the reference backend
            }
        }
        tokio::fs::create_dir_all(&state.dir).await?;
        let path = bucket_path(&state.dir, bucket);
        let db = tokio::task::spawn_blocking(move || Database::create(path))
            .await
            .expect("blocking task panicked")
            .map_err(|e| StorageError::Internal(e.to_string()))?;

        let mut buckets = state.buckets.lock();
        buckets
            .entry(bucket.to_string())
            .or_insert_with(|| Arc::new(BucketHandle { db, created: Utc::now() }));
        Ok(())
    }

    async fn check_bucket(&self, owner: &Owner, bucket: &str) -> bool {
        self.find_bucket(owner, bucket).is_some()
    }

    async fn del_bucket(&self, owner: &Owner, bucket: &str) -> Result<(), StorageError> {
        let state = self.owner_state(owner);
        let handle = {
            let buckets = state.buckets.lock();
            buckets
                .get(bucket)
                .cloned()
                .ok_or_else(|| StorageError::NoSuchBucket(bucket.to_string()))?
        };

        let is_empty = tokio::task::spawn_blocking({
            let db = handle.clone();
            move || -> Result<bool, StorageError> {
                let txn = db.db.begin_read().map_err(|e| StorageError::Internal(e.to_string()))?;
                let table = match txn.open_table(OBJECTS) {
                    Ok(t) => t,
                    Err(redb::TableError::TableDoesNotExist(_)) => return Ok(true),
                    Err(e) => return Err(StorageError::Internal(e.to_string())),
                };
                let is_empty = table.iter().map_err(|e| StorageError::Internal(e.to_string()))?.next().is_none();
                Ok(is_empty)
            }
        })
        .await
        .expect("blocking task panicked")?;

        if !is_empty {
            return Err(StorageError::BucketNotEmpty(bucket.to_string()));
        }

        {
            let mut buckets = state.buckets.lock();
            buckets.remove(bucket);
        }
        let path = bucket_path(&state.dir, bucket);
        tokio::fs::remove_file(path).await.ok();
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
        let handle = self
            .find_bucket(owner, bucket)
            .ok_or_else(|| StorageError::NoSuchBucket(bucket.to_string()))?;
        let owner = owner.clone();
        let prefix = prefix.to_string();
        let delimiter = delimiter.to_string();
        let marker = marker.to_string();

        tokio::task::spawn_blocking(move || -> Result<(Vec<Object>, Vec<String>, bool), StorageError> {
            let txn = handle.db.begin_read().map_err(|e| StorageError::Internal(e.to_string()))?;
            let table = match txn.open_table(OBJECTS) {
                Ok(t) => t,
                Err(redb::TableError::TableDoesNotExist(_)) => {
                    return Ok((Vec::new(), Vec::new(), false))
                }
                Err(e) => return Err(StorageError::Internal(e.to_string())),
            };

            let mut filter = ListFilter::new(&prefix, &delimiter, &marker, limit, skip);
            let mut objects = Vec::new();
            for entry in table.iter().map_err(|e| StorageError::Internal(e.to_string()))? {
                let (key, value) = entry.map_err(|e| StorageError::Internal(e.to_string()))?;
                let key = key.value().to_string();
                match filter.check(&key) {
                    Ok(true) => {
                        let record = Record::decode(value.value())?;
                        let etag = if record.md5.len() == 16 {
                            hex::encode(&record.md5)
                        } else {
                            String::new()
                        };
                        objects.push(Object {
                            key,
                            last_modified: record.created(),
                            etag,
                            size: record.size,
                            owner: owner.clone(),
                        });
                    }
                    Ok(false) => {}
                    Err(()) => break,
                }
            }
            let (common_prefixes, truncated) = filter.result();
            Ok((objects, common_prefixes, truncated))
        })
        .await
        .expect("blocking task panicked")
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
        let handle = self
            .find_bucket(owner, bucket)
            .ok_or_else(|| StorageError::NoSuchBucket(bucket.to_string()))?;

        // 1. Begin the transaction before a fid even exists, so the key's
        // metadata slot is reserved up front.
        let txn = {
            let handle = handle.clone();
            tokio::task::spawn_blocking(move || handle.db.begin_write())
                .await
                .expect("blocking task panicked")
                .map_err(|e| StorageError::Internal(e.to_string()))?
        };

        // 2. Reserve a fid.
        let fid = self
            .blob
            .assign_fid()
            .await
            .map_err(|e| StorageError::Internal(e.to_string()))?;

        // 3. Provisional record, written before a single byte of the blob
        // has moved, so a crash mid-upload leaves a fid reference rather
        // than no record at all.
        let created_millis = Utc::now().timestamp_millis();
        let provisional = Record {
            filename: filename.to_string(),
            content_type: media_type.to_string(),
            fid: fid.clone(),
            created_millis,
            size,
            md5: md5.unwrap_or(&[]).to_vec(),
        };
        let key_owned = key.to_string();
        let txn = {
            let key_owned = key_owned.clone();
            tokio::task::spawn_blocking(move || -> Result<WriteTransaction, StorageError> {
                insert_record(&txn, &key_owned, &provisional)?;
                Ok(txn)
            })
            .await
            .expect("blocking task panicked")?
        };

        // 4. Stream the body straight through to the blob store, tee-ing
        // an MD5 as it passes if the caller didn't already compute one.
        let hasher = md5.is_none().then(|| Arc::new(Mutex::new(md5::Md5::new())));
        let upload_body: Box<dyn AsyncRead + Send + Unpin + '_> = match &hasher {
            Some(h) => Box::new(Md5Tee { inner: body, hasher: h.clone() }),
            None => body,
        };
        if let Err(e) = self.blob.upload_assigned(&fid, upload_body).await {
            // 5. Roll back: dropping the transaction without committing
            // discards the provisional record. The blob upload itself
            // already failed, so nothing was orphaned.
            drop(txn);
            return Err(StorageError::Internal(format!("error uploading to {fid}: {e}")));
        }

        let md5 = match md5 {
            Some(m) => m.to_vec(),
            None => hasher.expect("set when md5 was None").lock().clone().finalize().to_vec(),
        };

        // 6. Finalize the record with the real digest and commit.
        let record = Record {
            filename: filename.to_string(),
            content_type: media_type.to_string(),
            fid: fid.clone(),
            created_millis,
            size,
            md5,
        };
        let commit_result = tokio::task::spawn_blocking(move || -> Result<(), StorageError> {
            insert_record(&txn, &key_owned, &record)?;
            txn.commit().map_err(|e| StorageError::Internal(e.to_string()))
        })
        .await
        .expect("blocking task panicked");

        if let Err(e) = commit_result {
            // The blob is already durably stored at this point; deleting it
            // best-effort would only risk masking the real error with a
            // second failure. Orphan it and let an operator reconcile.
            warn!(fid = %fid, error = %e, "metadata commit failed after blob upload; fid orphaned");
            return Err(e);
        }
        Ok(())
    }

    async fn get(&self, owner: &Owner, bucket: &str, key: &str) -> Result<GetResult, StorageError> {
        let handle = self
            .find_bucket(owner, bucket)
            .ok_or_else(|| StorageError::NoSuchBucket(bucket.to_string()))?;
        let key_owned = key.to_string();

        let record = tokio::task::spawn_blocking(move || -> Result<Record, StorageError> {
            let txn = handle.db.begin_read().map_err(|e| StorageError::Internal(e.to_string()))?;
            let table = txn.open_table(OBJECTS).map_err(|e| StorageError::Internal(e.to_string()))?;
            let value = table
                .get(key_owned.as_str())
                .map_err(|e| StorageError::Internal(e.to_string()))?
                .ok_or_else(|| StorageError::NoSuchKey(key_owned.clone()))?;
            Record::decode(value.value())
        })
        .await
        .expect("blocking task panicked")?;

        let body = self
            .blob
            .download(&record.fid)
            .await
            .map_err(|e| StorageError::Internal(e.to_string()))?;

        Ok(GetResult {
            filename: record.filename,
            media_type: record.content_type,
            body,
            size: record.size,
            md5: record.md5,
        })
    }

    async fn del(&self, owner: &Owner, bucket: &str, key: &str) -> Result<(), StorageError> {
        let handle = self
            .find_bucket(owner, bucket)
            .ok_or_else(|| StorageError::NoSuchBucket(bucket.to_string()))?;
        let key_owned = key.to_string();

        let (fid, commit_result) = tokio::task::spawn_blocking(move || -> Result<(String, Result<(), StorageError>), StorageError> {
            let txn = handle.db.begin_write().map_err(|e| StorageError::Internal(e.to_string()))?;
            let fid;
            {
                let mut table = txn.open_table(OBJECTS).map_err(|e| StorageError::Internal(e.to_string()))?;
                let removed = table
                    .remove(key_owned.as_str())
                    .map_err(|e| StorageError::Internal(e.to_string()))?
                    .ok_or_else(|| StorageError::NoSuchKey(key_owned.clone()))?;
                let record = Record::decode(removed.value())?;
                fid = record.fid;
            }
            let commit = txn.commit().map_err(|e| StorageError::Internal(e.to_string()));
            Ok((fid, commit))
        })
        .await
        .expect("blocking task panicked")?;

        commit_result?;

        self.blob
            .delete(&fid)
            .await
            .map_err(|e| StorageError::Internal(e.to_string()))?;
        Ok(())
    }

    /// Looks up a provisioned secret at `<meta-dir>/<access-key>/.secret`,
    /// falling back to an empty-secret anonymous owner when absent. This
    /// lets a deployment opt into real signature checking by dropping a
    /// secret file into an owner's directory, without changing the wire
    /// protocol or requiring every owner to have one.
    async fn get_owner(&self, access_key: &str) -> Option<Owner> {
        let secret_path = self.meta_dir.join(access_key).join(".secret");
        match tokio::fs::read(&secret_path).await {
            Ok(secret) => Some(Owner::new(access_key, access_key, secret)),
            Err(_) => Some(Owner::anonymous(access_key)),
        }
    }
}

/// One decoded metadata record, as reported by [`dump_meta_dir`].
#[derive(Serialize)]
pub struct DumpRecord {
    pub object: String,
    pub value: serde_json::Value,
}

#[derive(Serialize)]
pub struct DumpBucket {
    pub name: String,
    pub records: Vec<DumpRecord>,
}

#[derive(Serialize)]
pub struct DumpOwner {
    pub owner: String,
    pub buckets: Vec<DumpBucket>,
}

/// Walks every `<owner>/<bucket>.kv` file under `meta_dir` and decodes its
/// `objects` table, for the `dump` CLI subcommand. Opens each database
/// independently of any running [`DistBackend`] so it can be run offline
/// against a gateway's data directory.
pub fn dump_meta_dir(meta_dir: &Path) -> std::io::Result<Vec<DumpOwner>> {
    let mut owners = Vec::new();
    let mut owner_entries: Vec<_> = std::fs::read_dir(meta_dir)?.collect::<Result<_, _>>()?;
    owner_entries.sort_by_key(|e| e.file_name());

    for owner_entry in owner_entries {
        if !owner_entry.metadata()?.is_dir() {
            continue;
        }
        let owner_name = owner_entry.file_name().to_string_lossy().into_owned();
        let mut bucket_entries: Vec<_> = std::fs::read_dir(owner_entry.path())?.collect::<Result<_, _>>()?;
        bucket_entries.sort_by_key(|e| e.file_name());

        let mut buckets = Vec::new();
        for bucket_entry in bucket_entries {
            let name = bucket_entry.file_name().to_string_lossy().into_owned();
            let Some(bucket_name) = name.strip_suffix(".kv") else {
                continue;
            };
            let db = Database::open(bucket_entry.path())
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;
            let txn = db
                .begin_read()
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;
            let mut records = Vec::new();
            match txn.open_table(OBJECTS) {
                Ok(table) => {
                    for entry in table.iter().map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))? {
                        let (key, value) = entry.map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;
                        let record = Record::decode(value.value())
                            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;
                        records.push(DumpRecord {
                            object: key.value().to_string(),
                            value: serde_json::json!({
                                "filename": record.filename,
                                "content_type": record.content_type,
                                "fid": record.fid,
                                "created": record.created().to_rfc3339(),
                                "size": record.size,
                                "md5": hex::encode(&record.md5),
                            }),
                        });
                    }
                }
                Err(redb::TableError::TableDoesNotExist(_)) => {}
                Err(e) => return Err(std::io::Error::new(std::io::ErrorKind::Other, e.to_string())),
            }
            buckets.push(DumpBucket { name: bucket_name.to_string(), records });
        }
        owners.push(DumpOwner { owner: owner_name, buckets });
    }
    Ok(owners)
}
