//! Filesystem-backed content store.
//!
//! Layout under the root directory:
//!
//! ```text
//! blobs/<aa>/<sha256>     immutable payloads, addressed by content digest
//! meta/<sha256(key)>.json one StoredRecord per cache key
//! tmp/                    staging area for atomic renames
//! ```
//!
//! A record is only ever replaced by renaming a fully written file over it,
//! and always points at a blob that was completely written first, so
//! readers see either the old payload with its metadata or the new one.
//!
//! Blobs are reference counted by the records pointing at them. A blob is
//! removed once the last record referencing it is replaced or deleted, and
//! always after the replacing record has been committed.

use async_trait::async_trait;
use bytes::Bytes;
use comproxy_core::{AssetKind, CacheInfo, Content, ContentStore, Error, Result, StoreStats};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::keys::{digest, validate_key};
use crate::types::StoredRecord;

type BlobRefs = HashMap<String, usize>;

enum ReadError {
    BlobMissing(String),
    Store(Error),
}

impl From<Error> for ReadError {
    fn from(err: Error) -> Self {
        ReadError::Store(err)
    }
}

impl From<ReadError> for Error {
    fn from(err: ReadError) -> Self {
        match err {
            ReadError::BlobMissing(blob) => Error::Storage(format!("Missing blob {}", blob)),
            ReadError::Store(err) => err,
        }
    }
}

pub struct FilesystemStore {
    root_dir: PathBuf,
    // Records per blob digest. Writers hold it for the whole update. Readers take it only
    // to retry a read whose blob was reclaimed after its record was read.
    blob_refs: Mutex<BlobRefs>,
}

impl FilesystemStore {
    /// Open a store rooted at `root_dir`, creating its directories.
    ///
    /// Blobs no record references and leftover staging files are removed.
    pub async fn open(root_dir: impl Into<PathBuf>) -> Result<Self> {
        let root_dir = root_dir.into();
        for dir in ["blobs", "meta", "tmp"] {
            tokio::fs::create_dir_all(root_dir.join(dir))
                .await
                .map_err(|e| Error::Storage(format!("Failed to create store dir: {}", e)))?;
        }

        let store = Self {
            root_dir,
            blob_refs: Mutex::new(HashMap::new()),
        };

        let mut refs = BlobRefs::new();
        for record in store.load_records().await? {
            *refs.entry(record.blob).or_default() += 1;
        }
        store.sweep(&refs).await?;
        *store.blob_refs.lock().await = refs;

        Ok(store)
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    fn record_path(&self, key: &str) -> PathBuf {
        self.root_dir
            .join("meta")
            .join(format!("{}.json", digest(key.as_bytes())))
    }

    fn blob_path(&self, blob: &str) -> PathBuf {
        self.root_dir.join("blobs").join(&blob[..2]).join(blob)
    }

    async fn read_record(&self, key: &str) -> Result<Option<StoredRecord>> {
        match tokio::fs::read(self.record_path(key)).await {
            Ok(raw) => {
                let record: StoredRecord = serde_json::from_slice(&raw)
                    .map_err(|e| Error::Storage(format!("Corrupt record for {}: {}", key, e)))?;
                Ok(Some(record))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::Storage(format!("Failed to read record: {}", e))),
        }
    }

    async fn read_content(&self, path: &str) -> std::result::Result<Option<Content>, ReadError> {
        let Some(record) = self.read_record(path).await? else {
            return Ok(None);
        };

        match tokio::fs::read(self.blob_path(&record.blob)).await {
            Ok(payload) => Ok(Some(Content {
                payload: Bytes::from(payload),
                content_type: record.content_type,
                cache_info: record.cache_info,
            })),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(ReadError::BlobMissing(record.blob)),
            Err(e) => Err(Error::Storage(format!("Failed to read blob: {}", e)).into()),
        }
    }

    /// Record about to be replaced or removed. A corrupt one is overwritten.
    async fn previous_record(&self, key: &str) -> Result<Option<StoredRecord>> {
        match tokio::fs::read(self.record_path(key)).await {
            Ok(raw) => Ok(serde_json::from_slice(&raw)
                .inspect_err(|e| warn!(key, error = %e, "Replacing corrupt record"))
                .ok()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::Storage(format!("Failed to read record: {}", e))),
        }
    }

    /// Every readable record under `meta/`.
    async fn load_records(&self) -> Result<Vec<StoredRecord>> {
        let mut records = Vec::new();
        let mut read_dir = tokio::fs::read_dir(self.root_dir.join("meta"))
            .await
            .map_err(|e| Error::Storage(format!("Failed to read store dir: {}", e)))?;

        while let Some(entry) = read_dir
            .next_entry()
            .await
            .map_err(|e| Error::Storage(format!("Failed to read entry: {}", e)))?
        {
            let Ok(raw) = tokio::fs::read(entry.path()).await else {
                continue;
            };
            match serde_json::from_slice::<StoredRecord>(&raw) {
                Ok(record) => records.push(record),
                Err(e) => warn!(path = %entry.path().display(), error = %e, "Skipping unreadable record"),
            }
        }
        Ok(records)
    }

    /// Remove unreferenced blobs and staging leftovers.
    async fn sweep(&self, refs: &BlobRefs) -> Result<()> {
        let mut removed = 0usize;
        let mut shards = tokio::fs::read_dir(self.root_dir.join("blobs"))
            .await
            .map_err(|e| Error::Storage(format!("Failed to read blob dir: {}", e)))?;

        while let Some(shard) = shards
            .next_entry()
            .await
            .map_err(|e| Error::Storage(format!("Failed to read entry: {}", e)))?
        {
            let Ok(mut blobs) = tokio::fs::read_dir(shard.path()).await else {
                continue;
            };
            while let Ok(Some(blob)) = blobs.next_entry().await {
                let referenced = blob.file_name().to_str().is_some_and(|name| refs.contains_key(name));
                if !referenced && tokio::fs::remove_file(blob.path()).await.is_ok() {
                    removed += 1;
                }
            }
        }

        if let Ok(mut staging) = tokio::fs::read_dir(self.root_dir.join("tmp")).await {
            while let Ok(Some(entry)) = staging.next_entry().await {
                let _ = tokio::fs::remove_file(entry.path()).await;
            }
        }

        if removed > 0 {
            info!(removed, root = %self.root_dir.display(), "Removed unreferenced blobs");
        }
        Ok(())
    }

    /// Drop one reference to `blob`, deleting it with the last one.
    async fn release_blob(&self, refs: &mut BlobRefs, blob: &str) {
        let Some(count) = refs.get_mut(blob) else {
            return;
        };
        *count -= 1;
        if *count > 0 {
            return;
        }
        refs.remove(blob);

        match tokio::fs::remove_file(self.blob_path(blob)).await {
            Ok(()) => debug!(blob, "Removed unreferenced blob"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            // Swept on next open.
            Err(e) => warn!(blob, error = %e, "Failed to remove unreferenced blob"),
        }
    }

    /// Write `data` to `target` via a staging file and rename.
    async fn write_atomic(&self, target: &Path, data: &[u8]) -> Result<()> {
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::Storage(format!("Failed to create dir: {}", e)))?;
        }

        let staging = self.root_dir.join("tmp").join(Uuid::new_v4().to_string());
        tokio::fs::write(&staging, data)
            .await
            .map_err(|e| Error::Storage(format!("Failed to write staging file: {}", e)))?;

        if let Err(e) = tokio::fs::rename(&staging, target).await {
            let _ = tokio::fs::remove_file(&staging).await;
            return Err(Error::Storage(format!("Failed to commit {}: {}", target.display(), e)));
        }
        Ok(())
    }

    async fn write_record(&self, record: &StoredRecord) -> Result<()> {
        let raw = serde_json::to_vec(record)
            .map_err(|e| Error::Storage(format!("Failed to encode record: {}", e)))?;
        self.write_atomic(&self.record_path(&record.key), &raw).await
    }
}

#[async_trait]
impl ContentStore for FilesystemStore {
    async fn get(&self, path: &str) -> Result<Option<Content>> {
        match self.read_content(path).await {
            Err(ReadError::BlobMissing(blob)) => {
                // No blob is reclaimed while the lock is held.
                debug!(path, %blob, "Blob reclaimed during read, reloading record");
                let _refs = self.blob_refs.lock().await;
                match self.read_content(path).await {
                    Err(ReadError::BlobMissing(blob)) => {
                        warn!(path, %blob, "Record points at a missing blob, treating as absent");
                        Ok(None)
                    }
                    other => other.map_err(Error::from),
                }
            }
            other => other.map_err(Error::from),
        }
    }

    async fn put(&self, path: &str, content: Content, kind: AssetKind) -> Result<Content> {
        validate_key(path)?;
        let blob = digest(&content.payload);
        let blob_path = self.blob_path(&blob);

        let mut refs = self.blob_refs.lock().await;
        let previous = self.previous_record(path).await?;

        if !tokio::fs::try_exists(&blob_path).await.unwrap_or(false) {
            self.write_atomic(&blob_path, &content.payload).await?;
        }

        let record = StoredRecord {
            key: path.to_string(),
            kind,
            blob,
            size_bytes: content.size(),
            content_type: content.content_type.clone(),
            cache_info: content.cache_info.clone(),
        };
        self.write_record(&record).await?;

        *refs.entry(record.blob.clone()).or_default() += 1;
        if let Some(previous) = previous {
            self.release_blob(&mut refs, &previous.blob).await;
        }

        debug!(path, %kind, size = record.size_bytes, "Stored content on disk");
        Ok(content)
    }

    async fn set_cache_info(&self, path: &str, content: &Content, cache_info: CacheInfo) -> Result<()> {
        validate_key(path)?;
        let refs = self.blob_refs.lock().await;

        match self.read_record(path).await? {
            Some(mut record) => {
                record.cache_info = cache_info;
                self.write_record(&record).await
            }
            None => {
                drop(refs);
                let mut content = content.clone();
                content.cache_info = cache_info;
                let kind = comproxy_core::classify(path)
                    .map(|asset| asset.kind())
                    .map_err(|_| Error::Storage(format!("Cannot infer asset kind of {}", path)))?;
                self.put(path, content, kind).await.map(|_| ())
            }
        }
    }

    async fn delete(&self, path: &str) -> Result<bool> {
        let mut refs = self.blob_refs.lock().await;
        let previous = self.previous_record(path).await?;

        match tokio::fs::remove_file(self.record_path(path)).await {
            Ok(()) => {
                if let Some(previous) = previous {
                    self.release_blob(&mut refs, &previous.blob).await;
                }
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(Error::Storage(format!("Failed to delete record: {}", e))),
        }
    }

    async fn health_check(&self) -> Result<()> {
        for dir in ["blobs", "meta", "tmp"] {
            let metadata = tokio::fs::metadata(self.root_dir.join(dir))
                .await
                .map_err(|e| Error::Storage(format!("Store dir {} unavailable: {}", dir, e)))?;
            if !metadata.is_dir() {
                return Err(Error::Storage(format!("Store path {} is not a directory", dir)));
            }
        }
        Ok(())
    }

    async fn stats(&self) -> Result<StoreStats> {
        let records = self.load_records().await?;
        Ok(StoreStats {
            entries: records.len() as u64,
            total_bytes: records.iter().map(|record| record.size_bytes).sum(),
        })
    }
}
