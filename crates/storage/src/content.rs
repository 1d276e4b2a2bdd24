//! Content-addressed blob storage on top of an [`ObjectStore`].
//!
//! Blobs live at `<prefix>/objects/<shard>/<sha256-hex>`, where `prefix` is the
//! owning file's storage prefix. Writing identical bytes twice under the same
//! prefix stores them once.

use crate::error::{StorageError, StorageResult};
use crate::traits::ObjectStore;
use bytes::Bytes;
use sheetvault_core::ContentHash;
use std::sync::Arc;

/// Payloads larger than this are hashed on the blocking pool (1 MiB).
pub const BLOCKING_HASH_THRESHOLD: usize = 1024 * 1024;

/// Result of storing a blob.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredBlob {
    pub hash: ContentHash,
    pub key: String,
    pub size: u64,
    /// `false` when an identical blob was already present.
    pub inserted: bool,
}

/// Content-addressed blob store.
#[derive(Clone)]
pub struct ContentStore {
    objects: Arc<dyn ObjectStore>,
}

impl ContentStore {
    pub fn new(objects: Arc<dyn ObjectStore>) -> Self {
        Self { objects }
    }

    /// The underlying object store.
    pub fn objects(&self) -> &Arc<dyn ObjectStore> {
        &self.objects
    }

    /// Object key for a blob with `hash` under `prefix`.
    pub fn key_for(prefix: &str, hash: &ContentHash) -> String {
        let prefix = prefix.trim_end_matches('/');
        format!("{prefix}/objects/{}/{}", hash.shard(), hash.to_hex())
    }

    /// SHA-256 of `data`, computed off the async workers when it is large.
    pub async fn hash(data: &Bytes) -> StorageResult<ContentHash> {
        if data.len() <= BLOCKING_HASH_THRESHOLD {
            return Ok(ContentHash::compute(data));
        }
        let data = data.clone();
        tokio::task::spawn_blocking(move || ContentHash::compute(&data))
            .await
            .map_err(|e| StorageError::Io(std::io::Error::other(e)))
    }

    /// Hash `data` and store it under `prefix` unless already present.
    pub async fn put(&self, prefix: &str, data: Bytes) -> StorageResult<StoredBlob> {
        let hash = Self::hash(&data).await?;
        self.put_hashed(prefix, hash, data).await
    }

    /// Store `data` whose hash the caller already computed.
    pub async fn put_hashed(
        &self,
        prefix: &str,
        hash: ContentHash,
        data: Bytes,
    ) -> StorageResult<StoredBlob> {
        let key = Self::key_for(prefix, &hash);
        let size = data.len() as u64;
        let inserted = self.objects.put_if_not_exists(&key, data).await?;

        if inserted {
            tracing::debug!(key = %key, size, "stored new blob");
        } else {
            tracing::debug!(key = %key, "blob already present, deduplicated");
        }

        Ok(StoredBlob {
            hash,
            key,
            size,
            inserted,
        })
    }

    /// Fetch a blob and verify it against `expected`.
    pub async fn get(&self, key: &str, expected: &ContentHash) -> StorageResult<Bytes> {
        let data = self.objects.get(key).await?;
        let actual = Self::hash(&data).await?;
        if actual != *expected {
            return Err(StorageError::HashMismatch {
                key: key.to_string(),
                expected: expected.to_hex(),
                actual: actual.to_hex(),
            });
        }
        Ok(data)
    }

    /// Whether a blob with `hash` exists under `prefix`.
    pub async fn contains(&self, prefix: &str, hash: &ContentHash) -> StorageResult<bool> {
        self.objects.exists(&Self::key_for(prefix, hash)).await
    }

    /// All blob keys stored under `prefix`.
    pub async fn list(&self, prefix: &str) -> StorageResult<Vec<String>> {
        let root = format!("{}/objects", prefix.trim_end_matches('/'));
        self.objects.list(&root).await
    }
}
