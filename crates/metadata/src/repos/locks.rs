//! Write lease repository.

use crate::error::MetadataResult;
use crate::models::LockRow;
use async_trait::async_trait;
use uuid::Uuid;

/// Repository for lock operations.
#[async_trait]
pub trait LockRepo: Send + Sync {
    /// Compare-and-set acquisition of the lock on `file_id`.
    ///
    /// A single statement succeeds when no row exists, when the existing row
    /// belongs to `holder` (refreshing its expiry and keeping `acquired_at_ms`
    /// while it is still live), or when the existing row has expired at
    /// `now_ms`. Returns the resulting row on success and `None` when a live
    /// lease belongs to someone else.
    async fn try_acquire_lock(
        &self,
        file_id: Uuid,
        holder: &str,
        now_ms: i64,
        expires_at_ms: i64,
    ) -> MetadataResult<Option<LockRow>>;

    /// Get the lock row for a file, expired or not.
    async fn get_lock(&self, file_id: Uuid) -> MetadataResult<Option<LockRow>>;

    /// Delete the lock if `holder` owns it. Returns whether a row was removed.
    async fn release_lock(&self, file_id: Uuid, holder: &str) -> MetadataResult<bool>;
}
