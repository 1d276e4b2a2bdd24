//! Lock manager: time-boxed exclusive write leases.
//!
//! Locking is advisory. Version creation never checks for a lease; callers
//! that want single-writer discipline acquire one first.

use crate::convert::lease_from_row;
use crate::error::{EngineError, EngineResult};
use crate::metrics;
use sheetvault_core::{FileId, HolderId, Lease};
use sheetvault_metadata::MetadataStore;
use sheetvault_metadata::models::{from_unix_ms, to_unix_ms};
use std::sync::Arc;
use time::{Duration, OffsetDateTime};

/// Grants, refreshes and releases leases stored in the metadata database.
#[derive(Clone)]
pub struct LockManager {
    metadata: Arc<dyn MetadataStore>,
    ttl: Duration,
}

impl LockManager {
    pub fn new(metadata: Arc<dyn MetadataStore>, ttl: Duration) -> Self {
        Self { metadata, ttl }
    }

    /// Lease duration.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Acquire or refresh the lease on `file_id` for `holder`.
    pub async fn acquire(&self, file_id: FileId, holder: &HolderId) -> EngineResult<Lease> {
        self.acquire_at(file_id, holder, OffsetDateTime::now_utc())
            .await
    }

    /// Acquire as of `now`.
    ///
    /// Succeeds when the file has no lease, when the lease already belongs to
    /// `holder` (extending it and keeping its acquisition time), or when the
    /// existing lease has expired. Fails with `LockHeld` otherwise.
    #[tracing::instrument(skip_all, fields(file_id = %file_id, holder = %holder))]
    pub async fn acquire_at(
        &self,
        file_id: FileId,
        holder: &HolderId,
        now: OffsetDateTime,
    ) -> EngineResult<Lease> {
        if self.metadata.get_file(*file_id.as_uuid()).await?.is_none() {
            return Err(EngineError::NotFound(format!("file {file_id}")));
        }

        let expires_at = now.checked_add(self.ttl).ok_or_else(|| {
            EngineError::InvalidRequest(format!("lock ttl {} is out of range", self.ttl))
        })?;
        let now_ms = to_unix_ms(now);
        let expires_at_ms = to_unix_ms(expires_at);

        // A competing lease can be released between the failed CAS and the
        // read that explains it; one more CAS settles that case.
        for _ in 0..2 {
            if let Some(row) = self
                .metadata
                .try_acquire_lock(*file_id.as_uuid(), holder.as_str(), now_ms, expires_at_ms)
                .await?
            {
                metrics::LOCKS_ACQUIRED.inc();
                let lease = lease_from_row(row)?;
                tracing::debug!(expires_at = %lease.expires_at, "lock acquired");
                return Ok(lease);
            }

            if let Some(row) = self.metadata.get_lock(*file_id.as_uuid()).await?
                && !row.is_expired_at(now_ms)
            {
                metrics::LOCK_CONTENTION.inc();
                tracing::debug!(current_holder = %row.holder, "lock held by another holder");
                return Err(EngineError::LockHeld {
                    holder: row.holder,
                    expires_at: from_unix_ms(row.expires_at_ms),
                });
            }
        }

        Err(EngineError::StorageFailure(format!(
            "lock state for file {file_id} changed during acquisition"
        )))
    }

    /// Release the lease if `holder` owns it.
    ///
    /// Returns `false` when there is no lease or someone else holds it.
    #[tracing::instrument(skip_all, fields(file_id = %file_id, holder = %holder))]
    pub async fn release(&self, file_id: FileId, holder: &HolderId) -> EngineResult<bool> {
        let released = self
            .metadata
            .release_lock(*file_id.as_uuid(), holder.as_str())
            .await?;
        tracing::debug!(released, "lock release");
        Ok(released)
    }

    /// The live lease on `file_id`, if any.
    pub async fn current(&self, file_id: FileId) -> EngineResult<Option<Lease>> {
        self.current_at(file_id, OffsetDateTime::now_utc()).await
    }

    /// The lease live at `now`. Expired rows are reported as absent.
    pub async fn current_at(
        &self,
        file_id: FileId,
        now: OffsetDateTime,
    ) -> EngineResult<Option<Lease>> {
        match self.metadata.get_lock(*file_id.as_uuid()).await? {
            Some(row) if !row.is_expired_at(to_unix_ms(now)) => Ok(Some(lease_from_row(row)?)),
            _ => Ok(None),
        }
    }
}
