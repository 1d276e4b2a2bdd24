//! Logical file repository.

use crate::error::MetadataResult;
use crate::models::FileRow;
use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

/// Repository for logical file operations.
#[async_trait]
pub trait FileRepo: Send + Sync {
    /// Create a new file record. Fails with `AlreadyExists` on a duplicate ID.
    async fn create_file(&self, file: &FileRow) -> MetadataResult<()>;

    /// Get a file by ID.
    async fn get_file(&self, file_id: Uuid) -> MetadataResult<Option<FileRow>>;

    /// List all files, most recently updated first.
    async fn list_files(&self) -> MetadataResult<Vec<FileRow>>;

    /// Atomically allocate the next version number.
    ///
    /// Increments `version_counter` only while `current_version_number` still
    /// equals `expected_current`, returning the new counter value. Returns
    /// `None` when another writer has moved the head in the meantime (or the
    /// file does not exist). The counter is never decremented, so a number
    /// handed out here is never handed out again even if the commit fails.
    async fn allocate_version_number(
        &self,
        file_id: Uuid,
        expected_current: i64,
        updated_at: OffsetDateTime,
    ) -> MetadataResult<Option<i64>>;
}
