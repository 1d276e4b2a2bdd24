//! Version and cell change repository.

use crate::error::MetadataResult;
use crate::models::{CellChangeRow, VersionRow};
use async_trait::async_trait;
use uuid::Uuid;

/// Result of an atomic version commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// The version, its cell changes and the new head pointer were written.
    Committed,
    /// The head pointer no longer matched the expected value; nothing was written.
    Conflict {
        /// The head version number observed inside the transaction.
        current: i64,
    },
}

/// Repository for version operations.
#[async_trait]
pub trait VersionRepo: Send + Sync {
    /// Atomically insert a version with its cell changes and advance the file's
    /// `current_version_number` from `expected_current` to the new number.
    ///
    /// All three writes happen in one transaction: either the version row, every
    /// cell change row and the pointer update are visible, or none are.
    async fn commit_version(
        &self,
        version: &VersionRow,
        changes: &[CellChangeRow],
        expected_current: i64,
    ) -> MetadataResult<CommitOutcome>;

    /// Get a version by file and number.
    async fn get_version(
        &self,
        file_id: Uuid,
        version_number: i64,
    ) -> MetadataResult<Option<VersionRow>>;

    /// List versions of a file in ascending version number order.
    async fn list_versions(&self, file_id: Uuid) -> MetadataResult<Vec<VersionRow>>;

    /// Get the cell changes a version introduced, in emission order.
    async fn get_cell_changes(&self, version_id: Uuid) -> MetadataResult<Vec<CellChangeRow>>;

    /// Count the cell changes a version introduced.
    async fn count_cell_changes(&self, version_id: Uuid) -> MetadataResult<u64>;
}
