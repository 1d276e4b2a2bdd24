//! Immutable, numbered document versions.

use crate::file::FileId;
use crate::hash::ContentHash;
use serde::{Deserialize, Serialize};
use std::fmt;
use time::OffsetDateTime;
use uuid::Uuid;

/// Unique identifier of a single version record.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionId(Uuid);

impl VersionId {
    /// Generate a new random version ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID.
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for VersionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for VersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VersionId({})", self.0)
    }
}

impl fmt::Display for VersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Row-level change counts between a version and its parent.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionCounts {
    pub rows_added: u64,
    pub rows_modified: u64,
    pub rows_deleted: u64,
}

impl VersionCounts {
    /// True when no row was touched.
    pub fn is_empty(&self) -> bool {
        self.rows_added == 0 && self.rows_modified == 0 && self.rows_deleted == 0
    }
}

/// An immutable snapshot of a logical file.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Version {
    pub id: VersionId,
    pub file_id: FileId,
    /// Monotonic per file, starting at 1. Gaps are possible, duplicates are not.
    pub version_number: u32,
    /// The version this one was diffed against. `None` for the first version.
    pub parent_version_number: Option<u32>,
    pub content_hash: ContentHash,
    pub size_bytes: u64,
    pub created_by: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub change_summary: Option<String>,
    pub counts: VersionCounts,
    pub storage_path: String,
}

impl Version {
    /// Whether `self` was diffed directly against version `other`.
    pub fn is_child_of(&self, other: u32) -> bool {
        self.parent_version_number == Some(other)
    }
}
