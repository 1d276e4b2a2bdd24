//! Logical file identity.

use serde::{Deserialize, Serialize};
use std::fmt;
use time::OffsetDateTime;
use uuid::Uuid;

/// Persistent identifier of a document across all of its versions.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileId(Uuid);

impl FileId {
    /// Generate a new random file ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID.
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Parse from a string.
    pub fn parse(s: &str) -> crate::Result<Self> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|e| crate::Error::InvalidId(format!("invalid file ID: {e}")))
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Object key prefix under which this file's blobs are stored.
    pub fn storage_prefix(&self) -> String {
        format!("files/{}", self.0)
    }
}

impl Default for FileId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FileId({})", self.0)
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for FileId {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        Self::parse(s)
    }
}

/// A document tracked across versions. Never deleted.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LogicalFile {
    pub id: FileId,
    pub display_name: String,
    /// Opaque reference to the owning project, if any.
    pub project_ref: Option<String>,
    /// 0 until the first version is committed.
    pub current_version_number: u32,
    pub storage_prefix: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl LogicalFile {
    /// Whether any version has been committed yet.
    pub fn has_versions(&self) -> bool {
        self.current_version_number > 0
    }
}
