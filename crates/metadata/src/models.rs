//! Database models mapping to the metadata schema.

use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

// =============================================================================
// Logical files
// =============================================================================

/// Logical file record.
#[derive(Debug, Clone, FromRow)]
pub struct FileRow {
    pub file_id: Uuid,
    pub display_name: String,
    pub project_ref: Option<String>,
    /// Number of the committed head version (0 before the first commit).
    pub current_version_number: i64,
    /// Highest version number ever allocated. Never decreases, so numbers from
    /// failed commits are not reused.
    pub version_counter: i64,
    pub storage_prefix: String,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

// =============================================================================
// Versions
// =============================================================================

/// Immutable version record.
#[derive(Debug, Clone, FromRow)]
pub struct VersionRow {
    pub version_id: Uuid,
    pub file_id: Uuid,
    pub version_number: i64,
    pub parent_version_number: Option<i64>,
    pub content_hash: String,
    pub size_bytes: i64,
    pub created_by: String,
    pub created_at: OffsetDateTime,
    pub change_summary: Option<String>,
    pub rows_added: i64,
    pub rows_modified: i64,
    pub rows_deleted: i64,
    /// Aligned rows with no differing cell; lets a stored diff report a
    /// complete summary without re-reading the snapshots.
    pub rows_unchanged: i64,
    pub storage_path: String,
}

/// Cell change introduced by a version.
#[derive(Debug, Clone, FromRow)]
pub struct CellChangeRow {
    pub change_id: Uuid,
    pub version_id: Uuid,
    /// Emission order within the version's diff.
    pub position: i64,
    pub sheet_name: String,
    pub row_index: i64,
    pub column_name: String,
    pub change_type: String, // "added", "modified", "deleted"
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub is_critical: bool,
}

// =============================================================================
// Locks
// =============================================================================

/// Write lease record. Times are unix milliseconds so that expiry can be
/// compared inside the acquisition statement.
#[derive(Debug, Clone, FromRow)]
pub struct LockRow {
    pub file_id: Uuid,
    pub holder: String,
    pub acquired_at_ms: i64,
    pub expires_at_ms: i64,
}

impl LockRow {
    /// Whether the lease is logically absent at `now_ms`.
    pub fn is_expired_at(&self, now_ms: i64) -> bool {
        now_ms >= self.expires_at_ms
    }
}

/// Convert a timestamp to unix milliseconds.
pub fn to_unix_ms(t: OffsetDateTime) -> i64 {
    i64::try_from(t.unix_timestamp_nanos() / 1_000_000).unwrap_or(i64::MAX)
}

/// Convert unix milliseconds back to a UTC timestamp.
pub fn from_unix_ms(ms: i64) -> OffsetDateTime {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(ms) * 1_000_000)
        .unwrap_or(OffsetDateTime::UNIX_EPOCH)
}
