//! Engine error taxonomy.

use serde::Serialize;
use sheetvault_diff::DiffError;
use sheetvault_metadata::MetadataError;
use sheetvault_storage::StorageError;
use std::fmt;
use time::OffsetDateTime;

/// Stable error category, for callers that branch on the kind of failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    LockHeld,
    VersionConflict,
    NotFound,
    StorageFailure,
    DiffComputationTimeout,
    InvalidDocument,
    InvalidRequest,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LockHeld => "lock_held",
            Self::VersionConflict => "version_conflict",
            Self::NotFound => "not_found",
            Self::StorageFailure => "storage_failure",
            Self::DiffComputationTimeout => "diff_computation_timeout",
            Self::InvalidDocument => "invalid_document",
            Self::InvalidRequest => "invalid_request",
        }
    }

    /// Whether retrying against freshly read state can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::LockHeld | Self::VersionConflict)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Engine operation errors.
///
/// Driver errors never escape raw: database and filesystem failures are
/// folded into [`EngineError::StorageFailure`] with their message.
#[derive(Clone, Debug, thiserror::Error)]
pub enum EngineError {
    #[error("lock held by {holder} until {expires_at}")]
    LockHeld {
        holder: String,
        expires_at: OffsetDateTime,
    },

    #[error("version conflict: expected current version {expected}, found {current}")]
    VersionConflict { expected: u32, current: u32 },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("storage failure: {0}")]
    StorageFailure(String),

    #[error("diff computation exceeded {timeout_ms}ms")]
    DiffComputationTimeout { timeout_ms: u64 },

    #[error("invalid document: {0}")]
    InvalidDocument(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::LockHeld { .. } => ErrorKind::LockHeld,
            Self::VersionConflict { .. } => ErrorKind::VersionConflict,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::StorageFailure(_) => ErrorKind::StorageFailure,
            Self::DiffComputationTimeout { .. } => ErrorKind::DiffComputationTimeout,
            Self::InvalidDocument(_) => ErrorKind::InvalidDocument,
            Self::InvalidRequest(_) => ErrorKind::InvalidRequest,
        }
    }
}

impl From<MetadataError> for EngineError {
    fn from(err: MetadataError) -> Self {
        match err {
            MetadataError::NotFound(what) => Self::NotFound(what),
            other => Self::StorageFailure(other.to_string()),
        }
    }
}

impl From<StorageError> for EngineError {
    fn from(err: StorageError) -> Self {
        // Metadata decides what exists; a missing blob behind a committed
        // version is a storage fault.
        Self::StorageFailure(err.to_string())
    }
}

impl From<DiffError> for EngineError {
    fn from(err: DiffError) -> Self {
        Self::InvalidDocument(err.to_string())
    }
}

impl From<sheetvault_core::Error> for EngineError {
    fn from(err: sheetvault_core::Error) -> Self {
        Self::InvalidRequest(err.to_string())
    }
}

/// Result type for engine operations.
pub type EngineResult<T> = std::result::Result<T, EngineError>;
