//! Diff engine error types.

use thiserror::Error;

/// Errors raised while materializing a snapshot.
#[derive(Debug, Error)]
pub enum DiffError {
    #[error("invalid workbook: {0}")]
    Workbook(String),

    #[error("invalid csv at record {record}: {message}")]
    Csv { record: u64, message: String },

    #[error("document is not valid UTF-8 text")]
    NotUtf8,
}

impl From<calamine::Error> for DiffError {
    fn from(err: calamine::Error) -> Self {
        Self::Workbook(err.to_string())
    }
}

impl From<csv::Error> for DiffError {
    fn from(err: csv::Error) -> Self {
        let record = err.position().map(|p| p.record()).unwrap_or(0);
        match err.kind() {
            csv::ErrorKind::Utf8 { .. } => Self::NotUtf8,
            _ => Self::Csv {
                record,
                message: err.to_string(),
            },
        }
    }
}

/// Result type for diff operations.
pub type DiffResult<T> = std::result::Result<T, DiffError>;
