//! Cell-level change records.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of change a single cell underwent.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    /// The cell belongs to a row that only exists in the newer snapshot.
    Added,
    /// The cell's normalized value differs between aligned rows.
    Modified,
    /// The cell belongs to a row that only exists in the older snapshot.
    Deleted,
}

impl ChangeType {
    /// Stable lowercase name, as stored in the metadata database.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Added => "added",
            Self::Modified => "modified",
            Self::Deleted => "deleted",
        }
    }

    /// Parse from the stored name.
    pub fn parse(s: &str) -> crate::Result<Self> {
        match s {
            "added" => Ok(Self::Added),
            "modified" => Ok(Self::Modified),
            "deleted" => Ok(Self::Deleted),
            other => Err(crate::Error::UnknownChangeType(other.to_string())),
        }
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single-cell delta between two snapshots.
///
/// Only changed cells are ever represented; unchanged columns of a modified
/// row have no record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CellChange {
    pub sheet_name: String,
    /// Position in the aligned data-row space (header excluded, 0-based).
    pub row_index: u64,
    pub column_name: String,
    pub change_type: ChangeType,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub is_critical: bool,
}
