//! Diff output types.

use serde::{Deserialize, Serialize};
use sheetvault_core::{CellChange, ChangeType, VersionCounts};

/// Row and cell tallies for a diff.
///
/// `rows_added + rows_deleted + rows_modified + rows_unchanged` equals, summed
/// over sheets, the row count of the longer side.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffSummary {
    pub rows_added: u64,
    pub rows_modified: u64,
    pub rows_deleted: u64,
    pub rows_unchanged: u64,
    pub cells_changed: u64,
    pub critical_changes: u64,
}

impl DiffSummary {
    /// The three row counts persisted on a version.
    pub fn counts(&self) -> VersionCounts {
        VersionCounts {
            rows_added: self.rows_added,
            rows_modified: self.rows_modified,
            rows_deleted: self.rows_deleted,
        }
    }

    /// Total rows accounted for.
    pub fn total_rows(&self) -> u64 {
        self.rows_added + self.rows_deleted + self.rows_modified + self.rows_unchanged
    }
}

/// Structured changes between two snapshots.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DiffReport {
    /// Ordered by sheet, then row, then column.
    pub changes: Vec<CellChange>,
    pub summary: DiffSummary,
}

impl DiffReport {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Rebuild a report from previously stored changes and row counts.
    pub fn from_stored(changes: Vec<CellChange>, counts: VersionCounts, rows_unchanged: u64) -> Self {
        let critical_changes = changes.iter().filter(|c| c.is_critical).count() as u64;
        Self {
            summary: DiffSummary {
                rows_added: counts.rows_added,
                rows_modified: counts.rows_modified,
                rows_deleted: counts.rows_deleted,
                rows_unchanged,
                cells_changed: changes.len() as u64,
                critical_changes,
            },
            changes,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Changes of the given kind.
    pub fn changes_of(&self, change_type: ChangeType) -> impl Iterator<Item = &CellChange> {
        self.changes
            .iter()
            .filter(move |c| c.change_type == change_type)
    }

    /// Changes flagged critical.
    pub fn critical(&self) -> impl Iterator<Item = &CellChange> {
        self.changes.iter().filter(|c| c.is_critical)
    }
}
