//! Snapshot materialization and positional diffing for SheetVault.
//!
//! - [`Snapshot`] parses xlsx/xls/ods (calamine) or CSV bytes into sheets
//! - [`diff_snapshots`] aligns rows by position and reports cell changes

pub mod engine;
pub mod error;
pub mod report;
pub mod snapshot;

pub use engine::{DiffOptions, diff_snapshots};
pub use error::{DiffError, DiffResult};
pub use report::{DiffReport, DiffSummary};
pub use snapshot::{CellValue, Sheet, Snapshot, SnapshotFormat};

/// Parse both documents and diff them.
pub fn diff_bytes(old: &[u8], new: &[u8], options: &DiffOptions) -> DiffResult<DiffReport> {
    let old = Snapshot::from_bytes(old)?;
    let new = Snapshot::from_bytes(new)?;
    Ok(diff_snapshots(&old, &new, options))
}
