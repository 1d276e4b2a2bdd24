//! Human-readable rendering of engine results.

use sheetvault_core::{Lease, LogicalFile, Version};
use sheetvault_diff::DiffReport;
use sheetvault_engine::{UploadResult, VersionOutcome};
use std::fmt::Write;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

fn timestamp(t: OffsetDateTime) -> String {
    t.format(&Rfc3339).unwrap_or_else(|_| t.to_string())
}

pub fn upload(result: &UploadResult) -> String {
    match &result.outcome {
        VersionOutcome::Unchanged(_) => format!(
            "file {}: content unchanged, still at version {}\n",
            result.file_id, result.version_number
        ),
        VersionOutcome::Created(created) => {
            let counts = created.version.counts;
            format!(
                "file {}: created version {} ({} added, {} modified, {} deleted rows; {} cell changes)\n",
                result.file_id,
                result.version_number,
                counts.rows_added,
                counts.rows_modified,
                counts.rows_deleted,
                created.report.changes.len()
            )
        }
    }
}

pub fn history(versions: &[Version]) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:>7}  {:<24}  {:<25}  {:>6}  {:>6}  {:>6}  SUMMARY",
        "VERSION", "AUTHOR", "CREATED", "ADDED", "MOD", "DEL"
    );
    for v in versions {
        let _ = writeln!(
            out,
            "{:>7}  {:<24}  {:<25}  {:>6}  {:>6}  {:>6}  {}",
            v.version_number,
            v.created_by,
            timestamp(v.created_at),
            v.counts.rows_added,
            v.counts.rows_modified,
            v.counts.rows_deleted,
            v.change_summary.as_deref().unwrap_or("-")
        );
    }
    out
}

fn value(v: &Option<String>) -> &str {
    v.as_deref().unwrap_or("∅")
}

/// Summary line plus up to `limit` changes.
pub fn diff(report: &DiffReport, limit: usize) -> String {
    let s = &report.summary;
    let mut out = format!(
        "{} added, {} modified, {} deleted, {} unchanged rows; {} cell changes ({} critical)\n",
        s.rows_added, s.rows_modified, s.rows_deleted, s.rows_unchanged, s.cells_changed, s.critical_changes
    );
    for change in report.changes.iter().take(limit) {
        let _ = writeln!(
            out,
            "{}{}!{}[{}] {}: {} -> {}",
            if change.is_critical { "* " } else { "  " },
            change.sheet_name,
            change.column_name,
            change.row_index,
            change.change_type,
            value(&change.old_value),
            value(&change.new_value)
        );
    }
    if report.changes.len() > limit {
        let _ = writeln!(out, "  ... {} more", report.changes.len() - limit);
    }
    out
}

pub fn lease(lease: &Lease) -> String {
    format!(
        "file {} locked by {} until {}\n",
        lease.file_id,
        lease.holder,
        timestamp(lease.expires_at)
    )
}

pub fn file_status(file: &LogicalFile, lease: Option<&Lease>) -> String {
    let mut out = format!(
        "{}  {}  version {}  updated {}\n",
        file.id,
        file.display_name,
        file.current_version_number,
        timestamp(file.updated_at)
    );
    if let Some(project) = &file.project_ref {
        let _ = writeln!(out, "  project: {project}");
    }
    match lease {
        Some(lease) => {
            let _ = writeln!(out, "  locked by {} until {}", lease.holder, timestamp(lease.expires_at));
        }
        None => out.push_str("  unlocked\n"),
    }
    out
}

pub fn files(files: &[LogicalFile]) -> String {
    let mut out = String::new();
    for file in files {
        let _ = writeln!(
            out,
            "{}  {:<32}  v{}",
            file.id, file.display_name, file.current_version_number
        );
    }
    out
}
