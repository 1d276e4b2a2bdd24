//! Change summary generation.

use async_trait::async_trait;
use sheetvault_diff::DiffReport;

/// Produces a human-readable summary of a diff.
///
/// Implementations receive only the structured report, never document bytes.
/// Returning `None` leaves the version without a summary.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, report: &DiffReport) -> Option<String>;
}

/// Summarizes a diff from its row counts alone.
#[derive(Clone, Copy, Debug, Default)]
pub struct CountsSummarizer;

fn plural(n: u64, noun: &str) -> String {
    if n == 1 {
        format!("1 {noun}")
    } else {
        format!("{n} {noun}s")
    }
}

#[async_trait]
impl Summarizer for CountsSummarizer {
    async fn summarize(&self, report: &DiffReport) -> Option<String> {
        let s = &report.summary;
        let mut parts = Vec::new();
        if s.rows_modified > 0 {
            parts.push(format!("{} modified", plural(s.rows_modified, "row")));
        }
        if s.rows_added > 0 {
            parts.push(format!("{} added", plural(s.rows_added, "row")));
        }
        if s.rows_deleted > 0 {
            parts.push(format!("{} deleted", plural(s.rows_deleted, "row")));
        }
        if parts.is_empty() {
            return None;
        }

        let mut summary = parts.join(", ");
        if s.critical_changes > 0 {
            summary.push_str(&format!(
                " ({} in critical columns)",
                plural(s.critical_changes, "change")
            ));
        }
        Some(summary)
    }
}
