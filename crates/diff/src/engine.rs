//! Positional cell-level diff.
//!
//! Rows are aligned by position: data row `i` of the old sheet is compared
//! with data row `i` of the new sheet, never matched by content. An inserted
//! row therefore shows up as modifications of every row after it followed by
//! one added row. Sheets are matched by name.

use crate::report::{DiffReport, DiffSummary};
use crate::snapshot::{CellValue, Sheet, Snapshot};
use sheetvault_core::{CellChange, ChangeType};
use std::collections::{HashMap, HashSet};
use std::time::Instant;

/// Caller-supplied diff settings.
#[derive(Clone, Debug, Default)]
pub struct DiffOptions {
    critical_columns: HashSet<String>,
}

impl DiffOptions {
    pub fn new<I, S>(critical_columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            critical_columns: critical_columns.into_iter().map(Into::into).collect(),
        }
    }

    /// Exact, case-sensitive match against the configured names.
    pub fn is_critical(&self, column: &str) -> bool {
        self.critical_columns.contains(column)
    }
}

/// Union column with its position on each side.
struct ColumnPlan<'a> {
    name: &'a str,
    old_idx: Option<usize>,
    new_idx: Option<usize>,
    critical: bool,
}

/// Old columns in order, then columns only the new sheet has.
fn plan_columns<'a>(old: &'a Sheet, new: &'a Sheet, options: &DiffOptions) -> Vec<ColumnPlan<'a>> {
    let new_index: HashMap<&str, usize> = new
        .columns
        .iter()
        .enumerate()
        .map(|(i, c)| (c.as_str(), i))
        .collect();
    let old_names: HashSet<&str> = old.columns.iter().map(String::as_str).collect();

    let mut plan = Vec::with_capacity(old.columns.len() + new.columns.len());
    for (i, name) in old.columns.iter().enumerate() {
        plan.push(ColumnPlan {
            name,
            old_idx: Some(i),
            new_idx: new_index.get(name.as_str()).copied(),
            critical: options.is_critical(name),
        });
    }
    for (i, name) in new.columns.iter().enumerate() {
        if !old_names.contains(name.as_str()) {
            plan.push(ColumnPlan {
                name,
                old_idx: None,
                new_idx: Some(i),
                critical: options.is_critical(name),
            });
        }
    }
    plan
}

fn value_at(sheet: &Sheet, row: usize, idx: Option<usize>) -> &CellValue {
    static EMPTY: CellValue = CellValue::Empty;
    match idx {
        Some(col) => sheet.cell(row, col),
        None => &EMPTY,
    }
}

struct SheetDiff<'a> {
    sheet_name: &'a str,
    changes: &'a mut Vec<CellChange>,
    summary: &'a mut DiffSummary,
}

impl SheetDiff<'_> {
    fn push(
        &mut self,
        row: usize,
        column: &ColumnPlan<'_>,
        change_type: ChangeType,
        old: &CellValue,
        new: &CellValue,
    ) {
        if column.critical {
            self.summary.critical_changes += 1;
        }
        self.summary.cells_changed += 1;
        self.changes.push(CellChange {
            sheet_name: self.sheet_name.to_string(),
            row_index: row as u64,
            column_name: column.name.to_string(),
            change_type,
            old_value: old.render(),
            new_value: new.render(),
            is_critical: column.critical,
        });
    }

    fn run(&mut self, old: &Sheet, new: &Sheet, options: &DiffOptions) {
        let plan = plan_columns(old, new, options);
        let aligned = old.row_count().min(new.row_count());

        for row in 0..aligned {
            let mut touched = false;
            for column in &plan {
                let a = value_at(old, row, column.old_idx);
                let b = value_at(new, row, column.new_idx);
                if a != b {
                    self.push(row, column, ChangeType::Modified, a, b);
                    touched = true;
                }
            }
            if touched {
                self.summary.rows_modified += 1;
            } else {
                self.summary.rows_unchanged += 1;
            }
        }

        static EMPTY: CellValue = CellValue::Empty;

        for row in aligned..new.row_count() {
            for column in &plan {
                let b = value_at(new, row, column.new_idx);
                self.push(row, column, ChangeType::Added, &EMPTY, b);
            }
            self.summary.rows_added += 1;
        }

        for row in aligned..old.row_count() {
            for column in &plan {
                let a = value_at(old, row, column.old_idx);
                self.push(row, column, ChangeType::Deleted, a, &EMPTY);
            }
            self.summary.rows_deleted += 1;
        }
    }
}

/// Diff two snapshots.
///
/// Sheets are visited in old order, then new-only sheets in new order. A
/// sheet present on one side only is diffed against an empty sheet, which
/// reports every row as added or deleted.
pub fn diff_snapshots(old: &Snapshot, new: &Snapshot, options: &DiffOptions) -> DiffReport {
    let started = Instant::now();
    let mut changes = Vec::new();
    let mut summary = DiffSummary::default();

    let old_names: HashSet<&str> = old.sheets.iter().map(|s| s.name.as_str()).collect();

    for old_sheet in &old.sheets {
        let missing;
        let new_sheet = match new.sheet(&old_sheet.name) {
            Some(sheet) => sheet,
            None => {
                missing = Sheet::default();
                &missing
            }
        };
        SheetDiff {
            sheet_name: &old_sheet.name,
            changes: &mut changes,
            summary: &mut summary,
        }
        .run(old_sheet, new_sheet, options);
    }

    let empty = Sheet::default();
    for new_sheet in new
        .sheets
        .iter()
        .filter(|s| !old_names.contains(s.name.as_str()))
    {
        SheetDiff {
            sheet_name: &new_sheet.name,
            changes: &mut changes,
            summary: &mut summary,
        }
        .run(&empty, new_sheet, options);
    }

    tracing::debug!(
        cells_changed = summary.cells_changed,
        rows_modified = summary.rows_modified,
        rows_added = summary.rows_added,
        rows_deleted = summary.rows_deleted,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "diff complete"
    );

    DiffReport { changes, summary }
}
