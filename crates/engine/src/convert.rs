//! Conversions between metadata rows and domain types.

use crate::error::{EngineError, EngineResult};
use sheetvault_core::{
    CellChange, ChangeType, ContentHash, FileId, HolderId, Lease, LogicalFile, Version,
    VersionCounts, VersionId,
};
use sheetvault_metadata::models::{CellChangeRow, FileRow, LockRow, VersionRow, from_unix_ms};
use uuid::Uuid;

fn corrupt(what: &str, detail: impl std::fmt::Display) -> EngineError {
    EngineError::StorageFailure(format!("corrupt {what} record: {detail}"))
}

pub(crate) fn version_number(n: i64) -> EngineResult<u32> {
    u32::try_from(n).map_err(|_| corrupt("version", format!("version number {n} out of range")))
}

fn count(n: i64) -> u64 {
    u64::try_from(n).unwrap_or(0)
}

pub(crate) fn file_from_row(row: FileRow) -> EngineResult<LogicalFile> {
    Ok(LogicalFile {
        id: FileId::from_uuid(row.file_id),
        display_name: row.display_name,
        project_ref: row.project_ref,
        current_version_number: version_number(row.current_version_number)?,
        storage_prefix: row.storage_prefix,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}

pub(crate) fn version_from_row(row: VersionRow) -> EngineResult<Version> {
    let content_hash =
        ContentHash::from_hex(&row.content_hash).map_err(|e| corrupt("version", e))?;
    Ok(Version {
        id: VersionId::from_uuid(row.version_id),
        file_id: FileId::from_uuid(row.file_id),
        version_number: version_number(row.version_number)?,
        parent_version_number: row.parent_version_number.map(version_number).transpose()?,
        content_hash,
        size_bytes: count(row.size_bytes),
        created_by: row.created_by,
        created_at: row.created_at,
        change_summary: row.change_summary,
        counts: VersionCounts {
            rows_added: count(row.rows_added),
            rows_modified: count(row.rows_modified),
            rows_deleted: count(row.rows_deleted),
        },
        storage_path: row.storage_path,
    })
}

pub(crate) fn change_from_row(row: CellChangeRow) -> EngineResult<CellChange> {
    Ok(CellChange {
        change_type: ChangeType::parse(&row.change_type).map_err(|e| corrupt("cell change", e))?,
        sheet_name: row.sheet_name,
        row_index: count(row.row_index),
        column_name: row.column_name,
        old_value: row.old_value,
        new_value: row.new_value,
        is_critical: row.is_critical,
    })
}

/// Rows for `changes`, positioned in emission order.
pub(crate) fn change_rows(version_id: Uuid, changes: &[CellChange]) -> Vec<CellChangeRow> {
    changes
        .iter()
        .enumerate()
        .map(|(position, change)| CellChangeRow {
            change_id: Uuid::new_v4(),
            version_id,
            position: position as i64,
            sheet_name: change.sheet_name.clone(),
            row_index: change.row_index as i64,
            column_name: change.column_name.clone(),
            change_type: change.change_type.as_str().to_string(),
            old_value: change.old_value.clone(),
            new_value: change.new_value.clone(),
            is_critical: change.is_critical,
        })
        .collect()
}

pub(crate) fn lease_from_row(row: LockRow) -> EngineResult<Lease> {
    Ok(Lease {
        file_id: FileId::from_uuid(row.file_id),
        holder: HolderId::new(&row.holder).map_err(|e| corrupt("lock", e))?,
        acquired_at: from_unix_ms(row.acquired_at_ms),
        expires_at: from_unix_ms(row.expires_at_ms),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::OffsetDateTime;

    #[test]
    fn test_change_rows_keep_emission_order() {
        let change = |row| CellChange {
            sheet_name: "Sheet1".into(),
            row_index: row,
            column_name: "Tax".into(),
            change_type: ChangeType::Modified,
            old_value: Some("1".into()),
            new_value: Some("2".into()),
            is_critical: true,
        };
        let version_id = Uuid::new_v4();
        let rows = change_rows(version_id, &[change(5), change(2)]);

        assert_eq!(rows[0].position, 0);
        assert_eq!(rows[1].position, 1);
        assert_eq!(rows[1].row_index, 2);
        assert!(rows.iter().all(|r| r.version_id == version_id));

        let back = change_from_row(rows[0].clone()).unwrap();
        assert_eq!(back, change(5));
    }

    #[test]
    fn test_corrupt_version_hash_is_storage_failure() {
        let row = VersionRow {
            version_id: Uuid::new_v4(),
            file_id: Uuid::new_v4(),
            version_number: 1,
            parent_version_number: None,
            content_hash: "not-hex".into(),
            size_bytes: 1,
            created_by: "alice".into(),
            created_at: OffsetDateTime::now_utc(),
            change_summary: None,
            rows_added: 0,
            rows_modified: 0,
            rows_deleted: 0,
            rows_unchanged: 0,
            storage_path: "files/x".into(),
        };
        assert!(matches!(
            version_from_row(row),
            Err(EngineError::StorageFailure(_))
        ));
    }
}
