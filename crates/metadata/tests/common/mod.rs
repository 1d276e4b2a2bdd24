//! Common test utilities and fixtures.

use sheetvault_metadata::models::{CellChangeRow, FileRow, VersionRow};
use sheetvault_metadata::{MetadataResult, MetadataStore, SqliteStore};
use std::sync::Arc;
use tempfile::TempDir;
use time::OffsetDateTime;
use uuid::Uuid;

/// A test metadata store wrapper that cleans up on drop.
#[allow(dead_code)]
pub struct TestMetadata {
    pub store: Arc<dyn MetadataStore>,
    _temp_dir: Option<TempDir>,
}

#[allow(dead_code)]
impl TestMetadata {
    /// Create a file-backed store in a temporary directory.
    pub async fn new() -> MetadataResult<Self> {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
        let store = SqliteStore::new(temp_dir.path().join("test.db"), Some(5)).await?;
        Ok(Self {
            store: Arc::new(store),
            _temp_dir: Some(temp_dir),
        })
    }

    /// Create an in-memory SQLite store (faster for tests).
    pub async fn in_memory() -> MetadataResult<Self> {
        let store = SqliteStore::new(":memory:", Some(5)).await?;
        Ok(Self {
            store: Arc::new(store),
            _temp_dir: None,
        })
    }

    pub fn store(&self) -> Arc<dyn MetadataStore> {
        self.store.clone()
    }
}

#[allow(dead_code)]
pub fn file_row(display_name: &str) -> FileRow {
    let file_id = Uuid::new_v4();
    let now = OffsetDateTime::now_utc();
    FileRow {
        file_id,
        display_name: display_name.to_string(),
        project_ref: None,
        current_version_number: 0,
        version_counter: 0,
        storage_prefix: format!("files/{file_id}"),
        created_at: now,
        updated_at: now,
    }
}

#[allow(dead_code)]
pub fn version_row(file: &FileRow, number: i64, parent: Option<i64>) -> VersionRow {
    let hash = format!("{number:064x}");
    VersionRow {
        version_id: Uuid::new_v4(),
        file_id: file.file_id,
        version_number: number,
        parent_version_number: parent,
        content_hash: hash.clone(),
        size_bytes: 42,
        created_by: "alice".to_string(),
        created_at: OffsetDateTime::now_utc(),
        change_summary: None,
        rows_added: 0,
        rows_modified: 0,
        rows_deleted: 0,
        rows_unchanged: 0,
        storage_path: format!("{}/objects/{}/{hash}", file.storage_prefix, &hash[..2]),
    }
}

#[allow(dead_code)]
pub fn change_row(version: &VersionRow, position: i64, row_index: i64, column: &str) -> CellChangeRow {
    CellChangeRow {
        change_id: Uuid::new_v4(),
        version_id: version.version_id,
        position,
        sheet_name: "Sheet1".to_string(),
        row_index,
        column_name: column.to_string(),
        change_type: "modified".to_string(),
        old_value: Some("old".to_string()),
        new_value: Some("new".to_string()),
        is_critical: false,
    }
}
