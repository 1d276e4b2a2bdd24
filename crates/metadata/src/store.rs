//! Metadata store trait and the SQLite implementation.

use crate::error::{MetadataError, MetadataResult};
use crate::repos::{FileRepo, LockRepo, VersionRepo};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// SQLite's name for a private in-memory database.
const IN_MEMORY: &str = ":memory:";

/// Cell change rows inserted per statement.
const CHANGE_INSERT_BATCH: usize = 500;

/// Combined metadata store trait.
#[async_trait]
pub trait MetadataStore: FileRepo + VersionRepo + LockRepo + Send + Sync {
    /// Run database migrations.
    async fn migrate(&self) -> MetadataResult<()>;

    /// Check database connectivity and health.
    async fn health_check(&self) -> MetadataResult<()>;
}

/// SQLite-based metadata store.
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    /// Open (creating if needed) a SQLite store at `path` and run migrations.
    ///
    /// `query_timeout_secs` bounds how long a statement waits on a locked
    /// database before failing.
    pub async fn new(
        path: impl AsRef<Path>,
        query_timeout_secs: Option<u64>,
    ) -> MetadataResult<Self> {
        let path = path.as_ref();
        let busy_timeout = Duration::from_secs(query_timeout_secs.unwrap_or(30));

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(busy_timeout);

        let mut pool_opts = SqlitePoolOptions::new()
            // A single connection serializes writers; every transaction below
            // must finish before another pool call is made.
            .max_connections(1);
        if path.as_os_str() == IN_MEMORY {
            // The database lives and dies with its one connection.
            pool_opts = pool_opts.idle_timeout(None).max_lifetime(None);
        }
        let pool = pool_opts.connect_with(opts).await?;

        let store = Self { pool };
        store.migrate().await?;

        tracing::debug!(path = %path.display(), "sqlite metadata store ready");
        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }
}

#[async_trait]
impl MetadataStore for SqliteStore {
    async fn migrate(&self) -> MetadataResult<()> {
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    async fn health_check(&self) -> MetadataResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

mod sqlite_impl {
    use super::*;
    use crate::models::*;
    use crate::repos::CommitOutcome;
    use sqlx::QueryBuilder;
    use time::OffsetDateTime;
    use uuid::Uuid;

    #[async_trait]
    impl FileRepo for SqliteStore {
        async fn create_file(&self, file: &FileRow) -> MetadataResult<()> {
            sqlx::query(
                r#"
                INSERT INTO files (
                    file_id, display_name, project_ref, current_version_number,
                    version_counter, storage_prefix, created_at, updated_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(file.file_id)
            .bind(&file.display_name)
            .bind(&file.project_ref)
            .bind(file.current_version_number)
            .bind(file.version_counter)
            .bind(&file.storage_prefix)
            .bind(file.created_at)
            .bind(file.updated_at)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                MetadataError::from_insert(e, || format!("file_id {} already exists", file.file_id))
            })?;
            Ok(())
        }

        async fn get_file(&self, file_id: Uuid) -> MetadataResult<Option<FileRow>> {
            let row = sqlx::query_as::<_, FileRow>("SELECT * FROM files WHERE file_id = ?")
                .bind(file_id)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row)
        }

        async fn list_files(&self) -> MetadataResult<Vec<FileRow>> {
            let rows = sqlx::query_as::<_, FileRow>(
                "SELECT * FROM files ORDER BY updated_at DESC, file_id",
            )
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }

        async fn allocate_version_number(
            &self,
            file_id: Uuid,
            expected_current: i64,
            updated_at: OffsetDateTime,
        ) -> MetadataResult<Option<i64>> {
            let allocated: Option<i64> = sqlx::query_scalar(
                r#"
                UPDATE files
                SET version_counter = version_counter + 1, updated_at = ?
                WHERE file_id = ? AND current_version_number = ?
                RETURNING version_counter
                "#,
            )
            .bind(updated_at)
            .bind(file_id)
            .bind(expected_current)
            .fetch_optional(&self.pool)
            .await?;
            Ok(allocated)
        }
    }

    #[async_trait]
    impl VersionRepo for SqliteStore {
        async fn commit_version(
            &self,
            version: &VersionRow,
            changes: &[CellChangeRow],
            expected_current: i64,
        ) -> MetadataResult<CommitOutcome> {
            let mut tx = self.pool.begin().await?;

            sqlx::query(
                r#"
                INSERT INTO versions (
                    version_id, file_id, version_number, parent_version_number,
                    content_hash, size_bytes, created_by, created_at, change_summary,
                    rows_added, rows_modified, rows_deleted, rows_unchanged, storage_path
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(version.version_id)
            .bind(version.file_id)
            .bind(version.version_number)
            .bind(version.parent_version_number)
            .bind(&version.content_hash)
            .bind(version.size_bytes)
            .bind(&version.created_by)
            .bind(version.created_at)
            .bind(&version.change_summary)
            .bind(version.rows_added)
            .bind(version.rows_modified)
            .bind(version.rows_deleted)
            .bind(version.rows_unchanged)
            .bind(&version.storage_path)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                MetadataError::from_insert(e, || {
                    format!(
                        "version {} of file {} already exists",
                        version.version_number, version.file_id
                    )
                })
            })?;

            for batch in changes.chunks(CHANGE_INSERT_BATCH) {
                let mut builder = QueryBuilder::<Sqlite>::new(
                    "INSERT INTO cell_changes (
                        change_id, version_id, position, sheet_name, row_index,
                        column_name, change_type, old_value, new_value, is_critical
                    ) ",
                );
                builder.push_values(batch, |mut b, change| {
                    b.push_bind(change.change_id)
                        .push_bind(change.version_id)
                        .push_bind(change.position)
                        .push_bind(&change.sheet_name)
                        .push_bind(change.row_index)
                        .push_bind(&change.column_name)
                        .push_bind(&change.change_type)
                        .push_bind(&change.old_value)
                        .push_bind(&change.new_value)
                        .push_bind(change.is_critical);
                });
                builder.build().execute(&mut *tx).await?;
            }

            let result = sqlx::query(
                r#"
                UPDATE files
                SET current_version_number = ?, updated_at = ?
                WHERE file_id = ? AND current_version_number = ?
                "#,
            )
            .bind(version.version_number)
            .bind(version.created_at)
            .bind(version.file_id)
            .bind(expected_current)
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() == 0 {
                let current: Option<i64> = sqlx::query_scalar(
                    "SELECT current_version_number FROM files WHERE file_id = ?",
                )
                .bind(version.file_id)
                .fetch_optional(&mut *tx)
                .await?;
                tx.rollback().await?;

                return match current {
                    Some(current) => Ok(CommitOutcome::Conflict { current }),
                    None => Err(MetadataError::NotFound(format!(
                        "file_id {} not found",
                        version.file_id
                    ))),
                };
            }

            tx.commit().await?;
            Ok(CommitOutcome::Committed)
        }

        async fn get_version(
            &self,
            file_id: Uuid,
            version_number: i64,
        ) -> MetadataResult<Option<VersionRow>> {
            let row = sqlx::query_as::<_, VersionRow>(
                "SELECT * FROM versions WHERE file_id = ? AND version_number = ?",
            )
            .bind(file_id)
            .bind(version_number)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row)
        }

        async fn list_versions(&self, file_id: Uuid) -> MetadataResult<Vec<VersionRow>> {
            let rows = sqlx::query_as::<_, VersionRow>(
                "SELECT * FROM versions WHERE file_id = ? ORDER BY version_number ASC",
            )
            .bind(file_id)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }

        async fn get_cell_changes(&self, version_id: Uuid) -> MetadataResult<Vec<CellChangeRow>> {
            let rows = sqlx::query_as::<_, CellChangeRow>(
                "SELECT * FROM cell_changes WHERE version_id = ? ORDER BY position ASC",
            )
            .bind(version_id)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }

        async fn count_cell_changes(&self, version_id: Uuid) -> MetadataResult<u64> {
            let count: i64 =
                sqlx::query_scalar("SELECT COUNT(*) FROM cell_changes WHERE version_id = ?")
                    .bind(version_id)
                    .fetch_one(&self.pool)
                    .await?;
            Ok(count as u64)
        }
    }

    #[async_trait]
    impl LockRepo for SqliteStore {
        async fn try_acquire_lock(
            &self,
            file_id: Uuid,
            holder: &str,
            now_ms: i64,
            expires_at_ms: i64,
        ) -> MetadataResult<Option<LockRow>> {
            // Every SET expression reads the pre-update row, so `locks.holder` and
            // `locks.expires_at_ms` below refer to the lease being replaced.
            let row = sqlx::query_as::<_, LockRow>(
                r#"
                INSERT INTO locks (file_id, holder, acquired_at_ms, expires_at_ms)
                VALUES (?1, ?2, ?3, ?4)
                ON CONFLICT(file_id) DO UPDATE SET
                    acquired_at_ms = CASE
                        WHEN locks.holder = excluded.holder AND locks.expires_at_ms > ?3
                        THEN locks.acquired_at_ms
                        ELSE excluded.acquired_at_ms
                    END,
                    holder = excluded.holder,
                    expires_at_ms = excluded.expires_at_ms
                WHERE locks.holder = excluded.holder OR locks.expires_at_ms <= ?3
                RETURNING file_id, holder, acquired_at_ms, expires_at_ms
                "#,
            )
            .bind(file_id)
            .bind(holder)
            .bind(now_ms)
            .bind(expires_at_ms)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row)
        }

        async fn get_lock(&self, file_id: Uuid) -> MetadataResult<Option<LockRow>> {
            let row = sqlx::query_as::<_, LockRow>("SELECT * FROM locks WHERE file_id = ?")
                .bind(file_id)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row)
        }

        async fn release_lock(&self, file_id: Uuid, holder: &str) -> MetadataResult<bool> {
            let result = sqlx::query("DELETE FROM locks WHERE file_id = ? AND holder = ?")
                .bind(file_id)
                .bind(holder)
                .execute(&self.pool)
                .await?;
            Ok(result.rows_affected() > 0)
        }
    }
}

const SCHEMA_SQL: &str = r#"
-- Logical files
CREATE TABLE IF NOT EXISTS files (
    file_id BLOB PRIMARY KEY,
    display_name TEXT NOT NULL,
    project_ref TEXT,
    current_version_number INTEGER NOT NULL DEFAULT 0,
    version_counter INTEGER NOT NULL DEFAULT 0,
    storage_prefix TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    CHECK (current_version_number <= version_counter)
);
CREATE INDEX IF NOT EXISTS idx_files_updated ON files(updated_at);

-- Immutable versions
CREATE TABLE IF NOT EXISTS versions (
    version_id BLOB PRIMARY KEY,
    file_id BLOB NOT NULL REFERENCES files(file_id),
    version_number INTEGER NOT NULL CHECK (version_number >= 1),
    parent_version_number INTEGER,
    content_hash TEXT NOT NULL,
    size_bytes INTEGER NOT NULL,
    created_by TEXT NOT NULL,
    created_at TEXT NOT NULL,
    change_summary TEXT,
    rows_added INTEGER NOT NULL DEFAULT 0,
    rows_modified INTEGER NOT NULL DEFAULT 0,
    rows_deleted INTEGER NOT NULL DEFAULT 0,
    rows_unchanged INTEGER NOT NULL DEFAULT 0,
    storage_path TEXT NOT NULL,
    UNIQUE (file_id, version_number)
);
CREATE INDEX IF NOT EXISTS idx_versions_hash ON versions(file_id, content_hash);

-- Cell changes introduced by each version
CREATE TABLE IF NOT EXISTS cell_changes (
    change_id BLOB PRIMARY KEY,
    version_id BLOB NOT NULL REFERENCES versions(version_id),
    position INTEGER NOT NULL,
    sheet_name TEXT NOT NULL,
    row_index INTEGER NOT NULL,
    column_name TEXT NOT NULL,
    change_type TEXT NOT NULL CHECK (change_type IN ('added', 'modified', 'deleted')),
    old_value TEXT,
    new_value TEXT,
    is_critical INTEGER NOT NULL DEFAULT 0,
    UNIQUE (version_id, sheet_name, row_index, column_name)
);
CREATE INDEX IF NOT EXISTS idx_cell_changes_version ON cell_changes(version_id, position);

-- Exclusive write leases, at most one row per file
CREATE TABLE IF NOT EXISTS locks (
    file_id BLOB PRIMARY KEY REFERENCES files(file_id),
    holder TEXT NOT NULL,
    acquired_at_ms INTEGER NOT NULL,
    expires_at_ms INTEGER NOT NULL
);
"#;
