//! Version manager: hashing, allocation, diffing and atomic commit.

use crate::convert::{
    change_from_row, change_rows, file_from_row, version_from_row, version_number,
};
use crate::error::{EngineError, EngineResult};
use crate::locks::LockManager;
use crate::metrics;
use crate::summarize::Summarizer;
use bytes::Bytes;
use serde::Serialize;
use sheetvault_core::{
    ContentHash, DEFAULT_DISPLAY_NAME, FileId, HolderId, LogicalFile, Version, VersionCounts,
};
use sheetvault_diff::{DiffError, DiffOptions, DiffReport, Snapshot, diff_snapshots};
use sheetvault_metadata::models::{FileRow, VersionRow};
use sheetvault_metadata::{CommitOutcome, MetadataStore};
use sheetvault_storage::ContentStore;
use std::sync::Arc;
use std::time::{Duration, Instant};
use time::OffsetDateTime;
use uuid::Uuid;

/// Request to add a version to an existing file.
#[derive(Clone, Debug)]
pub struct CreateVersion {
    pub file_id: FileId,
    pub bytes: Bytes,
    pub author: String,
    pub change_summary: Option<String>,
    /// Lock holder acting on behalf of this request. Its lease is released if
    /// the diff times out.
    pub holder: Option<HolderId>,
}

impl CreateVersion {
    pub fn new(file_id: FileId, bytes: impl Into<Bytes>, author: impl Into<String>) -> Self {
        Self {
            file_id,
            bytes: bytes.into(),
            author: author.into(),
            change_summary: None,
            holder: None,
        }
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.change_summary = Some(summary.into());
        self
    }

    pub fn with_holder(mut self, holder: HolderId) -> Self {
        self.holder = Some(holder);
        self
    }
}

/// Request to upload a document, creating the file when no ID is given.
#[derive(Clone, Debug, Default)]
pub struct Upload {
    pub file_id: Option<FileId>,
    pub display_name: Option<String>,
    pub project_ref: Option<String>,
    pub bytes: Bytes,
    pub author: String,
    pub change_summary: Option<String>,
    pub holder: Option<HolderId>,
}

impl Upload {
    pub fn new(bytes: impl Into<Bytes>, author: impl Into<String>) -> Self {
        Self {
            bytes: bytes.into(),
            author: author.into(),
            ..Default::default()
        }
    }

    pub fn to_file(mut self, file_id: FileId) -> Self {
        self.file_id = Some(file_id);
        self
    }

    pub fn named(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = Some(display_name.into());
        self
    }

    pub fn in_project(mut self, project_ref: impl Into<String>) -> Self {
        self.project_ref = Some(project_ref.into());
        self
    }
}

/// A newly committed version with the diff against its parent.
#[derive(Clone, Debug, Serialize)]
pub struct CreatedVersion {
    pub version: Version,
    pub report: DiffReport,
}

/// Result of submitting content for a file.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum VersionOutcome {
    /// The bytes hash to the current version; nothing was written.
    Unchanged(Version),
    Created(CreatedVersion),
}

impl VersionOutcome {
    /// The current version after the call.
    pub fn version(&self) -> &Version {
        match self {
            Self::Unchanged(version) => version,
            Self::Created(created) => &created.version,
        }
    }

    pub fn is_unchanged(&self) -> bool {
        matches!(self, Self::Unchanged(_))
    }

    /// Cell changes introduced by the call; `None` when unchanged.
    pub fn report(&self) -> Option<&DiffReport> {
        match self {
            Self::Unchanged(_) => None,
            Self::Created(created) => Some(&created.report),
        }
    }
}

/// Result of an upload.
#[derive(Clone, Debug, Serialize)]
pub struct UploadResult {
    pub file_id: FileId,
    pub version_number: u32,
    pub outcome: VersionOutcome,
}

/// Orchestrates version creation and history queries for logical files.
#[derive(Clone)]
pub struct VersionManager {
    metadata: Arc<dyn MetadataStore>,
    content: ContentStore,
    locks: LockManager,
    options: Arc<DiffOptions>,
    diff_timeout: Duration,
    summarizer: Option<Arc<dyn Summarizer>>,
}

impl VersionManager {
    pub fn new(
        metadata: Arc<dyn MetadataStore>,
        content: ContentStore,
        locks: LockManager,
        options: DiffOptions,
        diff_timeout: Duration,
    ) -> Self {
        Self {
            metadata,
            content,
            locks,
            options: Arc::new(options),
            diff_timeout,
            summarizer: None,
        }
    }

    /// Generate change summaries for versions submitted without one.
    pub fn with_summarizer(mut self, summarizer: Arc<dyn Summarizer>) -> Self {
        self.summarizer = Some(summarizer);
        self
    }

    pub fn with_diff_timeout(mut self, timeout: Duration) -> Self {
        self.diff_timeout = timeout;
        self
    }

    /// Create a logical file with no versions.
    pub async fn create_file(
        &self,
        display_name: Option<&str>,
        project_ref: Option<String>,
    ) -> EngineResult<LogicalFile> {
        let id = FileId::new();
        let now = OffsetDateTime::now_utc();
        let display_name = display_name
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or(DEFAULT_DISPLAY_NAME);

        let row = FileRow {
            file_id: *id.as_uuid(),
            display_name: display_name.to_string(),
            project_ref,
            current_version_number: 0,
            version_counter: 0,
            storage_prefix: id.storage_prefix(),
            created_at: now,
            updated_at: now,
        };
        self.metadata.create_file(&row).await?;

        tracing::info!(file_id = %id, display_name, "created logical file");
        file_from_row(row)
    }

    pub async fn get_file(&self, file_id: FileId) -> EngineResult<LogicalFile> {
        file_from_row(self.file_row(file_id).await?)
    }

    /// All files, most recently updated first.
    pub async fn list_files(&self) -> EngineResult<Vec<LogicalFile>> {
        self.metadata
            .list_files()
            .await?
            .into_iter()
            .map(file_from_row)
            .collect()
    }

    /// Upload a document, creating its file first when no ID is given.
    pub async fn upload(&self, request: Upload) -> EngineResult<UploadResult> {
        validate_author(&request.author)?;

        let file_id = match request.file_id {
            Some(id) => id,
            None => {
                self.create_file(request.display_name.as_deref(), request.project_ref)
                    .await?
                    .id
            }
        };

        let outcome = self
            .create_version(CreateVersion {
                file_id,
                bytes: request.bytes,
                author: request.author,
                change_summary: request.change_summary,
                holder: request.holder,
            })
            .await?;

        Ok(UploadResult {
            file_id,
            version_number: outcome.version().version_number,
            outcome,
        })
    }

    /// Add a version to a file unless the bytes match its current version.
    #[tracing::instrument(skip_all, fields(file_id = %request.file_id, author = %request.author))]
    pub async fn create_version(&self, request: CreateVersion) -> EngineResult<VersionOutcome> {
        let result = self.create_version_inner(request).await;
        if let Err(err) = &result {
            metrics::record_error(err.kind());
            tracing::warn!(error = %err, kind = %err.kind(), "version creation failed");
        }
        result
    }

    async fn create_version_inner(&self, request: CreateVersion) -> EngineResult<VersionOutcome> {
        validate_author(&request.author)?;

        let file_uuid = *request.file_id.as_uuid();
        let hash = ContentStore::hash(&request.bytes).await?;
        let file = self.file_row(request.file_id).await?;
        let expected = file.current_version_number;

        let parent = if expected > 0 {
            Some(self.metadata.get_version(file_uuid, expected).await?.ok_or_else(|| {
                EngineError::StorageFailure(format!(
                    "file {} points at missing version {expected}",
                    request.file_id
                ))
            })?)
        } else {
            None
        };

        if let Some(parent) = &parent
            && parent.content_hash == hash.to_hex()
        {
            metrics::UPLOADS_UNCHANGED.inc();
            tracing::info!(
                version_number = parent.version_number,
                "content unchanged, keeping current version"
            );
            return Ok(VersionOutcome::Unchanged(version_from_row(parent.clone())?));
        }

        let now = OffsetDateTime::now_utc();
        let Some(allocated) = self
            .metadata
            .allocate_version_number(file_uuid, expected, now)
            .await?
        else {
            return Err(self.conflict(file_uuid, expected).await);
        };

        let blob = self
            .content
            .put_hashed(&file.storage_prefix, hash, request.bytes.clone())
            .await?;

        let previous = match &parent {
            Some(parent) => Some(self.load_blob(parent).await?),
            None => None,
        };

        let report = match self.compute_diff(previous, request.bytes).await {
            Ok(report) => report,
            Err(err @ EngineError::DiffComputationTimeout { .. }) => {
                if let Some(holder) = &request.holder {
                    match self.locks.release(request.file_id, holder).await {
                        Ok(released) => {
                            tracing::warn!(holder = %holder, released, "released lock after diff timeout")
                        }
                        Err(release_err) => {
                            tracing::error!(holder = %holder, error = %release_err, "failed to release lock after diff timeout")
                        }
                    }
                }
                return Err(err);
            }
            Err(err) => return Err(err),
        };

        let change_summary = match request.change_summary.filter(|s| !s.trim().is_empty()) {
            Some(summary) => Some(summary),
            None => match &self.summarizer {
                Some(summarizer) => summarizer.summarize(&report).await,
                None => None,
            },
        };

        let summary = report.summary;
        let row = VersionRow {
            version_id: Uuid::new_v4(),
            file_id: file_uuid,
            version_number: allocated,
            parent_version_number: parent.as_ref().map(|p| p.version_number),
            content_hash: hash.to_hex(),
            size_bytes: blob.size as i64,
            created_by: request.author.trim().to_string(),
            created_at: now,
            change_summary,
            rows_added: summary.rows_added as i64,
            rows_modified: summary.rows_modified as i64,
            rows_deleted: summary.rows_deleted as i64,
            rows_unchanged: summary.rows_unchanged as i64,
            storage_path: blob.key,
        };
        let changes = change_rows(row.version_id, &report.changes);

        match self.metadata.commit_version(&row, &changes, expected).await? {
            CommitOutcome::Committed => {}
            CommitOutcome::Conflict { current } => {
                metrics::VERSION_CONFLICTS.inc();
                return Err(EngineError::VersionConflict {
                    expected: version_number(expected)?,
                    current: version_number(current)?,
                });
            }
        }

        metrics::VERSIONS_CREATED.inc();
        metrics::CELL_CHANGES_RECORDED.inc_by(changes.len() as u64);
        tracing::info!(
            version_number = allocated,
            rows_added = summary.rows_added,
            rows_modified = summary.rows_modified,
            rows_deleted = summary.rows_deleted,
            cells_changed = summary.cells_changed,
            "version created"
        );

        Ok(VersionOutcome::Created(CreatedVersion {
            version: version_from_row(row)?,
            report,
        }))
    }

    /// Versions of a file in strictly increasing number order.
    pub async fn history(&self, file_id: FileId) -> EngineResult<Vec<Version>> {
        self.file_row(file_id).await?;
        self.metadata
            .list_versions(*file_id.as_uuid())
            .await?
            .into_iter()
            .map(version_from_row)
            .collect()
    }

    pub async fn get_version(&self, file_id: FileId, number: u32) -> EngineResult<Version> {
        version_from_row(self.version_row(file_id, number).await?)
    }

    /// Changes taking version `a` to version `b`.
    ///
    /// Uses the stored changes when `b` was diffed directly against `a`, and
    /// re-diffs the two stored documents otherwise (including `a > b`).
    #[tracing::instrument(skip_all, fields(file_id = %file_id, a = a, b = b))]
    pub async fn diff(&self, file_id: FileId, a: u32, b: u32) -> EngineResult<DiffReport> {
        let from = self.version_row(file_id, a).await?;
        let to = self.version_row(file_id, b).await?;

        if a == b {
            return Ok(DiffReport::empty());
        }

        if to.parent_version_number == Some(from.version_number) {
            let changes = self
                .metadata
                .get_cell_changes(to.version_id)
                .await?
                .into_iter()
                .map(change_from_row)
                .collect::<EngineResult<Vec<_>>>()?;
            let counts = VersionCounts {
                rows_added: to.rows_added as u64,
                rows_modified: to.rows_modified as u64,
                rows_deleted: to.rows_deleted as u64,
            };
            tracing::debug!(changes = changes.len(), "serving stored diff");
            return Ok(DiffReport::from_stored(
                changes,
                counts,
                to.rows_unchanged as u64,
            ));
        }

        tracing::debug!("versions not adjacent, recomputing diff");
        let old = self.load_blob(&from).await?;
        let new = self.load_blob(&to).await?;
        self.compute_diff(Some(old), new).await
    }

    /// Exact stored bytes of a version, verified against its content hash.
    pub async fn download(&self, file_id: FileId, number: u32) -> EngineResult<Bytes> {
        let row = self.version_row(file_id, number).await?;
        self.load_blob(&row).await
    }

    async fn file_row(&self, file_id: FileId) -> EngineResult<FileRow> {
        self.metadata
            .get_file(*file_id.as_uuid())
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("file {file_id}")))
    }

    async fn version_row(&self, file_id: FileId, number: u32) -> EngineResult<VersionRow> {
        self.file_row(file_id).await?;
        self.metadata
            .get_version(*file_id.as_uuid(), i64::from(number))
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("version {number} of file {file_id}")))
    }

    async fn load_blob(&self, row: &VersionRow) -> EngineResult<Bytes> {
        let hash = ContentHash::from_hex(&row.content_hash)
            .map_err(|e| EngineError::StorageFailure(format!("corrupt version record: {e}")))?;
        Ok(self.content.get(&row.storage_path, &hash).await?)
    }

    async fn conflict(&self, file_uuid: Uuid, expected: i64) -> EngineError {
        metrics::VERSION_CONFLICTS.inc();
        let current = match self.metadata.get_file(file_uuid).await {
            Ok(Some(file)) => file.current_version_number,
            Ok(None) => return EngineError::NotFound(format!("file {file_uuid}")),
            Err(err) => return err.into(),
        };
        match (version_number(expected), version_number(current)) {
            (Ok(expected), Ok(current)) => EngineError::VersionConflict { expected, current },
            (Err(err), _) | (_, Err(err)) => err,
        }
    }

    /// Materialize and diff on the blocking pool, bounded by the diff timeout.
    ///
    /// With no previous document the new one is still parsed, so invalid
    /// content is rejected before anything is committed.
    async fn compute_diff(&self, previous: Option<Bytes>, current: Bytes) -> EngineResult<DiffReport> {
        let options = self.options.clone();
        let started = Instant::now();

        let task = tokio::task::spawn_blocking(move || -> Result<DiffReport, DiffError> {
            let new = Snapshot::from_bytes(&current)?;
            match previous {
                Some(previous) => {
                    let old = Snapshot::from_bytes(&previous)?;
                    Ok(diff_snapshots(&old, &new, &options))
                }
                None => Ok(DiffReport::empty()),
            }
        });

        match tokio::time::timeout(self.diff_timeout, task).await {
            Ok(Ok(result)) => {
                metrics::DIFF_DURATION.observe(started.elapsed().as_secs_f64());
                Ok(result?)
            }
            Ok(Err(join_err)) => Err(EngineError::InvalidDocument(format!(
                "document could not be processed: {join_err}"
            ))),
            Err(_) => {
                metrics::DIFF_TIMEOUTS.inc();
                let timeout_ms = self.diff_timeout.as_millis() as u64;
                tracing::warn!(timeout_ms, "diff computation timed out");
                Err(EngineError::DiffComputationTimeout { timeout_ms })
            }
        }
    }
}

fn validate_author(author: &str) -> EngineResult<()> {
    if author.trim().is_empty() {
        return Err(EngineError::InvalidRequest(
            "author must not be empty".to_string(),
        ));
    }
    Ok(())
}
