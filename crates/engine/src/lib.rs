//! Versioned storage and change tracking for tabular documents.
//!
//! [`Engine`] is the public entry point. It wires together:
//! - Content-addressed blob storage
//! - The metadata store holding files, versions, cell changes and leases
//! - The lock manager
//! - The version manager, which hashes, diffs and commits uploads
//! - A registry for uploads large enough to run in the background

mod convert;
pub mod error;
pub mod jobs;
pub mod locks;
pub mod metrics;
pub mod summarize;
pub mod versions;

pub use error::{EngineError, EngineResult, ErrorKind};
pub use jobs::{JobId, JobRegistry, JobStatus};
pub use locks::LockManager;
pub use summarize::{CountsSummarizer, Summarizer};
pub use versions::{
    CreateVersion, CreatedVersion, Upload, UploadResult, VersionManager, VersionOutcome,
};

use bytes::Bytes;
use sheetvault_core::config::AppConfig;
use sheetvault_core::{FileId, HolderId, Lease, LogicalFile, Version};
use sheetvault_diff::{DiffOptions, DiffReport};
use sheetvault_metadata::MetadataStore;
use sheetvault_storage::{ContentStore, ObjectStore};
use std::sync::Arc;
use std::time::Duration;

/// How a submitted upload was executed.
#[derive(Clone, Debug)]
pub enum Submission {
    /// Small enough to run inline; the result is ready.
    Completed(UploadResult),
    /// Running on the runtime; poll or await the job.
    Background(JobId),
}

/// Shared handle to a configured engine.
#[derive(Clone)]
pub struct Engine {
    config: Arc<AppConfig>,
    objects: Arc<dyn ObjectStore>,
    metadata: Arc<dyn MetadataStore>,
    locks: LockManager,
    versions: VersionManager,
    jobs: Arc<JobRegistry>,
}

impl Engine {
    /// Build an engine from configuration, opening the configured backends.
    pub async fn from_config(config: AppConfig) -> EngineResult<Self> {
        config.validate().map_err(EngineError::InvalidRequest)?;

        let objects = sheetvault_storage::from_config(&config.storage).await?;
        let metadata = sheetvault_metadata::from_config(&config.metadata).await?;

        tracing::info!(
            backend = objects.backend_name(),
            lock_ttl_secs = config.locks.ttl_secs,
            diff_timeout_secs = config.diff.timeout_secs,
            "engine initialized"
        );
        Ok(Self::new(config, objects, metadata))
    }

    /// Build an engine over existing backends.
    pub fn new(
        config: AppConfig,
        objects: Arc<dyn ObjectStore>,
        metadata: Arc<dyn MetadataStore>,
    ) -> Self {
        metrics::register_metrics();

        let content = ContentStore::new(objects.clone());
        let locks = LockManager::new(metadata.clone(), config.locks.ttl());
        let options = DiffOptions::new(config.diff.critical_columns.iter().cloned());
        let versions = VersionManager::new(
            metadata.clone(),
            content,
            locks.clone(),
            options,
            config.diff.timeout(),
        );

        Self {
            config: Arc::new(config),
            objects,
            metadata,
            locks,
            versions,
            jobs: Arc::new(JobRegistry::new()),
        }
    }

    /// Generate change summaries with `summarizer` when callers give none.
    pub fn with_summarizer(mut self, summarizer: Arc<dyn Summarizer>) -> Self {
        self.versions = self.versions.with_summarizer(summarizer);
        self
    }

    /// Override the configured diff timeout.
    pub fn with_diff_timeout(mut self, timeout: Duration) -> Self {
        self.versions = self.versions.with_diff_timeout(timeout);
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn objects(&self) -> &Arc<dyn ObjectStore> {
        &self.objects
    }

    pub fn metadata(&self) -> &Arc<dyn MetadataStore> {
        &self.metadata
    }

    pub fn locks(&self) -> &LockManager {
        &self.locks
    }

    pub fn versions(&self) -> &VersionManager {
        &self.versions
    }

    // ---------------------------------------------------------------------
    // Files and versions
    // ---------------------------------------------------------------------

    pub async fn upload(&self, request: Upload) -> EngineResult<UploadResult> {
        self.versions.upload(request).await
    }

    pub async fn create_version(&self, request: CreateVersion) -> EngineResult<VersionOutcome> {
        self.versions.create_version(request).await
    }

    pub async fn get_file(&self, file_id: FileId) -> EngineResult<LogicalFile> {
        self.versions.get_file(file_id).await
    }

    pub async fn list_files(&self) -> EngineResult<Vec<LogicalFile>> {
        self.versions.list_files().await
    }

    pub async fn get_version_history(&self, file_id: FileId) -> EngineResult<Vec<Version>> {
        self.versions.history(file_id).await
    }

    pub async fn get_version(&self, file_id: FileId, number: u32) -> EngineResult<Version> {
        self.versions.get_version(file_id, number).await
    }

    pub async fn get_version_diff(
        &self,
        file_id: FileId,
        version_a: u32,
        version_b: u32,
    ) -> EngineResult<DiffReport> {
        self.versions.diff(file_id, version_a, version_b).await
    }

    pub async fn download_version(&self, file_id: FileId, number: u32) -> EngineResult<Bytes> {
        self.versions.download(file_id, number).await
    }

    // ---------------------------------------------------------------------
    // Locks
    // ---------------------------------------------------------------------

    pub async fn acquire_lock(&self, file_id: FileId, holder: &str) -> EngineResult<Lease> {
        let holder = HolderId::new(holder)?;
        self.locks.acquire(file_id, &holder).await
    }

    pub async fn release_lock(&self, file_id: FileId, holder: &str) -> EngineResult<bool> {
        let holder = HolderId::new(holder)?;
        self.locks.release(file_id, &holder).await
    }

    /// The live lease on a file, if any.
    pub async fn lock_status(&self, file_id: FileId) -> EngineResult<Option<Lease>> {
        self.locks.current(file_id).await
    }

    // ---------------------------------------------------------------------
    // Background execution
    // ---------------------------------------------------------------------

    /// Run an upload inline, or as a background job when it exceeds
    /// `diff.background_threshold_bytes`.
    pub async fn submit_upload(&self, request: Upload) -> EngineResult<Submission> {
        if !self.is_large(&request.bytes) {
            return Ok(Submission::Completed(self.upload(request).await?));
        }

        let versions = self.versions.clone();
        let size = request.bytes.len();
        let job = self
            .jobs
            .spawn(async move { versions.upload(request).await })
            .await;
        tracing::info!(job_id = %job, size_bytes = size, "upload moved to background");
        Ok(Submission::Background(job))
    }

    /// [`Self::create_version`] with the same inline/background split as
    /// [`Self::submit_upload`].
    pub async fn submit_version(&self, request: CreateVersion) -> EngineResult<Submission> {
        let file_id = request.file_id;
        if !self.is_large(&request.bytes) {
            let outcome = self.create_version(request).await?;
            return Ok(Submission::Completed(UploadResult {
                file_id,
                version_number: outcome.version().version_number,
                outcome,
            }));
        }

        let versions = self.versions.clone();
        let size = request.bytes.len();
        let job = self
            .jobs
            .spawn(async move {
                let outcome = versions.create_version(request).await?;
                Ok(UploadResult {
                    file_id,
                    version_number: outcome.version().version_number,
                    outcome,
                })
            })
            .await;
        tracing::info!(job_id = %job, file_id = %file_id, size_bytes = size, "version moved to background");
        Ok(Submission::Background(job))
    }

    /// Current status of a job.
    ///
    /// A finished status is reported once; the job is forgotten afterwards
    /// and later lookups return `NotFound`.
    pub async fn job_status(&self, job_id: JobId) -> EngineResult<JobStatus> {
        let status = self
            .jobs
            .status(job_id)
            .await
            .ok_or_else(|| EngineError::NotFound(format!("job {job_id}")))?;
        self.forget_if_finished(job_id, &status).await;
        Ok(status)
    }

    /// Wait for a job to finish. Like [`Self::job_status`], the finished
    /// job is forgotten once reported.
    pub async fn wait_for_job(&self, job_id: JobId) -> EngineResult<JobStatus> {
        let status = self
            .jobs
            .wait(job_id)
            .await
            .ok_or_else(|| EngineError::NotFound(format!("job {job_id}")))?;
        self.forget_if_finished(job_id, &status).await;
        Ok(status)
    }

    /// Forget finished jobs nobody has asked about.
    pub async fn prune_finished_jobs(&self) -> usize {
        let pruned = self.jobs.prune_finished().await;
        if pruned > 0 {
            tracing::debug!(pruned, "pruned finished jobs");
        }
        pruned
    }

    /// Number of jobs still tracked, running or finished but unreported.
    pub async fn tracked_jobs(&self) -> usize {
        self.jobs.len().await
    }

    /// Check both backends.
    pub async fn health_check(&self) -> EngineResult<()> {
        self.objects.health_check().await?;
        self.metadata.health_check().await?;
        Ok(())
    }

    async fn forget_if_finished(&self, job_id: JobId, status: &JobStatus) {
        if status.is_finished() {
            self.jobs.forget(job_id).await;
        }
    }

    fn is_large(&self, bytes: &Bytes) -> bool {
        bytes.len() as u64 > self.config.diff.background_threshold_bytes
    }
}
