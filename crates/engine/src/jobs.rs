//! Background execution of large version jobs.
//!
//! Each job runs on its own tokio task. Its completion is exposed through a
//! shared future, so any number of callers can poll or await the same job and
//! a panicking task is reported as failed instead of vanishing. Finished jobs
//! stay in the registry until they are forgotten or pruned.

use crate::error::{EngineResult, ErrorKind};
use crate::metrics;
use crate::versions::UploadResult;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Identifier of a background job.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "JobId({})", self.0)
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Observable state of a job.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Completed { result: UploadResult },
    Failed {
        /// `None` when the task panicked or was cancelled.
        kind: Option<ErrorKind>,
        message: String,
    },
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed { .. } => "completed",
            Self::Failed { .. } => "failed",
        }
    }

    pub fn is_finished(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

type JobFuture = Shared<BoxFuture<'static, JobStatus>>;

/// Keeps the active-jobs gauge accurate even when the job unwinds.
struct ActiveJobGuard;

impl ActiveJobGuard {
    fn enter() -> Self {
        metrics::JOBS_ACTIVE.inc();
        Self
    }
}

impl Drop for ActiveJobGuard {
    fn drop(&mut self) {
        metrics::JOBS_ACTIVE.dec();
    }
}

/// Registry of spawned background jobs.
#[derive(Default)]
pub struct JobRegistry {
    jobs: Mutex<HashMap<JobId, JobFuture>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn `work` on the runtime and track it.
    pub async fn spawn<F>(&self, work: F) -> JobId
    where
        F: Future<Output = EngineResult<UploadResult>> + Send + 'static,
    {
        let job_id = JobId::new();
        let handle = tokio::spawn(async move {
            let _guard = ActiveJobGuard::enter();
            work.await
        });

        let status = async move {
            match handle.await {
                Ok(Ok(result)) => {
                    tracing::info!(job_id = %job_id, version_number = result.version_number, "job completed");
                    JobStatus::Completed { result }
                }
                Ok(Err(err)) => {
                    tracing::warn!(job_id = %job_id, error = %err, "job failed");
                    JobStatus::Failed {
                        kind: Some(err.kind()),
                        message: err.to_string(),
                    }
                }
                Err(join_err) if join_err.is_panic() => {
                    metrics::JOBS_PANICKED.inc();
                    tracing::error!(job_id = %job_id, panic = ?join_err, "job panicked, marking as failed");
                    JobStatus::Failed {
                        kind: None,
                        message: "job panicked".to_string(),
                    }
                }
                Err(join_err) => {
                    tracing::warn!(job_id = %job_id, error = %join_err, "job cancelled");
                    JobStatus::Failed {
                        kind: None,
                        message: format!("job cancelled: {join_err}"),
                    }
                }
            }
        }
        .boxed()
        .shared();

        // Drive the status to completion even if nobody waits, so pruning
        // sees the job as finished.
        tokio::spawn(status.clone());

        self.jobs.lock().await.insert(job_id, status);
        tracing::debug!(job_id = %job_id, "job spawned");
        job_id
    }

    /// Current status without waiting. `None` for unknown jobs.
    pub async fn status(&self, job_id: JobId) -> Option<JobStatus> {
        let job = self.jobs.lock().await.get(&job_id).cloned()?;
        Some(job.now_or_never().unwrap_or(JobStatus::Pending))
    }

    /// Wait for a job to finish. `None` for unknown jobs.
    pub async fn wait(&self, job_id: JobId) -> Option<JobStatus> {
        // Clone out of the map so the registry lock is not held while waiting.
        let job = self.jobs.lock().await.get(&job_id).cloned()?;
        Some(job.await)
    }

    /// Stop tracking one job. Returns whether it was tracked.
    pub async fn forget(&self, job_id: JobId) -> bool {
        self.jobs.lock().await.remove(&job_id).is_some()
    }

    /// Forget every finished job, returning how many were removed.
    pub async fn prune_finished(&self) -> usize {
        let mut jobs = self.jobs.lock().await;
        let before = jobs.len();
        jobs.retain(|_, job| job.peek().is_none());
        before - jobs.len()
    }

    /// Number of tracked jobs.
    pub async fn len(&self) -> usize {
        self.jobs.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.lock().await.is_empty()
    }
}
