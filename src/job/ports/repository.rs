//! Repository port for job persistence and the per-repository lock.

use crate::job::domain::{BranchName, Job, JobId, RepositoryId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;

/// Result type for job repository operations.
pub type JobRepositoryResult<T> = Result<T, JobRepositoryError>;

/// Arguments of a lock acquisition attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockRequest {
    /// Job that wants to run.
    pub job_id: JobId,
    /// Repository the job targets.
    pub repository_id: RepositoryId,
    /// Branch assigned if the job has none yet.
    pub branch_name: BranchName,
    /// Instant recorded as the attempt start.
    pub acquired_at: DateTime<Utc>,
}

/// Job persistence contract.
#[async_trait]
pub trait JobRepository: Send + Sync {
    /// Stores a new job.
    ///
    /// # Errors
    ///
    /// Returns [`JobRepositoryError::DuplicateJob`] when the job ID already
    /// exists.
    async fn create(&self, job: &Job) -> JobRepositoryResult<()>;

    /// Replaces the stored revision of an existing job.
    ///
    /// # Errors
    ///
    /// Returns [`JobRepositoryError::NotFound`] when the job does not exist.
    async fn update(&self, job: &Job) -> JobRepositoryResult<()>;

    /// Finds a job by identifier.
    ///
    /// Returns `None` when the job does not exist.
    async fn find_by_id(&self, id: JobId) -> JobRepositoryResult<Option<Job>>;

    /// Returns every `Pending` or `Retry` job, oldest first.
    ///
    /// Ties on creation time are broken by job identifier so the order is
    /// total.
    async fn list_executable(&self) -> JobRepositoryResult<Vec<Job>>;

    /// Returns every job currently `Running`.
    async fn list_running(&self) -> JobRepositoryResult<Vec<Job>>;

    /// Atomically moves a job to `Running` while taking its repository lock.
    ///
    /// Succeeds only when the job is `Pending` or `Retry` and no other job
    /// for the same repository is `Running`. The check and the write are a
    /// single conditional transition. Returns the running revision on
    /// success. Returns `None` and changes nothing when the lock is held or
    /// the job is missing or no longer executable.
    async fn try_acquire_lock(&self, request: LockRequest) -> JobRepositoryResult<Option<Job>>;
}

/// Errors returned by job repository implementations.
#[derive(Debug, Clone, Error)]
pub enum JobRepositoryError {
    /// A job with the same identifier already exists.
    #[error("duplicate job identifier: {0}")]
    DuplicateJob(JobId),

    /// The job was not found.
    #[error("job not found: {0}")]
    NotFound(JobId),

    /// Persistence-layer failure.
    #[error("persistence error: {0}")]
    Persistence(Arc<dyn std::error::Error + Send + Sync>),
}

impl JobRepositoryError {
    /// Wraps a persistence error.
    pub fn persistence(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Persistence(Arc::new(err))
    }
}
