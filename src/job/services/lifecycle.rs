//! Service layer for job creation, retrieval, and manual retry.

use crate::job::{
    domain::{Job, JobDomainError, JobId, NewJob},
    ports::{JobRepository, JobRepositoryError},
};
use crate::pipeline::ports::{HostingApi, HostingError};
use mockable::Clock;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

/// Request payload for creating a coverage job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateJobRequest {
    repository: String,
    target_path: String,
    requester: String,
}

impl CreateJobRequest {
    /// Creates a request for raising coverage of `target_path` in
    /// `repository` (`owner/name`).
    #[must_use]
    pub fn new(
        repository: impl Into<String>,
        target_path: impl Into<String>,
        requester: impl Into<String>,
    ) -> Self {
        Self {
            repository: repository.into(),
            target_path: target_path.into(),
            requester: requester.into(),
        }
    }
}

/// Service-level errors for job lifecycle operations.
#[derive(Debug, Error)]
pub enum JobLifecycleError {
    /// Domain validation failed.
    #[error(transparent)]
    Domain(#[from] JobDomainError),
    /// Repository operation failed.
    #[error(transparent)]
    Repository(#[from] JobRepositoryError),
    /// The hosting service could not confirm the repository.
    #[error(transparent)]
    Hosting(#[from] HostingError),
}

/// Result type for job lifecycle service operations.
pub type JobLifecycleResult<T> = Result<T, JobLifecycleError>;

/// Job lifecycle orchestration service.
#[derive(Clone)]
pub struct JobLifecycleService<R, C>
where
    R: JobRepository,
    C: Clock + Send + Sync,
{
    repository: Arc<R>,
    hosting: Arc<dyn HostingApi>,
    clock: Arc<C>,
}

impl<R, C> JobLifecycleService<R, C>
where
    R: JobRepository,
    C: Clock + Send + Sync,
{
    /// Creates a new job lifecycle service.
    #[must_use]
    pub fn new(repository: Arc<R>, hosting: Arc<dyn HostingApi>, clock: Arc<C>) -> Self {
        Self {
            repository,
            hosting,
            clock,
        }
    }

    /// Validates the request, confirms the repository exists, and stores a
    /// `Pending` job.
    ///
    /// # Errors
    ///
    /// Returns [`JobLifecycleError::Domain`] for malformed input,
    /// [`JobLifecycleError::Hosting`] when the repository lookup fails, and
    /// [`JobLifecycleError::Repository`] when persistence rejects the job.
    pub async fn create_job(&self, request: CreateJobRequest) -> JobLifecycleResult<Job> {
        let new_job = NewJob::parse(request.repository, request.target_path, request.requester)?;
        self.hosting.get_repository(&new_job.repository_id).await?;

        let job = Job::new(new_job, &*self.clock);
        self.repository.create(&job).await?;
        info!(job_id = %job.id(), repository_id = %job.repository_id(), "created job");
        Ok(job)
    }

    /// Retrieves a job by identifier.
    ///
    /// Returns `Ok(None)` when no such job exists.
    ///
    /// # Errors
    ///
    /// Returns [`JobLifecycleError::Repository`] when persistence lookup
    /// fails.
    pub async fn find_by_id(&self, job_id: JobId) -> JobLifecycleResult<Option<Job>> {
        Ok(self.repository.find_by_id(job_id).await?)
    }

    /// Sends a `Failed` job back to `Pending`.
    ///
    /// # Errors
    ///
    /// Returns [`JobRepositoryError::NotFound`] (wrapped) when the job does
    /// not exist, or [`JobDomainError::InvalidTransition`] (wrapped) unless
    /// the job is `Failed`.
    pub async fn retry(&self, job_id: JobId) -> JobLifecycleResult<Job> {
        let job = self
            .repository
            .find_by_id(job_id)
            .await?
            .ok_or(JobRepositoryError::NotFound(job_id))?;
        let pending = job.retry(&*self.clock)?;
        self.repository.update(&pending).await?;
        info!(%job_id, attempts = pending.attempt_count(), "job queued for manual retry");
        Ok(pending)
    }
}
