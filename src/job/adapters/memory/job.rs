//! In-memory repository for job lifecycle tests and single-process runs.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::job::{
    domain::{Job, JobId, JobStatus},
    ports::{JobRepository, JobRepositoryError, JobRepositoryResult, LockRequest},
};

/// Thread-safe in-memory job repository.
///
/// The repository lock is a compare-and-swap performed while holding the
/// state write guard, so concurrent acquisitions for one repository
/// serialize and at most one succeeds.
#[derive(Debug, Clone, Default)]
pub struct InMemoryJobRepository {
    state: Arc<RwLock<InMemoryJobState>>,
}

#[derive(Debug, Default)]
struct InMemoryJobState {
    jobs: HashMap<JobId, Job>,
}

impl InMemoryJobRepository {
    /// Creates an empty in-memory repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> JobRepositoryResult<RwLockReadGuard<'_, InMemoryJobState>> {
        self.state
            .read()
            .map_err(|err| JobRepositoryError::persistence(std::io::Error::other(err.to_string())))
    }

    fn write(&self) -> JobRepositoryResult<RwLockWriteGuard<'_, InMemoryJobState>> {
        self.state
            .write()
            .map_err(|err| JobRepositoryError::persistence(std::io::Error::other(err.to_string())))
    }
}

fn sorted_by_creation(mut jobs: Vec<Job>) -> Vec<Job> {
    jobs.sort_by(|left, right| {
        left.created_at()
            .cmp(&right.created_at())
            .then_with(|| left.id().cmp(&right.id()))
    });
    jobs
}

#[async_trait]
impl JobRepository for InMemoryJobRepository {
    async fn create(&self, job: &Job) -> JobRepositoryResult<()> {
        let mut state = self.write()?;
        if state.jobs.contains_key(&job.id()) {
            return Err(JobRepositoryError::DuplicateJob(job.id()));
        }
        state.jobs.insert(job.id(), job.clone());
        Ok(())
    }

    async fn update(&self, job: &Job) -> JobRepositoryResult<()> {
        let mut state = self.write()?;
        let slot = state
            .jobs
            .get_mut(&job.id())
            .ok_or(JobRepositoryError::NotFound(job.id()))?;
        *slot = job.clone();
        Ok(())
    }

    async fn find_by_id(&self, id: JobId) -> JobRepositoryResult<Option<Job>> {
        let state = self.read()?;
        Ok(state.jobs.get(&id).cloned())
    }

    async fn list_executable(&self) -> JobRepositoryResult<Vec<Job>> {
        let state = self.read()?;
        let jobs = state
            .jobs
            .values()
            .filter(|job| job.status().is_executable())
            .cloned()
            .collect();
        Ok(sorted_by_creation(jobs))
    }

    async fn list_running(&self) -> JobRepositoryResult<Vec<Job>> {
        let state = self.read()?;
        let jobs = state
            .jobs
            .values()
            .filter(|job| job.status() == JobStatus::Running)
            .cloned()
            .collect();
        Ok(sorted_by_creation(jobs))
    }

    async fn try_acquire_lock(&self, request: LockRequest) -> JobRepositoryResult<Option<Job>> {
        let mut state = self.write()?;

        let repository_busy = state.jobs.values().any(|job| {
            job.repository_id() == &request.repository_id && job.status() == JobStatus::Running
        });
        if repository_busy {
            return Ok(None);
        }

        let Some(current) = state.jobs.get(&request.job_id) else {
            return Ok(None);
        };
        if current.repository_id() != &request.repository_id {
            return Ok(None);
        }
        let Ok(running) = current.start_at(request.branch_name, request.acquired_at) else {
            return Ok(None);
        };
        state.jobs.insert(running.id(), running.clone());
        Ok(Some(running))
    }
}
