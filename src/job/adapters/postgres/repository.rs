//! `PostgreSQL` repository implementation for job storage.

use super::{
    models::{JobRow, NewJobRow},
    schema::jobs,
};
use crate::job::{
    domain::{
        BranchName, CoveragePercent, CoverageSnapshot, Job, JobId, JobLog, JobStatus,
        PersistedJobData, Progress, PullRequestUrl, RepositoryId, RequesterId, TargetPath,
    },
    ports::{JobRepository, JobRepositoryError, JobRepositoryResult, LockRequest},
};
use async_trait::async_trait;
use diesel::connection::SimpleConnection;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel::result::{DatabaseErrorInformation, DatabaseErrorKind, Error as DieselError};

/// `PostgreSQL` connection pool type used by job adapters.
pub type JobPgPool = Pool<ConnectionManager<PgConnection>>;

/// Idempotent DDL creating the `jobs` table and its indexes.
pub const SCHEMA_SQL: &str =
    include_str!("../../../../migrations/2026-10-18-000000_create_jobs/up.sql");

const RUNNING_REPOSITORY_INDEX: &str = "idx_jobs_running_repository_unique";

const ACQUIRE_LOCK_SQL: &str = concat!(
    "UPDATE jobs SET status = 'running', ",
    "branch_name = COALESCE(branch_name, $3), ",
    "started_at = $4, updated_at = $4 ",
    "WHERE id = $1 AND repository_id = $2 AND status IN ('pending', 'retry') ",
    "AND NOT EXISTS (SELECT 1 FROM jobs AS held ",
    "WHERE held.repository_id = $2 AND held.status = 'running') ",
    "RETURNING id, repository_id, target_path, requester, status, progress, log, ",
    "last_log_at, branch_name, pull_request_url, coverage_before, coverage_after, ",
    "attempt_count, started_at, created_at, updated_at",
);

/// `PostgreSQL`-backed job repository.
#[derive(Debug, Clone)]
pub struct PostgresJobRepository {
    pool: JobPgPool,
}

impl PostgresJobRepository {
    /// Creates a new repository from a `PostgreSQL` connection pool.
    #[must_use]
    pub const fn new(pool: JobPgPool) -> Self {
        Self { pool }
    }

    /// Applies [`SCHEMA_SQL`].
    ///
    /// # Errors
    ///
    /// Returns [`JobRepositoryError::Persistence`] when the DDL fails.
    pub async fn ensure_schema(&self) -> JobRepositoryResult<()> {
        self.run_blocking(|connection| {
            connection
                .batch_execute(SCHEMA_SQL)
                .map_err(JobRepositoryError::persistence)
        })
        .await
    }

    async fn run_blocking<F, T>(&self, f: F) -> JobRepositoryResult<T>
    where
        F: FnOnce(&mut PgConnection) -> JobRepositoryResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut connection = pool.get().map_err(JobRepositoryError::persistence)?;
            f(&mut connection)
        })
        .await
        .map_err(JobRepositoryError::persistence)?
    }
}

#[async_trait]
impl JobRepository for PostgresJobRepository {
    async fn create(&self, job: &Job) -> JobRepositoryResult<()> {
        let job_id = job.id();
        let new_row = to_row(job)?;

        self.run_blocking(move |connection| {
            diesel::insert_into(jobs::table)
                .values(&new_row)
                .execute(connection)
                .map_err(|err| match err {
                    DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
                        JobRepositoryError::DuplicateJob(job_id)
                    }
                    _ => JobRepositoryError::persistence(err),
                })?;
            Ok(())
        })
        .await
    }

    async fn update(&self, job: &Job) -> JobRepositoryResult<()> {
        let job_id = job.id();
        let row = to_row(job)?;

        self.run_blocking(move |connection| {
            let updated = diesel::update(jobs::table.find(job_id.into_inner()))
                .set(&row)
                .execute(connection)
                .map_err(JobRepositoryError::persistence)?;
            if updated == 0 {
                return Err(JobRepositoryError::NotFound(job_id));
            }
            Ok(())
        })
        .await
    }

    async fn find_by_id(&self, id: JobId) -> JobRepositoryResult<Option<Job>> {
        self.run_blocking(move |connection| {
            let row = jobs::table
                .filter(jobs::id.eq(id.into_inner()))
                .select(JobRow::as_select())
                .first::<JobRow>(connection)
                .optional()
                .map_err(JobRepositoryError::persistence)?;
            row.map(row_to_job).transpose()
        })
        .await
    }

    async fn list_executable(&self) -> JobRepositoryResult<Vec<Job>> {
        self.list_by_status(&[JobStatus::Pending, JobStatus::Retry])
            .await
    }

    async fn list_running(&self) -> JobRepositoryResult<Vec<Job>> {
        self.list_by_status(&[JobStatus::Running]).await
    }

    async fn try_acquire_lock(&self, request: LockRequest) -> JobRepositoryResult<Option<Job>> {
        self.run_blocking(move |connection| {
            let result = diesel::sql_query(ACQUIRE_LOCK_SQL)
                .bind::<diesel::sql_types::Uuid, _>(request.job_id.into_inner())
                .bind::<diesel::sql_types::Text, _>(request.repository_id.as_str())
                .bind::<diesel::sql_types::Text, _>(request.branch_name.as_str())
                .bind::<diesel::sql_types::Timestamptz, _>(request.acquired_at)
                .get_result::<JobRow>(connection)
                .optional();

            match result {
                Ok(row) => row.map(row_to_job).transpose(),
                // Two acquisitions raced past NOT EXISTS; the index picked one.
                Err(DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, ref info))
                    if is_running_repository_violation(info.as_ref()) =>
                {
                    Ok(None)
                }
                Err(err) => Err(JobRepositoryError::persistence(err)),
            }
        })
        .await
    }
}

impl PostgresJobRepository {
    async fn list_by_status(&self, statuses: &[JobStatus]) -> JobRepositoryResult<Vec<Job>> {
        let wanted: Vec<String> = statuses
            .iter()
            .map(|status| status.as_str().to_owned())
            .collect();
        self.run_blocking(move |connection| {
            let rows = jobs::table
                .filter(jobs::status.eq_any(wanted))
                .order((jobs::created_at.asc(), jobs::id.asc()))
                .select(JobRow::as_select())
                .load::<JobRow>(connection)
                .map_err(JobRepositoryError::persistence)?;
            rows.into_iter().map(row_to_job).collect()
        })
        .await
    }
}

fn to_row(job: &Job) -> JobRepositoryResult<NewJobRow> {
    let coverage = job.coverage();
    Ok(NewJobRow {
        id: job.id().into_inner(),
        repository_id: job.repository_id().as_str().to_owned(),
        target_path: job.target_path().as_str().to_owned(),
        requester: job.requester().as_str().to_owned(),
        status: job.status().as_str().to_owned(),
        progress: i16::from(job.progress().value()),
        log: job.log().as_str().to_owned(),
        last_log_at: job.log().last_logged_at(),
        branch_name: job.branch_name().map(|branch| branch.as_str().to_owned()),
        pull_request_url: job.pull_request_url().map(|url| url.as_str().to_owned()),
        coverage_before: coverage.before.map(coverage_to_column).transpose()?,
        coverage_after: coverage.after.map(coverage_to_column).transpose()?,
        attempt_count: i32::try_from(job.attempt_count())
            .map_err(JobRepositoryError::persistence)?,
        started_at: job.started_at(),
        created_at: job.created_at(),
        updated_at: job.updated_at(),
    })
}

fn coverage_to_column(coverage: CoveragePercent) -> JobRepositoryResult<i16> {
    i16::try_from(coverage.basis_points()).map_err(JobRepositoryError::persistence)
}

fn coverage_from_column(value: Option<i16>) -> JobRepositoryResult<Option<CoveragePercent>> {
    value
        .map(|raw| {
            let basis_points = u16::try_from(raw).map_err(JobRepositoryError::persistence)?;
            CoveragePercent::from_basis_points(basis_points)
                .map_err(JobRepositoryError::persistence)
        })
        .transpose()
}

fn row_to_job(row: JobRow) -> JobRepositoryResult<Job> {
    let JobRow {
        id,
        repository_id,
        target_path,
        requester,
        status,
        progress,
        log,
        last_log_at,
        branch_name,
        pull_request_url,
        coverage_before,
        coverage_after,
        attempt_count,
        started_at,
        created_at,
        updated_at,
    } = row;

    let progress_value = u16::try_from(progress).map_err(JobRepositoryError::persistence)?;
    let data = PersistedJobData {
        id: JobId::from_uuid(id),
        repository_id: RepositoryId::new(repository_id).map_err(JobRepositoryError::persistence)?,
        target_path: TargetPath::new(target_path).map_err(JobRepositoryError::persistence)?,
        requester: RequesterId::new(requester).map_err(JobRepositoryError::persistence)?,
        status: JobStatus::try_from(status.as_str()).map_err(JobRepositoryError::persistence)?,
        progress: Progress::new(progress_value).map_err(JobRepositoryError::persistence)?,
        log: JobLog::from_persisted(log, last_log_at),
        branch_name: branch_name
            .map(BranchName::new)
            .transpose()
            .map_err(JobRepositoryError::persistence)?,
        pull_request_url: pull_request_url
            .map(PullRequestUrl::new)
            .transpose()
            .map_err(JobRepositoryError::persistence)?,
        coverage: CoverageSnapshot {
            before: coverage_from_column(coverage_before)?,
            after: coverage_from_column(coverage_after)?,
        },
        attempt_count: u32::try_from(attempt_count).map_err(JobRepositoryError::persistence)?,
        started_at,
        created_at,
        updated_at,
    };
    Ok(Job::from_persisted(data))
}

fn is_running_repository_violation(info: &dyn DatabaseErrorInformation) -> bool {
    info.constraint_name()
        .is_some_and(|name| name == RUNNING_REPOSITORY_INDEX)
}
