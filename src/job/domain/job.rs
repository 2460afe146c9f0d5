//! Job aggregate root and its revision-producing transitions.

use super::{
    BranchName, CoveragePercent, CoverageSnapshot, JobDomainError, JobId, JobStatus, Progress,
    PullRequestUrl, RepositoryId, RequesterId, TargetPath,
};
use chrono::{DateTime, SecondsFormat, Utc};
use mockable::Clock;
use serde::{Deserialize, Serialize};

/// Validated request for a new job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewJob {
    /// Repository the job targets.
    pub repository_id: RepositoryId,
    /// File whose coverage the job should raise.
    pub target_path: TargetPath,
    /// Identity that asked for the job.
    pub requester: RequesterId,
}

impl NewJob {
    /// Validates raw request fields into a job request.
    ///
    /// # Errors
    ///
    /// Returns the [`JobDomainError`] of the first field that fails
    /// validation.
    pub fn parse(
        repository: impl Into<String>,
        target_path: impl Into<String>,
        requester: impl Into<String>,
    ) -> Result<Self, JobDomainError> {
        Ok(Self {
            repository_id: RepositoryId::new(repository)?,
            target_path: TargetPath::new(target_path)?,
            requester: RequesterId::new(requester)?,
        })
    }
}

/// Append-only narrative of a job.
///
/// Each entry is one line of the form `[<rfc3339>] <message>`. Entries are
/// never rewritten or reordered.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobLog {
    text: String,
    last_logged_at: Option<DateTime<Utc>>,
}

impl JobLog {
    /// Rebuilds a log from its persisted text and timestamp.
    #[must_use]
    pub const fn from_persisted(text: String, last_logged_at: Option<DateTime<Utc>>) -> Self {
        Self {
            text,
            last_logged_at,
        }
    }

    /// Returns a new log with `message` appended.
    ///
    /// Multi-line messages are folded onto one entry so that every line of
    /// the log starts with a timestamp.
    #[must_use]
    pub fn appended(&self, message: &str, at: DateTime<Utc>) -> Self {
        let folded = message
            .lines()
            .map(str::trim_end)
            .filter(|line| !line.is_empty())
            .collect::<Vec<_>>()
            .join(" | ");
        let mut text = self.text.clone();
        if !text.is_empty() {
            text.push('\n');
        }
        text.push('[');
        text.push_str(&at.to_rfc3339_opts(SecondsFormat::Secs, true));
        text.push_str("] ");
        text.push_str(&folded);
        Self {
            text,
            last_logged_at: Some(at),
        }
    }

    /// Returns the full log text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Iterates over log entries, oldest first.
    pub fn entries(&self) -> impl Iterator<Item = &str> {
        self.text.lines()
    }

    /// Returns the timestamp of the newest entry.
    #[must_use]
    pub const fn last_logged_at(&self) -> Option<DateTime<Utc>> {
        self.last_logged_at
    }

    /// Returns whether nothing has been logged yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// Job aggregate root.
///
/// A `Job` is an immutable revision. Every transition borrows the current
/// revision and returns the next one, leaving the original untouched so a
/// pipeline's in-flight job can be read without extra locking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    id: JobId,
    repository_id: RepositoryId,
    target_path: TargetPath,
    requester: RequesterId,
    status: JobStatus,
    progress: Progress,
    log: JobLog,
    branch_name: Option<BranchName>,
    pull_request_url: Option<PullRequestUrl>,
    coverage: CoverageSnapshot,
    attempt_count: u32,
    started_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// Parameter object for reconstructing a persisted job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedJobData {
    /// Persisted job identifier.
    pub id: JobId,
    /// Persisted repository identifier.
    pub repository_id: RepositoryId,
    /// Persisted target file path.
    pub target_path: TargetPath,
    /// Persisted requester identity.
    pub requester: RequesterId,
    /// Persisted lifecycle status.
    pub status: JobStatus,
    /// Persisted progress.
    pub progress: Progress,
    /// Persisted narrative.
    pub log: JobLog,
    /// Persisted branch name, if any.
    pub branch_name: Option<BranchName>,
    /// Persisted pull request URL, if any.
    pub pull_request_url: Option<PullRequestUrl>,
    /// Persisted coverage measurements.
    pub coverage: CoverageSnapshot,
    /// Persisted number of failed attempts.
    pub attempt_count: u32,
    /// Start of the latest attempt, if any.
    pub started_at: Option<DateTime<Utc>>,
    /// Persisted creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Persisted latest revision timestamp.
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Creates a pending job at zero progress.
    #[must_use]
    pub fn new(request: NewJob, clock: &impl Clock) -> Self {
        let timestamp = clock.utc();
        Self {
            id: JobId::new(),
            repository_id: request.repository_id,
            target_path: request.target_path,
            requester: request.requester,
            status: JobStatus::Pending,
            progress: Progress::ZERO,
            log: JobLog::default(),
            branch_name: None,
            pull_request_url: None,
            coverage: CoverageSnapshot::default(),
            attempt_count: 0,
            started_at: None,
            created_at: timestamp,
            updated_at: timestamp,
        }
    }

    /// Reconstructs a job from persisted storage.
    #[must_use]
    pub fn from_persisted(data: PersistedJobData) -> Self {
        Self {
            id: data.id,
            repository_id: data.repository_id,
            target_path: data.target_path,
            requester: data.requester,
            status: data.status,
            progress: data.progress,
            log: data.log,
            branch_name: data.branch_name,
            pull_request_url: data.pull_request_url,
            coverage: data.coverage,
            attempt_count: data.attempt_count,
            started_at: data.started_at,
            created_at: data.created_at,
            updated_at: data.updated_at,
        }
    }

    /// Decomposes the job into its persisted fields.
    #[must_use]
    pub fn into_persisted(self) -> PersistedJobData {
        PersistedJobData {
            id: self.id,
            repository_id: self.repository_id,
            target_path: self.target_path,
            requester: self.requester,
            status: self.status,
            progress: self.progress,
            log: self.log,
            branch_name: self.branch_name,
            pull_request_url: self.pull_request_url,
            coverage: self.coverage,
            attempt_count: self.attempt_count,
            started_at: self.started_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    /// Returns the job identifier.
    #[must_use]
    pub const fn id(&self) -> JobId {
        self.id
    }

    /// Returns the target repository.
    #[must_use]
    pub const fn repository_id(&self) -> &RepositoryId {
        &self.repository_id
    }

    /// Returns the target file path.
    #[must_use]
    pub const fn target_path(&self) -> &TargetPath {
        &self.target_path
    }

    /// Returns the requester identity.
    #[must_use]
    pub const fn requester(&self) -> &RequesterId {
        &self.requester
    }

    /// Returns the lifecycle status.
    #[must_use]
    pub const fn status(&self) -> JobStatus {
        self.status
    }

    /// Returns the completion percentage.
    #[must_use]
    pub const fn progress(&self) -> Progress {
        self.progress
    }

    /// Returns the narrative log.
    #[must_use]
    pub const fn log(&self) -> &JobLog {
        &self.log
    }

    /// Returns the working branch, if assigned.
    #[must_use]
    pub const fn branch_name(&self) -> Option<&BranchName> {
        self.branch_name.as_ref()
    }

    /// Returns the pull request URL, if recorded.
    #[must_use]
    pub const fn pull_request_url(&self) -> Option<&PullRequestUrl> {
        self.pull_request_url.as_ref()
    }

    /// Returns the before/after coverage snapshot.
    #[must_use]
    pub const fn coverage(&self) -> CoverageSnapshot {
        self.coverage
    }

    /// Returns the number of failed attempts so far.
    #[must_use]
    pub const fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    /// Returns when the latest attempt started.
    #[must_use]
    pub const fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    /// Returns the creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns the latest revision timestamp.
    #[must_use]
    pub const fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Moves a pending or retrying job to `Running`.
    ///
    /// # Errors
    ///
    /// Returns [`JobDomainError::InvalidTransition`] unless the job is
    /// `Pending` or `Retry`.
    pub fn start(&self, branch: BranchName, clock: &impl Clock) -> Result<Self, JobDomainError> {
        self.start_at(branch, clock.utc())
    }

    /// Moves a pending or retrying job to `Running` at an explicit instant.
    ///
    /// A branch assigned by an earlier attempt is kept and `branch` is
    /// ignored. Repository adapters use this form so the lock timestamp and
    /// the revision timestamp agree.
    ///
    /// # Errors
    ///
    /// Returns [`JobDomainError::InvalidTransition`] unless the job is
    /// `Pending` or `Retry`.
    pub fn start_at(&self, branch: BranchName, at: DateTime<Utc>) -> Result<Self, JobDomainError> {
        if !self.status.is_executable() {
            return Err(self.invalid_transition(JobStatus::Running));
        }
        let mut next = self.revised(at);
        next.status = JobStatus::Running;
        next.started_at = Some(at);
        if next.branch_name.is_none() {
            next.branch_name = Some(branch);
        }
        Ok(next)
    }

    /// Raises progress and appends `message` to the log.
    ///
    /// # Errors
    ///
    /// Returns [`JobDomainError::InvalidTransition`] unless the job is
    /// `Running`, or [`JobDomainError::ProgressRegression`] when `progress`
    /// is below the current value.
    pub fn update_progress(
        &self,
        progress: Progress,
        message: &str,
        clock: &impl Clock,
    ) -> Result<Self, JobDomainError> {
        self.ensure_running()?;
        if progress < self.progress {
            return Err(JobDomainError::ProgressRegression {
                job_id: self.id,
                current: self.progress,
                requested: progress,
            });
        }
        let mut next = self.logged(message, clock.utc());
        next.progress = progress;
        Ok(next)
    }

    /// Appends `message` to the log without changing progress.
    ///
    /// # Errors
    ///
    /// Returns [`JobDomainError::InvalidTransition`] unless the job is
    /// `Running`.
    pub fn append_log(&self, message: &str, clock: &impl Clock) -> Result<Self, JobDomainError> {
        self.ensure_running()?;
        Ok(self.logged(message, clock.utc()))
    }

    /// Records the baseline coverage of the target file.
    ///
    /// # Errors
    ///
    /// Returns [`JobDomainError::InvalidTransition`] unless the job is
    /// `Running`.
    pub fn record_coverage_before(
        &self,
        coverage: CoveragePercent,
        clock: &impl Clock,
    ) -> Result<Self, JobDomainError> {
        self.ensure_running()?;
        let mut next = self.revised(clock.utc());
        next.coverage.before = Some(coverage);
        Ok(next)
    }

    /// Records the post-generation coverage of the target file.
    ///
    /// # Errors
    ///
    /// Returns [`JobDomainError::InvalidTransition`] unless the job is
    /// `Running`.
    pub fn record_coverage_after(
        &self,
        coverage: CoveragePercent,
        clock: &impl Clock,
    ) -> Result<Self, JobDomainError> {
        self.ensure_running()?;
        let mut next = self.revised(clock.utc());
        next.coverage.after = Some(coverage);
        Ok(next)
    }

    /// Records the opened pull request.
    ///
    /// # Errors
    ///
    /// Returns [`JobDomainError::InvalidTransition`] unless the job is
    /// `Running`, or [`JobDomainError::PullRequestAlreadyRecorded`] when a
    /// URL is already set.
    pub fn record_pull_request(
        &self,
        url: PullRequestUrl,
        clock: &impl Clock,
    ) -> Result<Self, JobDomainError> {
        self.ensure_running()?;
        if self.pull_request_url.is_some() {
            return Err(JobDomainError::PullRequestAlreadyRecorded(self.id));
        }
        let mut next = self.logged(&format!("opened pull request {url}"), clock.utc());
        next.pull_request_url = Some(url);
        Ok(next)
    }

    /// Completes the job at full progress.
    ///
    /// # Errors
    ///
    /// Returns [`JobDomainError::InvalidTransition`] unless the job is
    /// `Running`, or [`JobDomainError::MissingPullRequest`] when no pull
    /// request has been recorded.
    pub fn succeed(&self, clock: &impl Clock) -> Result<Self, JobDomainError> {
        self.guard(JobStatus::Succeeded)?;
        if self.pull_request_url.is_none() {
            return Err(JobDomainError::MissingPullRequest(self.id));
        }
        let mut next = self.logged("job succeeded", clock.utc());
        next.status = JobStatus::Succeeded;
        next.progress = Progress::COMPLETE;
        Ok(next)
    }

    /// Records a failed attempt and decides between retry and give-up.
    ///
    /// The attempt counter grows by one. The job becomes `Failed` when the
    /// new count reaches `max_attempts`, otherwise `Retry`. `reason` is
    /// appended to the log either way.
    ///
    /// # Errors
    ///
    /// Returns [`JobDomainError::InvalidMaxAttempts`] when `max_attempts` is
    /// zero, or [`JobDomainError::InvalidTransition`] unless the job is
    /// `Running`.
    pub fn mark_for_retry(
        &self,
        reason: &str,
        max_attempts: u32,
        clock: &impl Clock,
    ) -> Result<Self, JobDomainError> {
        if max_attempts == 0 {
            return Err(JobDomainError::InvalidMaxAttempts);
        }
        let attempts = self.attempt_count.saturating_add(1);
        let target = if attempts >= max_attempts {
            JobStatus::Failed
        } else {
            JobStatus::Retry
        };
        self.guard(target)?;
        let message = format!("attempt {attempts}/{max_attempts} failed: {reason}");
        let mut next = self.logged(&message, clock.utc());
        next.attempt_count = attempts;
        next.status = target;
        Ok(next)
    }

    /// Resets a failed job to `Pending` for another round of attempts.
    ///
    /// Progress drops to zero and the branch, pull request, and coverage
    /// linkage is cleared. The attempt counter and the log are kept.
    ///
    /// # Errors
    ///
    /// Returns [`JobDomainError::InvalidTransition`] unless the job is
    /// `Failed`.
    pub fn retry(&self, clock: &impl Clock) -> Result<Self, JobDomainError> {
        self.guard(JobStatus::Pending)?;
        let mut next = self.logged("manual retry requested", clock.utc());
        next.status = JobStatus::Pending;
        next.progress = Progress::ZERO;
        next.branch_name = None;
        next.pull_request_url = None;
        next.coverage = CoverageSnapshot::default();
        next.started_at = None;
        Ok(next)
    }

    fn ensure_running(&self) -> Result<(), JobDomainError> {
        if self.status == JobStatus::Running {
            Ok(())
        } else {
            Err(self.invalid_transition(JobStatus::Running))
        }
    }

    fn guard(&self, target: JobStatus) -> Result<(), JobDomainError> {
        if self.status.can_transition_to(target) {
            Ok(())
        } else {
            Err(self.invalid_transition(target))
        }
    }

    const fn invalid_transition(&self, to: JobStatus) -> JobDomainError {
        JobDomainError::InvalidTransition {
            job_id: self.id,
            from: self.status,
            to,
        }
    }

    fn revised(&self, at: DateTime<Utc>) -> Self {
        let mut next = self.clone();
        next.updated_at = at;
        next
    }

    fn logged(&self, message: &str, at: DateTime<Utc>) -> Self {
        let mut next = self.revised(at);
        next.log = self.log.appended(message, at);
        next
    }
}
