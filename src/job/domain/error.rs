//! Error types for job domain validation and state transitions.

use super::{JobId, JobStatus, Progress};
use thiserror::Error;

/// Errors returned while constructing or transitioning domain job values.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum JobDomainError {
    /// The repository identifier does not follow `owner/name` format.
    #[error("invalid repository '{0}', expected owner/name")]
    InvalidRepository(String),

    /// The target file path is empty, absolute, or escapes the repository.
    #[error("invalid target path '{0}', expected a relative path inside the repository")]
    InvalidTargetPath(String),

    /// The requester identity is empty after trimming.
    #[error("requester identity must not be empty")]
    EmptyRequester,

    /// The branch name failed validation.
    #[error("invalid branch name: {0}")]
    InvalidBranchName(String),

    /// The pull request URL failed validation.
    #[error("invalid pull request URL: {0}")]
    InvalidPullRequestUrl(String),

    /// A progress value lies outside `0..=100`.
    #[error("invalid progress {0}, expected 0..=100")]
    InvalidProgress(u16),

    /// A coverage value lies outside `0..=10000` basis points or is not finite.
    #[error("invalid coverage value {0}")]
    InvalidCoverage(String),

    /// The attempt ceiling must allow at least one attempt.
    #[error("max attempts must be at least 1")]
    InvalidMaxAttempts,

    /// The requested status change is not allowed from the current status.
    #[error("invalid transition for job {job_id}: {from} -> {to}")]
    InvalidTransition {
        /// Job whose transition was rejected.
        job_id: JobId,
        /// Status at the time of the request.
        from: JobStatus,
        /// Requested target status.
        to: JobStatus,
    },

    /// A progress update would move progress backwards.
    #[error("progress for job {job_id} cannot move from {current} to {requested}")]
    ProgressRegression {
        /// Job whose progress update was rejected.
        job_id: JobId,
        /// Progress currently recorded.
        current: Progress,
        /// Progress that was requested.
        requested: Progress,
    },

    /// The job already has a recorded pull request.
    #[error("job {0} already has a pull request")]
    PullRequestAlreadyRecorded(JobId),

    /// The job cannot succeed before its pull request is recorded.
    #[error("job {0} cannot succeed without a recorded pull request")]
    MissingPullRequest(JobId),
}

/// Error returned while parsing job statuses from persistence.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown job status: {0}")]
pub struct ParseJobStatusError(pub String);
