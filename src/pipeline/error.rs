//! Hard pipeline failures.
//!
//! Every variant funnels into the job's retry policy. Coverage failures in
//! best-effort stages never become errors; the pipeline logs and drops them.

use super::ports::{CoverageError, HostingError, SourceControlError};
use crate::job::domain::{JobDomainError, JobId};
use crate::job::ports::JobRepositoryError;
use crate::sandbox::ports::SandboxError;
use crate::workspace::WorkspaceError;
use thiserror::Error;

/// Result type for pipeline stages.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Errors that end a pipeline attempt.
#[derive(Debug, Clone, Error)]
pub enum PipelineError {
    /// The job reached the pipeline without an assigned branch.
    #[error("job {0} has no branch assigned")]
    MissingBranch(JobId),

    /// Cloning the repository failed.
    #[error("clone failed: {0}")]
    Clone(SourceControlError),

    /// Coverage measurement failed in a stage that depends on it.
    #[error("coverage failed: {0}")]
    Coverage(CoverageError),

    /// The generator reported failure or exited unsuccessfully.
    #[error("generation failed: {0}")]
    Generation(String),

    /// The generator succeeded without creating or modifying any file.
    #[error("generation produced no created or modified files")]
    NoChanges,

    /// The generator exceeded its timeout and was stopped.
    #[error("generation timed out after {timeout_secs}s")]
    GenerationTimedOut {
        /// Configured timeout in seconds.
        timeout_secs: u64,
    },

    /// Creating the branch or committing failed.
    #[error("commit failed: {0}")]
    Commit(SourceControlError),

    /// Pushing the branch failed.
    #[error("push failed: {0}")]
    Push(SourceControlError),

    /// Looking up the base branch or opening the pull request failed.
    #[error("pull request failed: {0}")]
    PullRequest(HostingError),

    /// A supervised command could not be run.
    #[error(transparent)]
    Sandbox(#[from] SandboxError),

    /// The job workspace could not be allocated.
    #[error(transparent)]
    Workspace(#[from] WorkspaceError),

    /// A configured template failed to render.
    #[error("failed to render {name} template: {reason}")]
    Template {
        /// Template name, e.g. `pull_request.title`.
        name: String,
        /// Renderer message.
        reason: String,
    },

    /// Persisting a job revision failed.
    #[error(transparent)]
    Repository(#[from] JobRepositoryError),

    /// A job transition was rejected.
    #[error(transparent)]
    Domain(#[from] JobDomainError),
}
