//! Hosting service port (repository lookup and pull requests).

use super::CloneUrls;
use crate::job::domain::{BranchName, PullRequestUrl, RepositoryId};
use crate::sandbox::ports::SandboxError;
use async_trait::async_trait;
use thiserror::Error;

/// Result type for hosting operations.
pub type HostingResult<T> = Result<T, HostingError>;

/// Repository metadata needed to run a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryInfo {
    /// Loggable clone URL.
    pub clone_url: String,
    /// Branch pull requests target.
    pub default_branch: String,
}

/// Pull request to open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequestDraft {
    /// Target repository.
    pub repository: RepositoryId,
    /// Branch carrying the change.
    pub head: BranchName,
    /// Branch the change merges into.
    pub base: String,
    /// Pull request title.
    pub title: String,
    /// Pull request description.
    pub body: String,
}

/// Pull request returned by the hosting service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedPullRequest {
    /// Web URL of the pull request.
    pub url: PullRequestUrl,
    /// Pull request number.
    pub number: u64,
}

/// Hosting service operations.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HostingApi: Send + Sync {
    /// Looks up a repository.
    async fn get_repository(&self, repository: &RepositoryId) -> HostingResult<RepositoryInfo>;

    /// Opens a pull request.
    async fn create_pull_request(
        &self,
        draft: &PullRequestDraft,
    ) -> HostingResult<CreatedPullRequest>;

    /// Builds the authenticated and loggable clone URLs for `repository`.
    fn clone_urls(&self, repository: &RepositoryId) -> CloneUrls;
}

/// Errors returned by hosting adapters.
#[derive(Debug, Clone, Error)]
pub enum HostingError {
    /// The repository does not exist or is not visible to the credential.
    #[error("repository not found: {0}")]
    RepositoryNotFound(RepositoryId),

    /// The hosting service rejected or failed a request.
    #[error("hosting request failed: {0}")]
    Request(String),

    /// The hosting CLI could not be run.
    #[error(transparent)]
    Sandbox(#[from] SandboxError),
}
