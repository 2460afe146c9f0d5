//! Source control port.

use super::CloneUrls;
use crate::job::domain::BranchName;
use crate::sandbox::ports::SandboxError;
use async_trait::async_trait;
use camino::Utf8Path;
use thiserror::Error;

/// Result type for source control operations.
pub type SourceControlResult<T> = Result<T, SourceControlError>;

/// Files that differ from the checked-out commit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangedFiles {
    /// Untracked files, relative to the repository root.
    pub created: Vec<String>,
    /// Tracked files with modifications.
    pub modified: Vec<String>,
}

impl ChangedFiles {
    /// Returns whether nothing changed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.modified.is_empty()
    }
}

/// Version control operations on a workspace checkout.
///
/// Error messages must already be free of credentials.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SourceControl: Send + Sync {
    /// Clones `url` into the empty directory `dest`.
    async fn clone_repository(&self, url: &CloneUrls, dest: &Utf8Path) -> SourceControlResult<()>;

    /// Creates and checks out `branch` in `repo`.
    async fn checkout_new_branch(&self, repo: &Utf8Path, branch: &BranchName)
    -> SourceControlResult<()>;

    /// Stages every change in `repo` and commits it.
    async fn commit_all(&self, repo: &Utf8Path, message: &str) -> SourceControlResult<()>;

    /// Force-pushes `branch` to `remote`.
    async fn push(
        &self,
        repo: &Utf8Path,
        branch: &BranchName,
        remote: &CloneUrls,
    ) -> SourceControlResult<()>;

    /// Lists created and modified files in `repo`.
    async fn changed_files(&self, repo: &Utf8Path) -> SourceControlResult<ChangedFiles>;
}

/// Errors returned by source control adapters.
#[derive(Debug, Clone, Error)]
pub enum SourceControlError {
    /// A git command exited unsuccessfully.
    #[error("git {operation} failed: {detail}")]
    Failed {
        /// Operation that failed, e.g. `clone`.
        operation: String,
        /// Redacted diagnostic output.
        detail: String,
    },

    /// The git process could not be run.
    #[error(transparent)]
    Sandbox(#[from] SandboxError),
}
