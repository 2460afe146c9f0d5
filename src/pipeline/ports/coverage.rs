//! Coverage measurement port.

use crate::job::domain::{CoveragePercent, TargetPath};
use crate::sandbox::ports::SandboxError;
use async_trait::async_trait;
use camino::{Utf8Path, Utf8PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// Result type for coverage operations.
pub type CoverageResult<T> = Result<T, CoverageError>;

/// Coverage of one source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileCoverage {
    /// File path as reported by the tool.
    pub file_path: String,
    /// Line coverage.
    pub percent: CoveragePercent,
    /// Covered lines.
    pub covered: u64,
    /// Total lines.
    pub total: u64,
}

impl FileCoverage {
    /// Returns whether this entry describes `target`.
    ///
    /// Tools report absolute or differently rooted paths, so an entry
    /// matches when its normalized path equals the target or ends with
    /// `/<target>`.
    #[must_use]
    pub fn matches(&self, target: &TargetPath) -> bool {
        let reported = self.file_path.replace('\\', "/");
        let wanted = target.as_str();
        reported == wanted || reported.ends_with(&format!("/{wanted}"))
    }
}

/// Runs a coverage tool and reads its summary.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CoverageTool: Send + Sync {
    /// Runs the test suite with coverage in `workspace` and returns the
    /// location of the summary it wrote.
    async fn run(&self, workspace: &Utf8Path) -> CoverageResult<Utf8PathBuf>;

    /// Parses a summary written by [`CoverageTool::run`].
    async fn parse(&self, summary: &Utf8Path) -> CoverageResult<Vec<FileCoverage>>;
}

/// Coverage failures. The pipeline treats all of them as best-effort.
#[derive(Debug, Clone, Error)]
pub enum CoverageError {
    /// The coverage command exited unsuccessfully.
    #[error("coverage run failed: {0}")]
    RunFailed(String),

    /// The summary was missing or unreadable.
    #[error("coverage summary unreadable: {0}")]
    Summary(Arc<dyn std::error::Error + Send + Sync>),

    /// The summary did not mention the target file.
    #[error("no coverage reported for {0}")]
    TargetMissing(TargetPath),

    /// The coverage tool could not be run.
    #[error(transparent)]
    Sandbox(#[from] SandboxError),
}

impl CoverageError {
    /// Wraps a summary read or decode failure.
    pub fn summary(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Summary(Arc::new(err))
    }
}
