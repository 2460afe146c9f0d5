//! Job lifecycle status and its transition table.

use super::ParseJobStatusError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Job lifecycle status.
///
/// ```text
/// Pending ──► Running ──► Succeeded
///    ▲          │ ▲ │
///    │          │ │ └──► Retry ──► Running
///    │          ▼ │
///    └────── Failed (manual retry only)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Job is waiting for its first dispatch.
    Pending,
    /// A previous attempt failed and the job waits for another dispatch.
    Retry,
    /// A pipeline currently owns the job and its repository lock.
    Running,
    /// The pull request was opened and recorded.
    Succeeded,
    /// The attempt ceiling was reached.
    Failed,
}

impl JobStatus {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Retry => "retry",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }

    /// Returns whether a job in this status can be picked up by the poll loop.
    #[must_use]
    pub const fn is_executable(self) -> bool {
        matches!(self, Self::Pending | Self::Retry)
    }

    /// Returns whether the status ends a pipeline run.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }

    /// Returns whether moving from `self` to `target` is permitted.
    ///
    /// `Running -> Running` is permitted and covers progress, log, and
    /// linkage updates made while a pipeline owns the job.
    #[must_use]
    pub const fn can_transition_to(self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Pending | Self::Retry, Self::Running)
                | (
                    Self::Running,
                    Self::Running | Self::Succeeded | Self::Retry | Self::Failed
                )
                | (Self::Failed, Self::Pending)
        )
    }
}

impl TryFrom<&str> for JobStatus {
    type Error = ParseJobStatusError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let normalized = value.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "pending" => Ok(Self::Pending),
            "retry" => Ok(Self::Retry),
            "running" => Ok(Self::Running),
            "succeeded" => Ok(Self::Succeeded),
            "failed" => Ok(Self::Failed),
            _ => Err(ParseJobStatusError(value.to_owned())),
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
