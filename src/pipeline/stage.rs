//! The fixed stage sequence.

use crate::job::domain::Progress;
use std::fmt;

/// Pipeline stages in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Clone the repository and check out the job branch.
    Clone,
    /// Measure coverage before generation. Best-effort.
    Baseline,
    /// Run the generator in the sandbox.
    Generate,
    /// Measure coverage after generation. Best-effort.
    Verify,
    /// Commit and push the branch.
    Push,
    /// Open the pull request and complete the job.
    PullRequest,
}

impl Stage {
    /// Progress recorded once the stage completes.
    #[must_use]
    pub const fn progress(self) -> Progress {
        Progress::saturating(match self {
            Self::Clone => 5,
            Self::Baseline => 25,
            Self::Generate => 50,
            Self::Verify => 75,
            Self::Push => 90,
            Self::PullRequest => 100,
        })
    }

    /// Returns whether a failure in this stage is logged and ignored.
    #[must_use]
    pub const fn is_best_effort(self) -> bool {
        matches!(self, Self::Baseline | Self::Verify)
    }

    /// Stable name used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Clone => "clone",
            Self::Baseline => "baseline",
            Self::Generate => "generate",
            Self::Verify => "verify",
            Self::Push => "push",
            Self::PullRequest => "pull_request",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
