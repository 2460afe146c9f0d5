//! Domain model for coverage-improvement jobs.
//!
//! The job domain models the finite-state lifecycle, progress and narrative
//! tracking, and branch and pull request linkage while keeping all
//! infrastructure concerns outside of the domain boundary.

mod branch;
mod coverage;
mod error;
mod ids;
mod job;
mod progress;
mod pull_request;
mod status;

pub use branch::BranchName;
pub use coverage::{CoveragePercent, CoverageSnapshot};
pub use error::{JobDomainError, ParseJobStatusError};
pub use ids::{JobId, RepositoryId, RequesterId, TargetPath};
pub use job::{Job, JobLog, NewJob, PersistedJobData};
pub use progress::Progress;
pub use pull_request::PullRequestUrl;
pub use status::JobStatus;
