//! Collaborator contracts consumed by the pipeline.
//!
//! Every port is object safe so the worker can wire CLI adapters while tests
//! wire in-memory fakes.

mod coverage;
mod credential;
mod hosting;
mod source_control;

pub use coverage::{CoverageError, CoverageResult, CoverageTool, FileCoverage};
pub use credential::{CloneUrls, Credential};
pub use hosting::{
    CreatedPullRequest, HostingApi, HostingError, HostingResult, PullRequestDraft, RepositoryInfo,
};
pub use source_control::{ChangedFiles, SourceControl, SourceControlError, SourceControlResult};

#[cfg(test)]
pub use coverage::MockCoverageTool;
#[cfg(test)]
pub use hosting::MockHostingApi;
#[cfg(test)]
pub use source_control::MockSourceControl;
