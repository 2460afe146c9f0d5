//! Application services for job creation, lookup, and manual retry.

mod lifecycle;

pub use lifecycle::{CreateJobRequest, JobLifecycleError, JobLifecycleResult, JobLifecycleService};
