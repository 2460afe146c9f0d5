//! Errors that abort a whole poll tick.

use crate::job::ports::JobRepositoryError;
use thiserror::Error;

/// Result type for poll loop operations.
pub type DispatchResult<T> = Result<T, DispatchError>;

/// Failures that prevent a tick from considering any job.
///
/// Problems with a single candidate are logged and counted in
/// [`super::TickSummary`] instead.
#[derive(Debug, Clone, Error)]
pub enum DispatchError {
    /// Runnable jobs could not be listed.
    #[error("failed to list executable jobs: {0}")]
    ListExecutable(#[source] JobRepositoryError),
}
