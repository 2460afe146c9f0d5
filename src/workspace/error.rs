//! Errors raised while allocating workspaces.

use camino::Utf8PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Result type for workspace operations.
pub type WorkspaceResult<T> = Result<T, WorkspaceError>;

/// Errors returned by [`super::WorkspaceManager`].
///
/// Cleanup never fails, so these only arise from opening the base directory
/// or creating a workspace.
#[derive(Debug, Clone, Error)]
pub enum WorkspaceError {
    /// A filesystem operation failed.
    #[error("workspace I/O error at {path}: {source}")]
    Io {
        /// Path involved in the failing operation.
        path: Utf8PathBuf,
        /// Underlying error.
        source: Arc<std::io::Error>,
    },

    /// The base directory does not resolve to a UTF-8 path.
    #[error("workspace base is not valid UTF-8: {0}")]
    NonUtf8Base(String),

    /// The workspace prefix contains characters other than ASCII
    /// alphanumerics, `-`, and `_`, or is empty.
    #[error("invalid workspace prefix '{0}'")]
    InvalidPrefix(String),
}

impl WorkspaceError {
    pub(crate) fn io(path: impl Into<Utf8PathBuf>, err: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source: Arc::new(err),
        }
    }
}
