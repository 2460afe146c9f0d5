//! Process supervisor port.

use crate::sandbox::domain::{ProcessOutput, SandboxCommand};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Result type for supervisor operations.
pub type SandboxResult<T> = Result<T, SandboxError>;

/// Isolation actually applied by a supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Isolation {
    /// Commands run inside a hardened container.
    Container,
    /// Commands run directly on the host with timeout and output limits only.
    Unsandboxed,
}

impl fmt::Display for Isolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Container => "container",
            Self::Unsandboxed => "unsandboxed",
        })
    }
}

/// Runs external commands under a timeout with escalated termination.
#[async_trait]
pub trait ProcessSupervisor: Send + Sync {
    /// Runs `command` to completion or until its timeout escalation ends.
    ///
    /// Non-zero exits and timeouts are reported through
    /// [`ProcessOutput`]; only failures to launch or reap surface as errors.
    ///
    /// # Errors
    ///
    /// Returns [`SandboxError::Spawn`] when the process cannot be started and
    /// [`SandboxError::Io`] when waiting on it fails.
    async fn run(&self, command: SandboxCommand) -> SandboxResult<ProcessOutput>;

    /// Reports the isolation this supervisor applies.
    fn isolation(&self) -> Isolation;
}

/// Errors returned by process supervisors.
#[derive(Debug, Clone, Error)]
pub enum SandboxError {
    /// The process could not be spawned.
    #[error("failed to spawn '{program}': {source}")]
    Spawn {
        /// Program that failed to start.
        program: String,
        /// Underlying launch error.
        source: Arc<std::io::Error>,
    },

    /// No usable container runtime was found and the policy forbids running
    /// unsandboxed.
    #[error("sandbox runtime unavailable: {0}")]
    RuntimeUnavailable(String),

    /// Waiting on or signalling the process failed.
    #[error("sandbox I/O error: {0}")]
    Io(Arc<std::io::Error>),
}

impl SandboxError {
    /// Wraps a spawn failure.
    #[must_use]
    pub fn spawn(program: impl Into<String>, err: std::io::Error) -> Self {
        Self::Spawn {
            program: program.into(),
            source: Arc::new(err),
        }
    }

    /// Wraps an I/O failure.
    #[must_use]
    pub fn io(err: std::io::Error) -> Self {
        Self::Io(Arc::new(err))
    }
}
