//! Result of a supervised command.

use std::time::Duration;

/// How a supervised command ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The command exited on its own within its timeout.
    Exited,
    /// The command hit its timeout and exited after the graceful signal.
    Terminated,
    /// The command ignored the graceful signal and was force-killed.
    ForceKilled,
}

/// Captured outcome of a supervised command.
///
/// A non-zero exit code is a normal result, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    /// Exit code, or `None` when the process died from a signal.
    pub exit_code: Option<i32>,
    /// Captured standard output (lossily decoded).
    pub stdout: String,
    /// Captured standard error (lossily decoded).
    pub stderr: String,
    /// Bytes discarded once the combined capture ceiling was reached.
    pub truncated_bytes: usize,
    /// How the command ended.
    pub termination: Termination,
    /// Wall-clock time from spawn to reap.
    pub duration: Duration,
}

impl ProcessOutput {
    /// Returns whether the command exited on its own with status zero.
    #[must_use]
    pub fn success(&self) -> bool {
        self.termination == Termination::Exited && self.exit_code == Some(0)
    }

    /// Returns whether the command was stopped for exceeding its timeout.
    #[must_use]
    pub fn timed_out(&self) -> bool {
        self.termination != Termination::Exited
    }

    /// Returns the last `max_chars` characters of stderr, or of stdout when
    /// stderr is blank, for use in log lines.
    #[must_use]
    pub fn diagnostic_tail(&self, max_chars: usize) -> String {
        let source = if self.stderr.trim().is_empty() {
            &self.stdout
        } else {
            &self.stderr
        };
        let trimmed = source.trim();
        let skip = trimmed.chars().count().saturating_sub(max_chars);
        trimmed.chars().skip(skip).collect()
    }
}
