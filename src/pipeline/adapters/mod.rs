//! Command-line adapters for the pipeline ports.
//!
//! Each adapter runs its tool through a [`ProcessSupervisor`], so every
//! invocation gets the same timeout escalation and output ceiling as the
//! generator.
//!
//! [`ProcessSupervisor`]: crate::sandbox::ports::ProcessSupervisor

mod gh_cli;
mod git_cli;
mod istanbul;

pub use gh_cli::GhCli;
pub use git_cli::GitCli;
pub use istanbul::{CoverageConfig, IstanbulCoverage};

use crate::sandbox::domain::ProcessOutput;

const DIAGNOSTIC_CHARS: usize = 400;

/// Summarizes a failed command for an error message.
fn failure_detail(output: &ProcessOutput) -> String {
    if output.timed_out() {
        return format!("timed out after {}s", output.duration.as_secs());
    }
    let code = output
        .exit_code
        .map_or_else(|| "signal".to_owned(), |value| value.to_string());
    format!("exit status {code}: {}", output.diagnostic_tail(DIAGNOSTIC_CHARS))
}
