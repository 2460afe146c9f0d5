//! Value types describing a sandboxed command and its outcome.

mod command;
mod escalation;
mod output;

pub use command::{NetworkMode, ResourceLimits, SandboxCommand};
pub use escalation::{Escalation, EscalationPhase, EscalationStep};
pub use output::{ProcessOutput, Termination};
