//! Port contracts for sandboxed execution.

mod supervisor;

pub use supervisor::{Isolation, ProcessSupervisor, SandboxError, SandboxResult};
