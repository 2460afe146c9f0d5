//! Shared doubles for pipeline tests.

use crate::sandbox::{
    domain::{ProcessOutput, SandboxCommand, Termination},
    ports::{Isolation, ProcessSupervisor, SandboxResult},
};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Supervisor that returns a canned result and records what it was asked
/// to run.
#[derive(Debug, Clone)]
pub struct ScriptedSupervisor {
    output: ProcessOutput,
    seen: Arc<Mutex<Vec<SandboxCommand>>>,
}

impl ScriptedSupervisor {
    pub fn exiting(code: i32, stdout: &str) -> Self {
        Self::with_output(ProcessOutput {
            exit_code: Some(code),
            stdout: stdout.to_owned(),
            stderr: String::new(),
            truncated_bytes: 0,
            termination: Termination::Exited,
            duration: Duration::from_millis(5),
        })
    }

    pub fn timing_out() -> Self {
        Self::with_output(ProcessOutput {
            exit_code: None,
            stdout: String::new(),
            stderr: String::new(),
            truncated_bytes: 0,
            termination: Termination::ForceKilled,
            duration: Duration::from_secs(30),
        })
    }

    pub fn with_stderr(mut self, stderr: &str) -> Self {
        self.output.stderr = stderr.to_owned();
        self
    }

    fn with_output(output: ProcessOutput) -> Self {
        Self {
            output,
            seen: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn commands(&self) -> Vec<SandboxCommand> {
        self.seen.lock().expect("supervisor log lock").clone()
    }
}

#[async_trait]
impl ProcessSupervisor for ScriptedSupervisor {
    async fn run(&self, command: SandboxCommand) -> SandboxResult<ProcessOutput> {
        self.seen.lock().expect("supervisor log lock").push(command);
        Ok(self.output.clone())
    }

    fn isolation(&self) -> Isolation {
        Isolation::Container
    }
}

/// A generator summary line listing `created` files.
pub fn summary_line(created: &[&str]) -> String {
    let files = created
        .iter()
        .map(|file| format!("\"{file}\""))
        .collect::<Vec<_>>()
        .join(",");
    format!("{{\"created_files\":[{files}],\"modified_files\":[],\"error\":null}}\n")
}
