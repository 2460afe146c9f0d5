//! Host process supervisor with timeout escalation and bounded capture.

use crate::sandbox::{
    domain::{Escalation, EscalationStep, ProcessOutput, SandboxCommand},
    ports::{Isolation, ProcessSupervisor, SandboxError, SandboxResult},
};
use async_trait::async_trait;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, instrument, warn};

/// Host variables passed through to children; everything else is cleared.
const INHERITED_ENV: &[&str] = &["PATH", "HOME", "LANG", "TMPDIR", "XDG_RUNTIME_DIR"];

const READ_CHUNK: usize = 8192;

type Capture = JoinHandle<std::io::Result<(Vec<u8>, usize)>>;

/// Runs commands directly on the host.
///
/// Each child leads its own process group so the whole tree receives the
/// termination signals. The environment is cleared apart from a short
/// allow-list. Resource limits and network mode are not enforced here; use
/// [`super::ContainerSupervisor`] for isolation.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalProcessSupervisor;

impl LocalProcessSupervisor {
    /// Creates a host supervisor.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ProcessSupervisor for LocalProcessSupervisor {
    #[instrument(skip_all, fields(program = command.program(), timeout_secs = command.timeout().as_secs()))]
    async fn run(&self, command: SandboxCommand) -> SandboxResult<ProcessOutput> {
        let started = Instant::now();
        debug!("spawning child process");
        let mut child = build_command(&command).spawn().map_err(|err| {
            warn!(error = %err, "failed to spawn command");
            SandboxError::spawn(command.program(), err)
        })?;
        let pid = child.id();

        let budget = Arc::new(AtomicUsize::new(command.output_limit()));
        let stdout = child
            .stdout
            .take()
            .map(|stream| tokio::spawn(read_limited(stream, Arc::clone(&budget))));
        let stderr = child
            .stderr
            .take()
            .map(|stream| tokio::spawn(read_limited(stream, Arc::clone(&budget))));

        let mut escalation = Escalation::new(command.timeout(), command.grace());
        let status = loop {
            match escalation.step(started.elapsed()) {
                EscalationStep::Wait(remaining) => {
                    if let Ok(waited) = tokio::time::timeout(remaining, child.wait()).await {
                        break waited.map_err(SandboxError::io)?;
                    }
                }
                EscalationStep::Terminate => {
                    warn!(
                        timeout_secs = command.timeout().as_secs(),
                        "command timed out, sending graceful termination"
                    );
                    terminate(pid, &mut child);
                }
                EscalationStep::Kill => {
                    warn!(
                        grace_secs = command.grace().as_secs(),
                        "command outlived its grace window, force-killing"
                    );
                    force_kill(pid, &mut child);
                }
                EscalationStep::Reap => break child.wait().await.map_err(SandboxError::io)?,
            }
        };
        reap_orphans(pid);

        let (stdout_bytes, stdout_truncated) = collect(stdout, command.grace()).await;
        let (stderr_bytes, stderr_truncated) = collect(stderr, command.grace()).await;
        let truncated_bytes = stdout_truncated.saturating_add(stderr_truncated);
        if truncated_bytes > 0 {
            warn!(truncated_bytes, "command output truncated");
        }

        let termination = escalation.termination();
        debug!(exit_code = ?status.code(), ?termination, "command finished");
        Ok(ProcessOutput {
            exit_code: status.code(),
            stdout: String::from_utf8_lossy(&stdout_bytes).into_owned(),
            stderr: String::from_utf8_lossy(&stderr_bytes).into_owned(),
            truncated_bytes,
            termination,
            duration: started.elapsed(),
        })
    }

    fn isolation(&self) -> Isolation {
        Isolation::Unsandboxed
    }
}

fn build_command(command: &SandboxCommand) -> Command {
    let mut process = Command::new(command.program());
    process
        .args(command.arguments())
        .current_dir(command.work_dir())
        .env_clear()
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    for key in INHERITED_ENV {
        if let Some(value) = std::env::var_os(key) {
            process.env(key, value);
        }
    }
    process.envs(command.environment().iter().map(|(key, value)| (key, value)));
    #[cfg(unix)]
    process.process_group(0);
    process
}

/// Reads `reader` to EOF, keeping bytes only while the shared budget lasts.
async fn read_limited<R>(mut reader: R, budget: Arc<AtomicUsize>) -> std::io::Result<(Vec<u8>, usize)>
where
    R: AsyncRead + Unpin,
{
    let mut kept = Vec::new();
    let mut truncated = 0usize;
    let mut chunk = vec![0u8; READ_CHUNK];

    loop {
        let read = reader.read(&mut chunk).await?;
        if read == 0 {
            break;
        }
        let granted = claim(&budget, read);
        kept.extend_from_slice(chunk.get(..granted).unwrap_or_default());
        truncated = truncated.saturating_add(read.saturating_sub(granted));
    }

    Ok((kept, truncated))
}

/// Takes up to `wanted` bytes from the budget and returns how many were
/// granted.
fn claim(budget: &AtomicUsize, wanted: usize) -> usize {
    let previous = budget
        .fetch_update(Ordering::AcqRel, Ordering::Acquire, |remaining| {
            Some(remaining.saturating_sub(wanted))
        })
        .unwrap_or_else(|current| current);
    previous.min(wanted)
}

async fn collect(capture: Option<Capture>, grace: Duration) -> (Vec<u8>, usize) {
    let Some(handle) = capture else {
        return (Vec::new(), 0);
    };
    let abort = handle.abort_handle();
    match tokio::time::timeout(grace, handle).await {
        Ok(Ok(Ok(captured))) => captured,
        Ok(Ok(Err(err))) => {
            warn!(error = %err, "failed to read command output");
            (Vec::new(), 0)
        }
        Ok(Err(err)) => {
            warn!(error = %err, "output reader task failed");
            (Vec::new(), 0)
        }
        Err(_) => {
            abort.abort();
            warn!("output pipe held open after exit, discarding capture");
            (Vec::new(), 0)
        }
    }
}

#[cfg(unix)]
fn signal_group(pid: Option<u32>, signal: nix::sys::signal::Signal) {
    use nix::errno::Errno;
    use nix::sys::signal::killpg;
    use nix::unistd::Pid;

    let Some(raw) = pid.and_then(|id| i32::try_from(id).ok()) else {
        return;
    };
    match killpg(Pid::from_raw(raw), signal) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(err) => debug!(error = %err, ?signal, "failed to signal process group"),
    }
}

#[cfg(unix)]
fn terminate(pid: Option<u32>, _child: &mut Child) {
    signal_group(pid, nix::sys::signal::Signal::SIGTERM);
}

#[cfg(not(unix))]
fn terminate(_pid: Option<u32>, child: &mut Child) {
    force_kill(None, child);
}

fn force_kill(pid: Option<u32>, child: &mut Child) {
    #[cfg(unix)]
    signal_group(pid, nix::sys::signal::Signal::SIGKILL);
    #[cfg(not(unix))]
    let _ = pid;
    if let Err(err) = child.start_kill() {
        debug!(error = %err, "child already gone when force-killing");
    }
}

/// Kills anything the command left running in its process group.
fn reap_orphans(pid: Option<u32>) {
    #[cfg(unix)]
    signal_group(pid, nix::sys::signal::Signal::SIGKILL);
    #[cfg(not(unix))]
    let _ = pid;
}
