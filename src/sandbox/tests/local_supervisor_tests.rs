//! Tests for host process supervision against real child processes.

use crate::sandbox::{
    adapters::LocalProcessSupervisor,
    domain::{SandboxCommand, Termination},
    ports::{ProcessSupervisor, SandboxError},
};
use camino::Utf8PathBuf;
use eyre::{Result, ensure, eyre};
use rstest::{fixture, rstest};
use std::time::Duration;
use tempfile::TempDir;

struct Scratch {
    _dir: TempDir,
    path: Utf8PathBuf,
}

#[fixture]
fn scratch() -> Scratch {
    let dir = tempfile::tempdir().expect("temporary directory");
    let path = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf-8 temp path");
    Scratch { _dir: dir, path }
}

fn shell(scratch: &Scratch, script: &str) -> SandboxCommand {
    SandboxCommand::new("sh", scratch.path.clone()).args(["-c", script])
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn non_zero_exit_is_a_result_not_an_error(scratch: Scratch) -> Result<()> {
    let output = LocalProcessSupervisor::new()
        .run(shell(&scratch, "echo partial; echo boom >&2; exit 3"))
        .await?;

    ensure!(output.exit_code == Some(3), "exit code {:?}", output.exit_code);
    ensure!(output.termination == Termination::Exited);
    ensure!(!output.success());
    ensure!(output.stdout.trim() == "partial");
    ensure!(output.diagnostic_tail(100) == "boom");
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn runs_inside_work_dir_with_explicit_env(scratch: Scratch) -> Result<()> {
    let command = shell(&scratch, "printf %s \"$GREETING\" > marker").env("GREETING", "hello");

    let output = LocalProcessSupervisor::new().run(command).await?;

    ensure!(output.success(), "command failed: {output:?}");
    let written = std::fs::read_to_string(scratch.path.join("marker"))?;
    ensure!(written == "hello", "marker held {written:?}");
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn sleeping_command_is_terminated_at_timeout(scratch: Scratch) -> Result<()> {
    let timeout = Duration::from_millis(300);
    let grace = Duration::from_secs(3);
    let command = SandboxCommand::new("sleep", scratch.path.clone())
        .arg("30")
        .with_timeout(timeout)
        .with_grace(grace);

    let output = LocalProcessSupervisor::new().run(command).await?;

    ensure!(output.termination == Termination::Terminated, "{output:?}");
    ensure!(output.timed_out());
    ensure!(!output.success());
    ensure!(
        output.duration < timeout + grace,
        "took {:?}",
        output.duration
    );
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn command_ignoring_sigterm_is_force_killed(scratch: Scratch) -> Result<()> {
    let timeout = Duration::from_millis(500);
    let grace = Duration::from_millis(500);
    let command = shell(&scratch, "trap '' TERM; sleep 30")
        .with_timeout(timeout)
        .with_grace(grace);

    let output = LocalProcessSupervisor::new().run(command).await?;

    ensure!(output.termination == Termination::ForceKilled, "{output:?}");
    ensure!(output.exit_code.is_none());
    ensure!(
        output.duration < timeout + grace + Duration::from_secs(3),
        "took {:?}",
        output.duration
    );
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn combined_output_is_capped(scratch: Scratch) -> Result<()> {
    let command = shell(&scratch, "head -c 100000 /dev/zero; head -c 5000 /dev/zero >&2")
        .with_output_limit(1000);

    let output = LocalProcessSupervisor::new().run(command).await?;

    let kept = output.stdout.len() + output.stderr.len();
    ensure!(kept == 1000, "kept {kept} bytes");
    ensure!(output.truncated_bytes == 104_000, "truncated {}", output.truncated_bytes);
    ensure!(output.success());
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn missing_program_is_a_spawn_error(scratch: Scratch) -> Result<()> {
    let command = SandboxCommand::new("/nonexistent/gapfill-tool", scratch.path.clone());

    let result = LocalProcessSupervisor::new().run(command).await;

    match result {
        Err(SandboxError::Spawn { program, .. }) => {
            ensure!(program == "/nonexistent/gapfill-tool");
            Ok(())
        }
        other => Err(eyre!("expected spawn error, got {other:?}")),
    }
}
