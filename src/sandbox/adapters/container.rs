//! Container-backed supervisor (rootless Podman or Docker).
//!
//! Security model applied to every command:
//! - read-only root filesystem with a small `noexec` `/tmp` scratch mount
//! - the job workspace bind-mounted at `/workspace`
//! - all capabilities dropped and `no-new-privileges` set
//! - processes run as the invoking host user, so workspace files stay
//!   owned by the worker (`--userns=keep-id` or `--user=UID:GID`)
//! - memory, swap, CPU, and process-count ceilings
//! - network mode `none`, a named restricted network, or the default

use super::LocalProcessSupervisor;
use crate::sandbox::{
    domain::{NetworkMode, ProcessOutput, SandboxCommand},
    ports::{Isolation, ProcessSupervisor, SandboxResult},
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Mount point of the job workspace inside the container.
const CONTAINER_WORKDIR: &str = "/workspace";

/// Default network name used for [`NetworkMode::Restricted`].
const DEFAULT_RESTRICTED_NETWORK: &str = "gapfill-restricted";

/// Container runtime CLI.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerRuntime {
    /// Rootless Podman.
    #[default]
    Podman,
    /// Docker.
    Docker,
}

impl ContainerRuntime {
    /// Returns the CLI binary name.
    #[must_use]
    pub const fn program(self) -> &'static str {
        match self {
            Self::Podman => "podman",
            Self::Docker => "docker",
        }
    }
}

impl fmt::Display for ContainerRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.program())
    }
}

/// Runs each command in a fresh, hardened container.
///
/// The runtime client process is supervised by [`LocalProcessSupervisor`],
/// so timeouts and output limits behave identically. The client forwards
/// the graceful signal into the container; after a force kill the container
/// is removed explicitly.
#[derive(Debug, Clone)]
pub struct ContainerSupervisor {
    runtime: ContainerRuntime,
    image: String,
    restricted_network: String,
    host_user: Option<(u32, u32)>,
    client: LocalProcessSupervisor,
}

impl ContainerSupervisor {
    /// Creates a supervisor launching `image` with `runtime`.
    #[must_use]
    pub fn new(runtime: ContainerRuntime, image: impl Into<String>) -> Self {
        Self {
            runtime,
            image: image.into(),
            restricted_network: DEFAULT_RESTRICTED_NETWORK.to_owned(),
            host_user: current_user(),
            client: LocalProcessSupervisor::new(),
        }
    }

    /// Sets the network joined for [`NetworkMode::Restricted`] commands.
    #[must_use]
    pub fn with_restricted_network(mut self, network: impl Into<String>) -> Self {
        self.restricted_network = network.into();
        self
    }

    /// Sets the uid and gid Docker containers run as.
    ///
    /// Podman maps the invoking user with `--userns=keep-id` and ignores
    /// this.
    #[must_use]
    pub const fn with_host_user(mut self, uid: u32, gid: u32) -> Self {
        self.host_user = Some((uid, gid));
        self
    }

    /// Returns the configured runtime.
    #[must_use]
    pub const fn runtime(&self) -> ContainerRuntime {
        self.runtime
    }

    /// Returns whether `runtime` answers `version` successfully.
    pub async fn is_available(runtime: ContainerRuntime) -> bool {
        Command::new(runtime.program())
            .arg("version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .is_ok_and(|status| status.success())
    }

    /// Builds the runtime arguments for `command` in container `name`.
    ///
    /// Environment values are passed by key only (`--env=KEY`) and reach
    /// the container through the client's environment, so they never show
    /// up in the process table.
    #[must_use]
    pub fn container_args(&self, command: &SandboxCommand, name: &str) -> Vec<String> {
        let limits = command.limits();
        let mut args = vec![
            "run".to_owned(),
            "--rm".to_owned(),
            "--init".to_owned(),
            format!("--name={name}"),
        ];

        match command.network() {
            NetworkMode::None => args.push("--network=none".to_owned()),
            NetworkMode::Restricted => args.push(format!("--network={}", self.restricted_network)),
            NetworkMode::Full => {}
        }

        match (self.runtime, self.host_user) {
            (ContainerRuntime::Podman, _) => args.push("--userns=keep-id".to_owned()),
            (ContainerRuntime::Docker, Some((uid, gid))) => args.push(format!("--user={uid}:{gid}")),
            (ContainerRuntime::Docker, None) => {}
        }

        args.extend([
            format!("--memory={}m", limits.memory_mib),
            format!("--memory-swap={}m", limits.memory_mib),
            format!("--cpus={}", limits.cpus_arg()),
            format!("--pids-limit={}", limits.pids_limit),
            "--read-only".to_owned(),
            format!("--tmpfs=/tmp:rw,noexec,nosuid,size={}m", limits.scratch_mib),
            "--security-opt=no-new-privileges".to_owned(),
            "--cap-drop=ALL".to_owned(),
            format!("--volume={}:{CONTAINER_WORKDIR}:rw", command.work_dir()),
            format!("--workdir={CONTAINER_WORKDIR}"),
        ]);
        args.extend(
            command
                .environment()
                .iter()
                .map(|(key, _)| format!("--env={key}")),
        );
        args.push(self.image.clone());
        args.push(command.program().to_owned());
        args.extend(command.arguments().iter().cloned());
        args
    }

    async fn remove_container(&self, name: &str) {
        let removal = Command::new(self.runtime.program())
            .args(["rm", "--force", name])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;
        match removal {
            Ok(status) if status.success() => debug!(container = name, "removed container"),
            Ok(status) => warn!(container = name, code = ?status.code(), "container removal failed"),
            Err(err) => warn!(container = name, error = %err, "container removal failed"),
        }
    }
}

#[cfg(unix)]
fn current_user() -> Option<(u32, u32)> {
    Some((
        nix::unistd::getuid().as_raw(),
        nix::unistd::getgid().as_raw(),
    ))
}

#[cfg(not(unix))]
const fn current_user() -> Option<(u32, u32)> {
    None
}

#[async_trait]
impl ProcessSupervisor for ContainerSupervisor {
    #[instrument(skip_all, fields(runtime = %self.runtime, image = %self.image, network = %command.network()))]
    async fn run(&self, command: SandboxCommand) -> SandboxResult<ProcessOutput> {
        let name = format!("gapfill-{}", Uuid::new_v4().simple());
        let client_command = command
            .environment()
            .iter()
            .fold(
                SandboxCommand::new(self.runtime.program(), command.work_dir())
                    .args(self.container_args(&command, &name)),
                |client, (key, value)| client.env(key.clone(), value.clone()),
            )
            .with_timeout(command.timeout())
            .with_grace(command.grace())
            .with_output_limit(command.output_limit());

        info!(
            container = %name,
            memory_mib = command.limits().memory_mib,
            cpus = %command.limits().cpus_arg(),
            "running command in container"
        );
        let output = self.client.run(client_command).await?;
        if output.timed_out() {
            self.remove_container(&name).await;
        }
        Ok(output)
    }

    fn isolation(&self) -> Isolation {
        Isolation::Container
    }
}
