//! Command description handed to a process supervisor.

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Default hard timeout for a sandboxed command.
pub(crate) const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Default window between the graceful signal and the force kill.
pub(crate) const DEFAULT_GRACE: Duration = Duration::from_secs(5);

/// Default ceiling for captured stdout plus stderr.
pub(crate) const DEFAULT_OUTPUT_LIMIT: usize = 10 * 1024 * 1024;

/// Network access granted to a sandboxed command.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkMode {
    /// No network interfaces besides loopback.
    #[default]
    None,
    /// Attached to an operator-defined, egress-filtered network.
    Restricted,
    /// The runtime's default network.
    Full,
}

impl NetworkMode {
    /// Returns the configuration spelling of the mode.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Restricted => "restricted",
            Self::Full => "full",
        }
    }
}

impl fmt::Display for NetworkMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resource ceilings applied by container-backed supervisors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceLimits {
    /// Memory ceiling in MiB (swap is capped to the same value).
    pub memory_mib: u32,
    /// CPU ceiling in thousandths of a core.
    pub cpu_millis: u32,
    /// Maximum number of processes inside the sandbox.
    pub pids_limit: u32,
    /// Size of the writable `/tmp` scratch mount in MiB.
    pub scratch_mib: u32,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            memory_mib: 2048,
            cpu_millis: 2000,
            pids_limit: 256,
            scratch_mib: 256,
        }
    }
}

impl ResourceLimits {
    /// Formats the CPU ceiling as a decimal core count, e.g. `1.500`.
    #[must_use]
    pub fn cpus_arg(&self) -> String {
        let whole = self.cpu_millis.div_euclid(1000);
        let fraction = self.cpu_millis.rem_euclid(1000);
        format!("{whole}.{fraction:03}")
    }
}

/// An external command plus the constraints it must run under.
#[derive(Clone, PartialEq, Eq)]
pub struct SandboxCommand {
    program: String,
    args: Vec<String>,
    work_dir: Utf8PathBuf,
    env: Vec<(String, String)>,
    limits: ResourceLimits,
    network: NetworkMode,
    timeout: Duration,
    grace: Duration,
    output_limit: usize,
}

impl SandboxCommand {
    /// Creates a command running `program` inside `work_dir` with default
    /// limits, no network, and default timeouts.
    #[must_use]
    pub fn new(program: impl Into<String>, work_dir: impl Into<Utf8PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            work_dir: work_dir.into(),
            env: Vec::new(),
            limits: ResourceLimits::default(),
            network: NetworkMode::default(),
            timeout: DEFAULT_TIMEOUT,
            grace: DEFAULT_GRACE,
            output_limit: DEFAULT_OUTPUT_LIMIT,
        }
    }

    /// Appends one argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends several arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Sets an environment variable for the command.
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Sets resource ceilings.
    #[must_use]
    pub const fn with_limits(mut self, limits: ResourceLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Sets the network mode.
    #[must_use]
    pub const fn with_network(mut self, network: NetworkMode) -> Self {
        self.network = network;
        self
    }

    /// Sets the hard timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the grace window between termination and force kill.
    #[must_use]
    pub const fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Sets the combined stdout/stderr capture ceiling in bytes.
    #[must_use]
    pub const fn with_output_limit(mut self, bytes: usize) -> Self {
        self.output_limit = bytes;
        self
    }

    /// Returns the program to execute.
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Returns the program arguments.
    #[must_use]
    pub fn arguments(&self) -> &[String] {
        &self.args
    }

    /// Returns the working directory.
    #[must_use]
    pub fn work_dir(&self) -> &Utf8Path {
        &self.work_dir
    }

    /// Returns the explicit environment.
    #[must_use]
    pub fn environment(&self) -> &[(String, String)] {
        &self.env
    }

    /// Returns the resource ceilings.
    #[must_use]
    pub const fn limits(&self) -> ResourceLimits {
        self.limits
    }

    /// Returns the network mode.
    #[must_use]
    pub const fn network(&self) -> NetworkMode {
        self.network
    }

    /// Returns the hard timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Returns the grace window.
    #[must_use]
    pub const fn grace(&self) -> Duration {
        self.grace
    }

    /// Returns the output capture ceiling.
    #[must_use]
    pub const fn output_limit(&self) -> usize {
        self.output_limit
    }
}

// Environment values may carry tokens, so only keys are printed.
impl fmt::Debug for SandboxCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let env_keys: Vec<&str> = self.env.iter().map(|(key, _)| key.as_str()).collect();
        f.debug_struct("SandboxCommand")
            .field("program", &self.program)
            .field("args", &self.args)
            .field("work_dir", &self.work_dir)
            .field("env_keys", &env_keys)
            .field("limits", &self.limits)
            .field("network", &self.network)
            .field("timeout", &self.timeout)
            .field("grace", &self.grace)
            .field("output_limit", &self.output_limit)
            .finish()
    }
}
