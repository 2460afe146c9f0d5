//! Engine configuration loaded from TOML.
//!
//! Every field has a default, so an empty or missing file yields a working
//! configuration. Secrets such as the database URL and the hosting token
//! are read from the environment by the worker binary and never appear
//! here.

use crate::dispatch::{DEFAULT_MAX_CONCURRENT_PIPELINES, DEFAULT_POLL_INTERVAL};
use crate::pipeline::adapters::CoverageConfig;
use crate::pipeline::{DEFAULT_MAX_ATTEMPTS, GeneratorConfig, PullRequestTemplates};
use crate::sandbox::adapters::{ContainerRuntime, ContainerSupervisor, SandboxPolicy};
use crate::sandbox::domain::ResourceLimits;
use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::time::Duration;
use thiserror::Error;

const SECONDS_PER_HOUR: u64 = 60 * 60;

/// Result type for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file exists but could not be read.
    #[error("failed to read {path}")]
    Read {
        /// Configuration file path.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid TOML for [`EngineConfig`].
    #[error("failed to parse {path}")]
    Parse {
        /// Configuration file path, or `<inline>` for strings.
        path: Utf8PathBuf,
        /// Underlying TOML error.
        #[source]
        source: Box<toml::de::Error>,
    },

    /// A value is out of range.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level worker configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Poll loop settings.
    pub dispatch: DispatchSettings,
    /// Workspace location and sweeping.
    pub workspace: WorkspaceSettings,
    /// Process isolation.
    pub sandbox: SandboxSettings,
    /// Hosting service and commit identity.
    pub hosting: HostingSettings,
    /// Test generator command.
    pub generator: GeneratorConfig,
    /// Coverage command.
    pub coverage: CoverageConfig,
    /// Commit and pull request text.
    pub pull_request: PullRequestTemplates,
}

/// `[dispatch]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DispatchSettings {
    /// Seconds between poll ticks.
    pub poll_interval_secs: u64,
    /// Failed attempts before a job is `Failed`.
    pub max_attempts: u32,
    /// Pipelines allowed to run at once.
    pub max_concurrent_pipelines: u32,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            poll_interval_secs: DEFAULT_POLL_INTERVAL.as_secs(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            max_concurrent_pipelines: DEFAULT_MAX_CONCURRENT_PIPELINES,
        }
    }
}

impl DispatchSettings {
    /// Returns the tick interval.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

/// `[workspace]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WorkspaceSettings {
    /// Directory that holds every job workspace.
    pub base_dir: Utf8PathBuf,
    /// Age after which the sweeper removes a workspace.
    pub max_age_hours: u64,
    /// Seconds between sweeps.
    pub sweep_interval_secs: u64,
}

impl Default for WorkspaceSettings {
    fn default() -> Self {
        Self {
            base_dir: Utf8PathBuf::from("/var/tmp/gapfill/workspaces"),
            max_age_hours: 24,
            sweep_interval_secs: SECONDS_PER_HOUR,
        }
    }
}

impl WorkspaceSettings {
    /// Returns the sweeper's age threshold.
    #[must_use]
    pub const fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_hours.saturating_mul(SECONDS_PER_HOUR))
    }

    /// Returns the pause between sweeps.
    #[must_use]
    pub const fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

/// `[sandbox]` section. Resource ceilings sit directly in the section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxSettings {
    /// Container runtime CLI.
    pub runtime: ContainerRuntime,
    /// Image every sandboxed command runs in.
    pub image: String,
    /// Behaviour when the runtime is unusable.
    pub policy: SandboxPolicy,
    /// Network joined by `restricted` commands.
    pub restricted_network: String,
    /// Memory, CPU, process, and scratch ceilings.
    #[serde(flatten)]
    pub limits: ResourceLimits,
    /// Seconds between the graceful signal and the force kill.
    pub grace_secs: u64,
    /// Cap on captured stdout plus stderr.
    pub output_limit_bytes: usize,
}

impl Default for SandboxSettings {
    fn default() -> Self {
        Self {
            runtime: ContainerRuntime::default(),
            image: "ghcr.io/gapfill/runner:latest".to_owned(),
            policy: SandboxPolicy::default(),
            restricted_network: "gapfill-restricted".to_owned(),
            limits: ResourceLimits::default(),
            grace_secs: 5,
            output_limit_bytes: 10 * 1024 * 1024,
        }
    }
}

impl SandboxSettings {
    /// Returns the termination grace window.
    #[must_use]
    pub const fn grace(&self) -> Duration {
        Duration::from_secs(self.grace_secs)
    }

    /// Builds the container supervisor these settings describe.
    #[must_use]
    pub fn container_supervisor(&self) -> ContainerSupervisor {
        ContainerSupervisor::new(self.runtime, self.image.as_str())
            .with_restricted_network(self.restricted_network.as_str())
    }
}

/// `[hosting]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HostingSettings {
    /// Web base URL, e.g. a GitHub Enterprise host.
    pub web_base: String,
    /// Commit author name.
    pub author_name: String,
    /// Commit author email.
    pub author_email: String,
}

impl Default for HostingSettings {
    fn default() -> Self {
        Self {
            web_base: "https://github.com".to_owned(),
            author_name: "gapfill".to_owned(),
            author_email: "gapfill@users.noreply.github.com".to_owned(),
        }
    }
}

impl EngineConfig {
    /// Reads and validates `path`, falling back to defaults when the file
    /// does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] when the file cannot be read,
    /// [`ConfigError::Parse`] for malformed TOML, and
    /// [`ConfigError::Invalid`] for out-of-range values.
    pub fn load(path: &Utf8Path) -> ConfigResult<Self> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                let defaults = Self::default();
                defaults.validate()?;
                return Ok(defaults);
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_owned(),
                    source,
                });
            }
        };
        let config: Self = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_owned(),
            source: Box::new(source),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Parses and validates configuration text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] or [`ConfigError::Invalid`].
    pub fn parse(contents: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(contents).map_err(|source| ConfigError::Parse {
            path: Utf8PathBuf::from("<inline>"),
            source: Box::new(source),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending field.
    pub fn validate(&self) -> ConfigResult<()> {
        let positive = [
            ("dispatch.poll_interval_secs", self.dispatch.poll_interval_secs),
            ("dispatch.max_attempts", u64::from(self.dispatch.max_attempts)),
            (
                "dispatch.max_concurrent_pipelines",
                u64::from(self.dispatch.max_concurrent_pipelines),
            ),
            ("workspace.sweep_interval_secs", self.workspace.sweep_interval_secs),
            ("sandbox.grace_secs", self.sandbox.grace_secs),
            ("generator.timeout_secs", self.generator.timeout_secs),
            ("coverage.timeout_secs", self.coverage.timeout_secs),
        ];
        if let Some((field, _)) = positive.iter().find(|(_, value)| *value == 0) {
            return Err(ConfigError::Invalid(format!("{field} must be at least 1")));
        }
        if self.sandbox.output_limit_bytes == 0 {
            return Err(ConfigError::Invalid(
                "sandbox.output_limit_bytes must be at least 1".to_owned(),
            ));
        }
        let required = [
            ("sandbox.image", self.sandbox.image.as_str()),
            ("generator.program", self.generator.program.as_str()),
            ("coverage.program", self.coverage.program.as_str()),
        ];
        if let Some((field, _)) = required.iter().find(|(_, value)| value.trim().is_empty()) {
            return Err(ConfigError::Invalid(format!("{field} must not be empty")));
        }
        Ok(())
    }
}
