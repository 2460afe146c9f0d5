//! Test generation through the sandboxed supervisor.
//!
//! The generator tool is expected to print one JSON summary line, e.g.
//! `{"created_files":["a.test.ts"],"modified_files":[],"error":null}`.
//! Tools that print nothing structured are judged by the working tree
//! instead.

use super::ports::SourceControl;
use super::template::{TemplateContext, render};
use super::{PipelineError, PipelineResult};
use crate::job::domain::{BranchName, CoveragePercent, RepositoryId, TargetPath};
use crate::sandbox::domain::{NetworkMode, ResourceLimits, SandboxCommand};
use crate::sandbox::ports::ProcessSupervisor;
use camino::Utf8Path;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

const DIAGNOSTIC_CHARS: usize = 500;

/// Generator command settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Program run inside the sandbox.
    pub program: String,
    /// Argument templates. They see `file_path`, `repository`, `branch`,
    /// `coverage_before`, and the rendered `prompt`.
    pub args: Vec<String>,
    /// Prompt template.
    pub prompt: String,
    /// Timeout for one generation run, in seconds.
    pub timeout_secs: u64,
    /// Network available to the generator.
    pub network: NetworkMode,
    /// Worker environment variables forwarded to the generator.
    pub pass_env: Vec<String>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            program: "claude".to_owned(),
            args: vec![
                "--print".to_owned(),
                "--dangerously-skip-permissions".to_owned(),
                "{{ prompt }}".to_owned(),
            ],
            prompt: concat!(
                "Write unit tests that raise line coverage of {{ file_path }} ",
                "in {{ repository }}.",
                "{% if coverage_before %} Current coverage is {{ coverage_before }}.{% endif %} ",
                "Only add or modify test files. When finished, print one line of JSON: ",
                "{\"created_files\": [...], \"modified_files\": [...], \"error\": null}."
            )
            .to_owned(),
            timeout_secs: 1800,
            network: NetworkMode::Restricted,
            pass_env: vec!["ANTHROPIC_API_KEY".to_owned()],
        }
    }
}

/// Inputs describing the file to generate tests for.
#[derive(Debug, Clone, Copy)]
pub struct GenerationRequest<'a> {
    /// Repository being improved.
    pub repository: &'a RepositoryId,
    /// File whose coverage should rise.
    pub target: &'a TargetPath,
    /// Branch the change will be pushed to.
    pub branch: &'a BranchName,
    /// Baseline coverage, when it could be measured.
    pub coverage_before: Option<CoveragePercent>,
}

/// Files the generator created or modified.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerationOutcome {
    /// New files.
    pub created_files: Vec<String>,
    /// Changed files.
    pub modified_files: Vec<String>,
}

impl GenerationOutcome {
    /// Returns the total number of touched files.
    #[must_use]
    pub fn file_count(&self) -> usize {
        self.created_files.len().saturating_add(self.modified_files.len())
    }
}

#[derive(Debug, Deserialize)]
struct GeneratorReport {
    created_files: Option<Vec<String>>,
    modified_files: Option<Vec<String>>,
    error: Option<String>,
}

impl GeneratorReport {
    const fn is_summary(&self) -> bool {
        self.created_files.is_some() || self.modified_files.is_some() || self.error.is_some()
    }
}

/// Runs the configured generator and normalizes its result.
pub struct Generator {
    supervisor: Arc<dyn ProcessSupervisor>,
    source_control: Arc<dyn SourceControl>,
    config: GeneratorConfig,
    limits: ResourceLimits,
    grace: Duration,
    output_limit: usize,
    environment: Vec<(String, String)>,
}

impl Generator {
    /// Creates a generator with default sandbox limits.
    #[must_use]
    pub fn new(
        supervisor: Arc<dyn ProcessSupervisor>,
        source_control: Arc<dyn SourceControl>,
        config: GeneratorConfig,
    ) -> Self {
        let defaults = SandboxCommand::new(config.program.as_str(), ".");
        Self {
            supervisor,
            source_control,
            config,
            limits: ResourceLimits::default(),
            grace: defaults.grace(),
            output_limit: defaults.output_limit(),
            environment: Vec::new(),
        }
    }

    /// Sets the resource ceilings.
    #[must_use]
    pub const fn with_limits(mut self, limits: ResourceLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Sets the window between graceful termination and force kill.
    #[must_use]
    pub const fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Sets the combined output capture ceiling.
    #[must_use]
    pub const fn with_output_limit(mut self, bytes: usize) -> Self {
        self.output_limit = bytes;
        self
    }

    /// Forwards one environment variable to the generator.
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment.push((key.into(), value.into()));
        self
    }

    /// Returns the generator settings.
    #[must_use]
    pub const fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    /// Builds the sandboxed command for `request` in `workspace`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Template`] when the prompt or an argument
    /// fails to render.
    pub fn command(
        &self,
        workspace: &Utf8Path,
        request: &GenerationRequest<'_>,
    ) -> PipelineResult<SandboxCommand> {
        let base = TemplateContext::new()
            .with("file_path", request.target.as_str())
            .with("repository", request.repository.as_str())
            .with("branch", request.branch.as_str())
            .with_optional(
                "coverage_before",
                request.coverage_before.map(|percent| percent.to_string()),
            );
        let prompt = render("generator.prompt", &self.config.prompt, &base)?;
        let context = base.with("prompt", prompt);
        let arguments = self
            .config
            .args
            .iter()
            .map(|template| render("generator.args", template, &context))
            .collect::<PipelineResult<Vec<_>>>()?;

        let command = SandboxCommand::new(self.config.program.as_str(), workspace)
            .args(arguments)
            .with_limits(self.limits)
            .with_network(self.config.network)
            .with_timeout(Duration::from_secs(self.config.timeout_secs))
            .with_grace(self.grace)
            .with_output_limit(self.output_limit);
        Ok(self
            .environment
            .iter()
            .fold(command, |built, (key, value)| built.env(key.clone(), value.clone())))
    }

    /// Runs the generator in `workspace`.
    ///
    /// # Errors
    ///
    /// - [`PipelineError::GenerationTimedOut`] when the supervisor had to
    ///   stop the tool.
    /// - [`PipelineError::Generation`] when the tool reported an error or
    ///   exited unsuccessfully.
    /// - [`PipelineError::NoChanges`] when it succeeded without touching
    ///   any file.
    /// - [`PipelineError::Sandbox`] and [`PipelineError::Template`] for
    ///   launch failures.
    #[instrument(skip_all, fields(program = %self.config.program, target = %request.target))]
    pub async fn generate(
        &self,
        workspace: &Utf8Path,
        request: &GenerationRequest<'_>,
    ) -> PipelineResult<GenerationOutcome> {
        let command = self.command(workspace, request)?;
        let output = self.supervisor.run(command).await?;
        if output.timed_out() {
            warn!(termination = ?output.termination, "generator timed out");
            return Err(PipelineError::GenerationTimedOut {
                timeout_secs: self.config.timeout_secs,
            });
        }

        let report = parse_report(&output.stdout);
        if let Some(message) = report.as_ref().and_then(|summary| summary.error.clone()) {
            return Err(PipelineError::Generation(message));
        }
        if !output.success() {
            let code = output
                .exit_code
                .map_or_else(|| "signal".to_owned(), |value| value.to_string());
            return Err(PipelineError::Generation(format!(
                "exit status {code}: {}",
                output.diagnostic_tail(DIAGNOSTIC_CHARS)
            )));
        }

        let outcome = match report {
            Some(summary) => GenerationOutcome {
                created_files: summary.created_files.unwrap_or_default(),
                modified_files: summary.modified_files.unwrap_or_default(),
            },
            None => {
                debug!("generator printed no summary, inspecting working tree");
                let changed = self
                    .source_control
                    .changed_files(workspace)
                    .await
                    .map_err(|err| PipelineError::Generation(err.to_string()))?;
                GenerationOutcome {
                    created_files: changed.created,
                    modified_files: changed.modified,
                }
            }
        };

        if outcome.file_count() == 0 {
            return Err(PipelineError::NoChanges);
        }
        info!(
            created = outcome.created_files.len(),
            modified = outcome.modified_files.len(),
            "generator produced changes"
        );
        Ok(outcome)
    }
}

impl std::fmt::Debug for Generator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Generator")
            .field("config", &self.config)
            .field("limits", &self.limits)
            .field("isolation", &self.supervisor.isolation())
            .finish_non_exhaustive()
    }
}

/// Returns the last stdout line that parses as a generator summary.
fn parse_report(stdout: &str) -> Option<GeneratorReport> {
    stdout
        .lines()
        .rev()
        .map(str::trim)
        .filter(|line| line.starts_with('{'))
        .filter_map(|line| serde_json::from_str::<GeneratorReport>(line).ok())
        .find(GeneratorReport::is_summary)
}
