//! [`CoverageTool`] reading Istanbul `json-summary` reports.

use super::failure_detail;
use crate::job::domain::CoveragePercent;
use crate::pipeline::ports::{CoverageError, CoverageResult, CoverageTool, FileCoverage};
use crate::sandbox::domain::{NetworkMode, ResourceLimits, SandboxCommand};
use crate::sandbox::ports::ProcessSupervisor;
use async_trait::async_trait;
use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

/// Key of the aggregate entry in a summary report.
const TOTAL_KEY: &str = "total";

/// Coverage command settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoverageConfig {
    /// Program that runs the test suite.
    pub program: String,
    /// Arguments passed to the program.
    pub args: Vec<String>,
    /// Summary location relative to the workspace.
    pub summary_path: Utf8PathBuf,
    /// Timeout for one coverage run, in seconds.
    pub timeout_secs: u64,
    /// Network available to the test suite.
    pub network: NetworkMode,
}

impl Default for CoverageConfig {
    fn default() -> Self {
        Self {
            program: "npx".to_owned(),
            args: vec![
                "--yes".to_owned(),
                "jest".to_owned(),
                "--coverage".to_owned(),
                "--coverageReporters=json-summary".to_owned(),
                "--watchAll=false".to_owned(),
            ],
            summary_path: Utf8PathBuf::from("coverage/coverage-summary.json"),
            timeout_secs: 900,
            network: NetworkMode::Restricted,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SummaryEntry {
    lines: LineMetric,
}

#[derive(Debug, Deserialize)]
struct LineMetric {
    total: u64,
    covered: u64,
    pct: Value,
}

/// Runs the repository's test suite with coverage inside the sandbox.
pub struct IstanbulCoverage {
    supervisor: Arc<dyn ProcessSupervisor>,
    config: CoverageConfig,
    limits: ResourceLimits,
}

impl IstanbulCoverage {
    /// Creates a coverage adapter.
    #[must_use]
    pub fn new(supervisor: Arc<dyn ProcessSupervisor>, config: CoverageConfig) -> Self {
        Self {
            supervisor,
            config,
            limits: ResourceLimits::default(),
        }
    }

    /// Sets the resource ceilings for the test run.
    #[must_use]
    pub const fn with_limits(mut self, limits: ResourceLimits) -> Self {
        self.limits = limits;
        self
    }
}

impl std::fmt::Debug for IstanbulCoverage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IstanbulCoverage")
            .field("config", &self.config)
            .field("limits", &self.limits)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl CoverageTool for IstanbulCoverage {
    #[instrument(skip_all, fields(program = %self.config.program))]
    async fn run(&self, workspace: &Utf8Path) -> CoverageResult<Utf8PathBuf> {
        let command = SandboxCommand::new(self.config.program.as_str(), workspace)
            .args(self.config.args.iter().cloned())
            .env("CI", "true")
            .with_limits(self.limits)
            .with_network(self.config.network)
            .with_timeout(Duration::from_secs(self.config.timeout_secs));
        let output = self.supervisor.run(command).await?;
        if !output.success() {
            return Err(CoverageError::RunFailed(failure_detail(&output)));
        }

        let summary = workspace.join(&self.config.summary_path);
        tokio::fs::metadata(&summary)
            .await
            .map_err(CoverageError::summary)?;
        debug!(summary = %summary, "coverage summary written");
        Ok(summary)
    }

    async fn parse(&self, summary: &Utf8Path) -> CoverageResult<Vec<FileCoverage>> {
        let raw = tokio::fs::read_to_string(summary)
            .await
            .map_err(CoverageError::summary)?;
        parse_summary(&raw)
    }
}

/// Decodes a `coverage-summary.json` document into per-file line coverage.
///
/// Entries whose percentage is not numeric (Istanbul writes `"Unknown"` for
/// files with no lines) are skipped.
fn parse_summary(raw: &str) -> CoverageResult<Vec<FileCoverage>> {
    let entries: BTreeMap<String, SummaryEntry> =
        serde_json::from_str(raw).map_err(CoverageError::summary)?;
    entries
        .into_iter()
        .filter(|(path, _)| path != TOTAL_KEY)
        .filter_map(|(file_path, entry)| {
            entry.lines.pct.as_f64().map(|pct| (file_path, entry.lines, pct))
        })
        .map(|(file_path, lines, pct)| {
            let percent = CoveragePercent::from_percent(pct).map_err(CoverageError::summary)?;
            Ok(FileCoverage {
                file_path,
                percent,
                covered: lines.covered,
                total: lines.total,
            })
        })
        .collect()
}
