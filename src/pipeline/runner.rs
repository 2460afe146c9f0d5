//! Six-stage job pipeline with a single retry funnel.
//!
//! Each stage ends by raising progress, appending a log line, and persisting
//! the revision, so the job record shows where an attempt is while it runs.
//! Any hard failure is converted into exactly one `mark_for_retry`
//! transition. The workspace lease is released on every path.

use super::generator::{GenerationOutcome, GenerationRequest, Generator};
use super::ports::{
    CloneUrls, CoverageError, CoverageResult, CoverageTool, HostingApi, PullRequestDraft,
    SourceControl,
};
use super::stage::Stage;
use super::template::{TemplateContext, render};
use super::{PipelineError, PipelineResult};
use crate::job::domain::{BranchName, CoveragePercent, Job};
use crate::job::ports::JobRepository;
use crate::workspace::WorkspaceManager;
use camino::Utf8Path;
use mockable::Clock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{Instrument, error, info, info_span, warn};

/// Default ceiling of failed attempts before a job is `Failed`.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Templates for the commit and pull request text.
///
/// Templates see `file_path`, `repository`, `branch`, `coverage_before`,
/// `coverage_after`, `created_files`, and `modified_files`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PullRequestTemplates {
    /// Pull request title.
    pub title: String,
    /// Pull request description.
    pub body: String,
    /// Commit message.
    pub commit_message: String,
}

impl Default for PullRequestTemplates {
    fn default() -> Self {
        Self {
            title: "Improve test coverage for {{ file_path }}".to_owned(),
            body: concat!(
                "Adds tests for `{{ file_path }}`.\n\n",
                "| | Line coverage |\n|---|---|\n",
                "| Before | {{ coverage_before or \"unknown\" }} |\n",
                "| After | {{ coverage_after or \"unknown\" }} |\n",
                "{% if created_files %}\nCreated:\n",
                "{% for file in created_files %}- `{{ file }}`\n{% endfor %}{% endif %}",
                "{% if modified_files %}\nModified:\n",
                "{% for file in modified_files %}- `{{ file }}`\n{% endfor %}{% endif %}"
            )
            .to_owned(),
            commit_message: "test: improve coverage of {{ file_path }}".to_owned(),
        }
    }
}

/// External collaborators the pipeline drives.
#[derive(Clone)]
pub struct PipelineTools {
    /// Clone, commit, and push.
    pub source_control: Arc<dyn SourceControl>,
    /// Repository lookup and pull requests.
    pub hosting: Arc<dyn HostingApi>,
    /// Baseline and verification coverage.
    pub coverage: Arc<dyn CoverageTool>,
    /// Sandboxed test generation.
    pub generator: Arc<Generator>,
}

/// Executes dispatched jobs.
pub struct Pipeline<R, C>
where
    R: JobRepository,
    C: Clock + Send + Sync,
{
    repository: Arc<R>,
    clock: Arc<C>,
    workspaces: Arc<WorkspaceManager>,
    tools: PipelineTools,
    templates: PullRequestTemplates,
    max_attempts: u32,
}

/// Per-attempt values shared across stages.
struct Attempt<'a> {
    workspace: &'a Utf8Path,
    branch: BranchName,
    urls: CloneUrls,
}

impl<R, C> Pipeline<R, C>
where
    R: JobRepository,
    C: Clock + Send + Sync,
{
    /// Creates a pipeline with default templates and attempt ceiling.
    #[must_use]
    pub fn new(
        repository: Arc<R>,
        clock: Arc<C>,
        workspaces: Arc<WorkspaceManager>,
        tools: PipelineTools,
    ) -> Self {
        Self {
            repository,
            clock,
            workspaces,
            tools,
            templates: PullRequestTemplates::default(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    /// Sets the commit and pull request templates.
    #[must_use]
    pub fn with_templates(mut self, templates: PullRequestTemplates) -> Self {
        self.templates = templates;
        self
    }

    /// Sets how many failed attempts a job gets before it is `Failed`.
    #[must_use]
    pub const fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Runs every stage for a job that holds its repository lock.
    ///
    /// Never fails: the returned job is the last revision written, which is
    /// `Succeeded`, `Retry`, or `Failed` unless persistence itself broke.
    pub async fn execute(&self, job: Job) -> Job {
        let span = info_span!(
            "pipeline",
            job_id = %job.id(),
            repository_id = %job.repository_id(),
            target = %job.target_path(),
        );
        async move {
            let mut current = job;
            match self.run_in_workspace(&mut current).await {
                Ok(()) => {
                    info!("pipeline succeeded");
                    current
                }
                Err(err) => self.record_failure(current, &err).await,
            }
        }
        .instrument(span)
        .await
    }

    async fn run_in_workspace(&self, job: &mut Job) -> PipelineResult<()> {
        let prefix = format!("job-{}", job.id().simple());
        let lease = self.workspaces.lease(&prefix)?;
        let outcome = self.run_stages(job, lease.path()).await;
        lease.release();
        outcome
    }

    async fn run_stages(&self, job: &mut Job, workspace: &Utf8Path) -> PipelineResult<()> {
        let branch = job
            .branch_name()
            .cloned()
            .ok_or_else(|| PipelineError::MissingBranch(job.id()))?;
        let attempt = Attempt {
            workspace,
            urls: self.tools.hosting.clone_urls(job.repository_id()),
            branch,
        };

        self.clone_stage(job, &attempt).await?;
        self.coverage_stage(job, &attempt, Stage::Baseline).await?;
        let generated = self.generate_stage(job, &attempt).await?;
        self.coverage_stage(job, &attempt, Stage::Verify).await?;
        let context = template_context(job, &attempt, &generated);
        self.push_stage(job, &attempt, &context).await?;
        self.pull_request_stage(job, &attempt, &context).await
    }

    async fn clone_stage(&self, job: &mut Job, attempt: &Attempt<'_>) -> PipelineResult<()> {
        self.tools
            .source_control
            .clone_repository(&attempt.urls, attempt.workspace)
            .await
            .map_err(PipelineError::Clone)?;
        self.tools
            .source_control
            .checkout_new_branch(attempt.workspace, &attempt.branch)
            .await
            .map_err(PipelineError::Clone)?;
        let message = format!("cloned {} and checked out {}", attempt.urls, attempt.branch);
        self.advance(job, Stage::Clone, &message).await
    }

    async fn coverage_stage(
        &self,
        job: &mut Job,
        attempt: &Attempt<'_>,
        stage: Stage,
    ) -> PipelineResult<()> {
        let label = if stage == Stage::Baseline {
            "baseline coverage"
        } else {
            "coverage after generation"
        };
        let message = match self.measure(job, attempt.workspace).await {
            Ok(percent) => {
                *job = if stage == Stage::Baseline {
                    job.record_coverage_before(percent, &*self.clock)?
                } else {
                    job.record_coverage_after(percent, &*self.clock)?
                };
                format!("{label} {percent}")
            }
            Err(err) if stage.is_best_effort() => {
                warn!(%stage, error = %err, "best-effort coverage measurement failed");
                format!("{label} unavailable: {err}")
            }
            Err(err) => return Err(PipelineError::Coverage(err)),
        };
        self.advance(job, stage, &message).await
    }

    async fn generate_stage(
        &self,
        job: &mut Job,
        attempt: &Attempt<'_>,
    ) -> PipelineResult<GenerationOutcome> {
        let request = GenerationRequest {
            repository: job.repository_id(),
            target: job.target_path(),
            branch: &attempt.branch,
            coverage_before: job.coverage().before,
        };
        let outcome = self
            .tools
            .generator
            .generate(attempt.workspace, &request)
            .await?;
        let message = format!(
            "generated tests: {} created, {} modified",
            outcome.created_files.len(),
            outcome.modified_files.len()
        );
        self.advance(job, Stage::Generate, &message).await?;
        Ok(outcome)
    }

    async fn push_stage(
        &self,
        job: &mut Job,
        attempt: &Attempt<'_>,
        context: &TemplateContext,
    ) -> PipelineResult<()> {
        let commit_message = render(
            "pull_request.commit_message",
            &self.templates.commit_message,
            context,
        )?;
        self.tools
            .source_control
            .commit_all(attempt.workspace, &commit_message)
            .await
            .map_err(PipelineError::Commit)?;
        self.tools
            .source_control
            .push(attempt.workspace, &attempt.branch, &attempt.urls)
            .await
            .map_err(PipelineError::Push)?;
        let message = format!("pushed branch {}", attempt.branch);
        self.advance(job, Stage::Push, &message).await
    }

    async fn pull_request_stage(
        &self,
        job: &mut Job,
        attempt: &Attempt<'_>,
        context: &TemplateContext,
    ) -> PipelineResult<()> {
        let info = self
            .tools
            .hosting
            .get_repository(job.repository_id())
            .await
            .map_err(PipelineError::PullRequest)?;
        let draft = PullRequestDraft {
            repository: job.repository_id().clone(),
            head: attempt.branch.clone(),
            base: info.default_branch,
            title: render("pull_request.title", &self.templates.title, context)?,
            body: render("pull_request.body", &self.templates.body, context)?,
        };
        let created = self
            .tools
            .hosting
            .create_pull_request(&draft)
            .await
            .map_err(PipelineError::PullRequest)?;

        // The URL must be durable before the job can claim success.
        *job = job.record_pull_request(created.url, &*self.clock)?;
        self.repository.update(job).await?;
        *job = job.succeed(&*self.clock)?;
        self.repository.update(job).await?;
        info!(pull_request = created.number, "recorded pull request");
        Ok(())
    }

    /// Raises progress to the stage's value, logs, and persists.
    ///
    /// A retried attempt starts from the progress its predecessor reached,
    /// so early stages of a later attempt hold that value instead of
    /// lowering it.
    async fn advance(&self, job: &mut Job, stage: Stage, message: &str) -> PipelineResult<()> {
        let progress = stage.progress().max(job.progress());
        *job = job.update_progress(progress, message, &*self.clock)?;
        self.repository.update(job).await?;
        info!(%stage, %progress, "{message}");
        Ok(())
    }

    async fn measure(&self, job: &Job, workspace: &Utf8Path) -> CoverageResult<CoveragePercent> {
        let summary = self.tools.coverage.run(workspace).await?;
        let files = self.tools.coverage.parse(&summary).await?;
        files
            .iter()
            .find(|file| file.matches(job.target_path()))
            .map(|file| file.percent)
            .ok_or_else(|| CoverageError::TargetMissing(job.target_path().clone()))
    }

    /// Funnels a hard failure into the retry policy and persists the result.
    async fn record_failure(&self, job: Job, failure: &PipelineError) -> Job {
        warn!(
            error = %failure,
            attempt = job.attempt_count().saturating_add(1),
            "pipeline attempt failed"
        );
        let next = match job.mark_for_retry(&failure.to_string(), self.max_attempts, &*self.clock) {
            Ok(next) => next,
            Err(err) => {
                error!(error = %err, "could not record failed attempt");
                return job;
            }
        };
        match self.repository.update(&next).await {
            Ok(()) => info!(
                status = %next.status(),
                attempts = next.attempt_count(),
                "recorded failed attempt"
            ),
            Err(err) => error!(error = %err, status = %next.status(), "failed to persist failed attempt"),
        }
        next
    }
}

fn template_context(
    job: &Job,
    attempt: &Attempt<'_>,
    generated: &GenerationOutcome,
) -> TemplateContext {
    let coverage = job.coverage();
    TemplateContext::new()
        .with("file_path", job.target_path().as_str())
        .with("repository", job.repository_id().as_str())
        .with("branch", attempt.branch.as_str())
        .with_optional("coverage_before", coverage.before.map(|value| value.to_string()))
        .with_optional("coverage_after", coverage.after.map(|value| value.to_string()))
        .with_list("created_files", &generated.created_files)
        .with_list("modified_files", &generated.modified_files)
}
