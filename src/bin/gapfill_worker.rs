//! Runs the gapfill job engine against a `PostgreSQL` job store.
//!
//! Usage:
//!
//! ```text
//! gapfill-worker [--config <path>] [--log-format plain|json]
//! ```
//!
//! Secrets are taken from the environment only:
//!
//! - `DATABASE_URL`: `PostgreSQL` connection string for the job store
//! - `GITHUB_TOKEN`: token used by `git` and `gh`
//!
//! The worker applies the job schema, reports jobs left `Running` by a
//! previous process, selects a process supervisor according to the sandbox
//! policy, and then polls for work until it receives Ctrl-C or `SIGTERM`.
//! On shutdown it stops polling, waits for in-flight pipelines, and removes
//! every tracked workspace.

use camino::Utf8PathBuf;
use clap::Parser;
use diesel::pg::PgConnection;
use diesel::r2d2::{ConnectionManager, Pool, PoolError};
use gapfill::config::{ConfigError, EngineConfig};
use gapfill::dispatch::PollLoop;
use gapfill::job::adapters::postgres::PostgresJobRepository;
use gapfill::job::ports::{JobRepository, JobRepositoryError};
use gapfill::pipeline::adapters::{GhCli, GitCli, IstanbulCoverage};
use gapfill::pipeline::ports::{Credential, HostingApi, SourceControl};
use gapfill::pipeline::{Generator, Pipeline, PipelineTools};
use gapfill::sandbox::adapters::{LocalProcessSupervisor, select_supervisor};
use gapfill::sandbox::ports::{ProcessSupervisor, SandboxError};
use gapfill::telemetry::{LogFormat, init_tracing};
use gapfill::workspace::{WorkspaceError, WorkspaceManager, spawn_sweeper};
use mockable::DefaultClock;
use std::sync::Arc;
use thiserror::Error;
use tokio::runtime::Builder;
use tokio::sync::watch;
use tokio::task::JoinError;
use tracing::{info, warn};

const DATABASE_URL_ENV: &str = "DATABASE_URL";
const GITHUB_TOKEN_ENV: &str = "GITHUB_TOKEN";

/// Boxed error type for the main result.
type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that stop the worker.
#[derive(Debug, Error)]
enum WorkerError {
    #[error("environment variable {0} must be set")]
    MissingEnv(&'static str),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to build the database pool: {0}")]
    Pool(#[source] PoolError),
    #[error(transparent)]
    Repository(#[from] JobRepositoryError),
    #[error(transparent)]
    Sandbox(#[from] SandboxError),
    #[error(transparent)]
    Workspace(#[from] WorkspaceError),
    #[error("runtime init failed: {0}")]
    RuntimeInit(#[source] std::io::Error),
    #[error("failed to listen for shutdown signals: {0}")]
    Signal(#[source] std::io::Error),
    #[error("background task failed: {0}")]
    Join(#[from] JoinError),
}

/// Command-line arguments.
#[derive(Debug, Parser)]
#[command(name = "gapfill-worker", version, about = "Turns coverage gaps into pull requests")]
struct Cli {
    /// Configuration file. Defaults apply when it does not exist.
    #[arg(long, env = "GAPFILL_CONFIG", default_value = "gapfill.toml")]
    config: Utf8PathBuf,

    /// Log line format.
    #[arg(long, value_enum, default_value_t = LogFormat::Plain)]
    log_format: LogFormat,
}

fn main() -> Result<(), BoxError> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);
    let runtime = Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(WorkerError::RuntimeInit)?;
    runtime.block_on(run(cli))?;
    Ok(())
}

async fn run(cli: Cli) -> Result<(), WorkerError> {
    let config = EngineConfig::load(&cli.config)?;
    info!(config = %cli.config, "configuration loaded");
    let database_url = required_env(DATABASE_URL_ENV)?;
    let credential = Credential::new(required_env(GITHUB_TOKEN_ENV)?);

    let pool = Pool::builder()
        .build(ConnectionManager::<PgConnection>::new(database_url))
        .map_err(WorkerError::Pool)?;
    let repository = Arc::new(PostgresJobRepository::new(pool));
    repository.ensure_schema().await?;
    report_stranded_jobs(repository.as_ref()).await?;

    let isolated =
        select_supervisor(config.sandbox.policy, config.sandbox.container_supervisor()).await?;
    let host: Arc<dyn ProcessSupervisor> = Arc::new(LocalProcessSupervisor::new());
    let workspaces = Arc::new(WorkspaceManager::open(&config.workspace.base_dir)?);

    let source_control: Arc<dyn SourceControl> = Arc::new(
        GitCli::new(Arc::clone(&host), credential.clone())
            .with_author(&config.hosting.author_name, &config.hosting.author_email),
    );
    let hosting: Arc<dyn HostingApi> = Arc::new(
        GhCli::new(host, credential, workspaces.base())
            .with_web_base(&config.hosting.web_base),
    );
    let coverage = IstanbulCoverage::new(Arc::clone(&isolated), config.coverage.clone())
        .with_limits(config.sandbox.limits);
    let generator = forwarded_env(&config.generator.pass_env).into_iter().fold(
        Generator::new(isolated, Arc::clone(&source_control), config.generator.clone())
            .with_limits(config.sandbox.limits)
            .with_grace(config.sandbox.grace())
            .with_output_limit(config.sandbox.output_limit_bytes),
        |generator, (key, value)| generator.with_env(key, value),
    );

    let clock = Arc::new(DefaultClock);
    let tools = PipelineTools {
        source_control,
        hosting,
        coverage: Arc::new(coverage),
        generator: Arc::new(generator),
    };
    let pipeline = Pipeline::new(
        Arc::clone(&repository),
        Arc::clone(&clock),
        Arc::clone(&workspaces),
        tools,
    )
    .with_templates(config.pull_request.clone())
    .with_max_attempts(config.dispatch.max_attempts);
    let poll = Arc::new(
        PollLoop::new(Arc::clone(&repository), clock, Arc::new(pipeline))
            .with_interval(config.dispatch.poll_interval())
            .with_max_concurrent(config.dispatch.max_concurrent_pipelines),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = spawn_sweeper(
        Arc::clone(&workspaces),
        config.workspace.sweep_interval(),
        config.workspace.max_age(),
        shutdown_rx.clone(),
    );
    let polling = tokio::spawn({
        let poll = Arc::clone(&poll);
        async move { poll.run(shutdown_rx).await }
    });

    shutdown_signal().await?;
    info!(in_flight = poll.in_flight(), "shutdown requested");
    shutdown_tx.send_modify(|stop| *stop = true);
    polling.await?;
    sweeper.await?;
    poll.wait_idle().await;
    workspaces.cleanup_all();
    info!("worker stopped");
    Ok(())
}

fn required_env(name: &'static str) -> Result<String, WorkerError> {
    std::env::var(name)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .ok_or(WorkerError::MissingEnv(name))
}

/// Collects the worker variables the generator is allowed to see.
fn forwarded_env(keys: &[String]) -> Vec<(String, String)> {
    keys.iter()
        .filter_map(|key| match std::env::var(key) {
            Ok(value) => Some((key.clone(), value)),
            Err(_) => {
                warn!(variable = %key, "generator variable is not set, not forwarding it");
                None
            }
        })
        .collect()
}

/// Logs jobs a previous worker left `Running`. They are not reset: an
/// operator decides whether the pipeline really died.
async fn report_stranded_jobs(repository: &impl JobRepository) -> Result<(), WorkerError> {
    let running = repository.list_running().await?;
    for job in &running {
        warn!(
            job_id = %job.id(),
            repository_id = %job.repository_id(),
            started_at = ?job.started_at(),
            "job was Running at startup and holds its repository lock"
        );
    }
    if !running.is_empty() {
        warn!(count = running.len(), "stranded Running jobs need manual intervention");
    }
    Ok(())
}

async fn shutdown_signal() -> Result<(), WorkerError> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut terminate = signal(SignalKind::terminate()).map_err(WorkerError::Signal)?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result.map_err(WorkerError::Signal),
            _ = terminate.recv() => Ok(()),
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.map_err(WorkerError::Signal)
    }
}
