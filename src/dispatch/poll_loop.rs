//! The poll loop and its tick bookkeeping.

use super::{DispatchError, DispatchResult};
use crate::job::domain::{BranchName, Job};
use crate::job::ports::{JobRepository, LockRequest};
use crate::pipeline::Pipeline;
use mockable::Clock;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Default pause between ticks.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Default number of pipelines allowed to run at once.
pub const DEFAULT_MAX_CONCURRENT_PIPELINES: u32 = 4;

/// What a single call to [`PollLoop::tick`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Another tick was still in flight, so this one did nothing.
    Skipped,
    /// The executable jobs were considered.
    Polled(TickSummary),
}

/// Per-tick counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickSummary {
    /// Executable jobs listed.
    pub candidates: usize,
    /// Jobs whose lock was taken and whose pipeline was spawned.
    pub dispatched: usize,
    /// Jobs whose repository was already locked.
    pub contended: usize,
    /// Jobs left for a later tick because every pipeline slot was busy.
    pub deferred: usize,
    /// Jobs skipped because of a per-job error.
    pub errors: usize,
}

/// Discovers runnable jobs and dispatches them to the pipeline.
pub struct PollLoop<R, C>
where
    R: JobRepository + 'static,
    C: Clock + Send + Sync + 'static,
{
    repository: Arc<R>,
    clock: Arc<C>,
    pipeline: Arc<Pipeline<R, C>>,
    interval: Duration,
    capacity: u32,
    slots: Arc<Semaphore>,
    polling: AtomicBool,
}

/// Clears the overlap flag when a tick ends, however it ends.
struct PollingGuard<'a>(&'a AtomicBool);

impl Drop for PollingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

enum Candidate {
    Dispatched,
    Contended,
    Failed,
}

impl<R, C> PollLoop<R, C>
where
    R: JobRepository + 'static,
    C: Clock + Send + Sync + 'static,
{
    /// Creates a loop with the default interval and pipeline limit.
    #[must_use]
    pub fn new(repository: Arc<R>, clock: Arc<C>, pipeline: Arc<Pipeline<R, C>>) -> Self {
        Self {
            repository,
            clock,
            pipeline,
            interval: DEFAULT_POLL_INTERVAL,
            capacity: DEFAULT_MAX_CONCURRENT_PIPELINES,
            slots: Arc::new(Semaphore::new(slot_count(DEFAULT_MAX_CONCURRENT_PIPELINES))),
            polling: AtomicBool::new(false),
        }
    }

    /// Sets the pause between ticks.
    #[must_use]
    pub const fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Sets how many pipelines may run at once. Values below one are
    /// raised to one.
    #[must_use]
    pub fn with_max_concurrent(mut self, max: u32) -> Self {
        self.capacity = max.max(1);
        self.slots = Arc::new(Semaphore::new(slot_count(self.capacity)));
        self
    }

    /// Returns how many pipelines are running right now.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        slot_count(self.capacity).saturating_sub(self.slots.available_permits())
    }

    /// Runs one poll.
    ///
    /// Returns [`TickOutcome::Skipped`] without touching the repository
    /// when another tick has not finished yet. Jobs are visited oldest
    /// first. When every pipeline slot is taken the tick stops and the
    /// remaining jobs are counted as deferred.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::ListExecutable`] when the runnable jobs
    /// cannot be listed. Per-job failures are logged and counted instead.
    pub async fn tick(&self) -> DispatchResult<TickOutcome> {
        if self
            .polling
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("previous poll still running, skipping tick");
            return Ok(TickOutcome::Skipped);
        }
        let _guard = PollingGuard(&self.polling);

        let jobs = self
            .repository
            .list_executable()
            .await
            .map_err(DispatchError::ListExecutable)?;
        let mut summary = TickSummary {
            candidates: jobs.len(),
            ..TickSummary::default()
        };

        for (position, job) in jobs.into_iter().enumerate() {
            let Ok(slot) = Arc::clone(&self.slots).try_acquire_owned() else {
                summary.deferred = summary.candidates.saturating_sub(position);
                debug!(deferred = summary.deferred, "all pipeline slots busy");
                break;
            };
            match self.dispatch(job, slot).await {
                Candidate::Dispatched => summary.dispatched += 1,
                Candidate::Contended => summary.contended += 1,
                Candidate::Failed => summary.errors += 1,
            }
        }

        if summary.dispatched > 0 {
            info!(
                dispatched = summary.dispatched,
                contended = summary.contended,
                deferred = summary.deferred,
                "dispatched jobs"
            );
        }
        Ok(TickOutcome::Polled(summary))
    }

    /// Tries to lock one candidate and spawns its pipeline on success.
    ///
    /// The slot is released immediately unless the pipeline starts.
    async fn dispatch(&self, job: Job, slot: OwnedSemaphorePermit) -> Candidate {
        let now = self.clock.utc();
        let branch_name = match BranchName::synthesize(job.target_path(), now) {
            Ok(branch_name) => branch_name,
            Err(err) => {
                warn!(job_id = %job.id(), error = %err, "could not synthesize branch name");
                return Candidate::Failed;
            }
        };
        let request = LockRequest {
            job_id: job.id(),
            repository_id: job.repository_id().clone(),
            branch_name,
            acquired_at: now,
        };

        match self.repository.try_acquire_lock(request).await {
            Ok(Some(running)) => {
                info!(
                    job_id = %running.id(),
                    repository_id = %running.repository_id(),
                    branch = running.branch_name().map_or("", BranchName::as_str),
                    "acquired repository lock"
                );
                let pipeline = Arc::clone(&self.pipeline);
                tokio::spawn(async move {
                    let finished = pipeline.execute(running).await;
                    debug!(
                        job_id = %finished.id(),
                        status = %finished.status(),
                        "pipeline finished"
                    );
                    drop(slot);
                });
                Candidate::Dispatched
            }
            Ok(None) => {
                debug!(
                    job_id = %job.id(),
                    repository_id = %job.repository_id(),
                    "repository busy, trying again next tick"
                );
                Candidate::Contended
            }
            Err(err) => {
                error!(job_id = %job.id(), error = %err, "lock acquisition failed");
                Candidate::Failed
            }
        }
    }

    /// Waits until no pipeline is running.
    pub async fn wait_idle(&self) {
        if let Ok(all) = self.slots.acquire_many(self.capacity).await {
            drop(all);
        }
    }

    /// Ticks every interval until `shutdown` flips to `true` or its sender
    /// is dropped.
    ///
    /// Ticks that fall behind are skipped rather than queued. Pipelines
    /// already dispatched keep running; call [`PollLoop::wait_idle`] to
    /// wait for them.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(
            interval_secs = self.interval.as_secs(),
            max_concurrent = self.capacity,
            "poll loop started"
        );
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(err) = self.tick().await {
                        error!(error = %err, "poll tick failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!(in_flight = self.in_flight(), "poll loop stopped");
    }
}

fn slot_count(capacity: u32) -> usize {
    usize::try_from(capacity).unwrap_or(Semaphore::MAX_PERMITS)
}
