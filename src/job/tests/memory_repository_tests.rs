//! Tests for the in-memory repository and its per-repository lock.

use crate::job::{
    adapters::memory::InMemoryJobRepository,
    domain::{BranchName, Job, JobId, JobStatus, NewJob},
    ports::{JobRepository, JobRepositoryError, LockRequest},
};
use chrono::{Duration, Utc};
use eyre::{Result, ensure, eyre};
use mockable::DefaultClock;
use rstest::{fixture, rstest};
use std::sync::Arc;

#[fixture]
fn repository() -> Arc<InMemoryJobRepository> {
    Arc::new(InMemoryJobRepository::new())
}

fn job(repository: &str, path: &str) -> Job {
    Job::new(
        NewJob::parse(repository, path, "alice").expect("valid request"),
        &DefaultClock,
    )
}

fn lock_request(job: &Job) -> LockRequest {
    let now = Utc::now();
    LockRequest {
        job_id: job.id(),
        repository_id: job.repository_id().clone(),
        branch_name: BranchName::synthesize(job.target_path(), now).expect("valid branch"),
        acquired_at: now,
    }
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn create_rejects_duplicate_ids(repository: Arc<InMemoryJobRepository>) -> Result<()> {
    let first = job("acme/web", "src/a.ts");
    repository.create(&first).await?;
    ensure!(matches!(
        repository.create(&first).await,
        Err(JobRepositoryError::DuplicateJob(id)) if id == first.id()
    ));
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn update_of_unknown_job_is_not_found(repository: Arc<InMemoryJobRepository>) -> Result<()> {
    let unknown = job("acme/web", "src/a.ts");
    ensure!(matches!(
        repository.update(&unknown).await,
        Err(JobRepositoryError::NotFound(_))
    ));
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn list_executable_is_oldest_first(repository: Arc<InMemoryJobRepository>) -> Result<()> {
    let mut created = Vec::new();
    for offset in [3_i64, 1, 2] {
        let mut persisted = job("acme/web", &format!("src/f{offset}.ts")).into_persisted();
        persisted.created_at = Utc::now() - Duration::minutes(offset);
        let aged = Job::from_persisted(persisted);
        repository.create(&aged).await?;
        created.push(aged);
    }

    let listed: Vec<JobId> = repository
        .list_executable()
        .await?
        .iter()
        .map(Job::id)
        .collect();
    let expected: Vec<JobId> = [0, 2, 1]
        .iter()
        .filter_map(|index| created.get(*index).map(Job::id))
        .collect();
    ensure!(listed == expected, "expected {expected:?}, got {listed:?}");
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn lock_is_exclusive_per_repository(repository: Arc<InMemoryJobRepository>) -> Result<()> {
    let first = job("acme/web", "src/a.ts");
    let second = job("acme/web", "src/b.ts");
    let elsewhere = job("acme/api", "src/a.ts");
    for candidate in [&first, &second, &elsewhere] {
        repository.create(candidate).await?;
    }

    let running = repository
        .try_acquire_lock(lock_request(&first))
        .await?
        .ok_or_else(|| eyre!("first lock should succeed"))?;
    ensure!(running.status() == JobStatus::Running);
    ensure!(running.attempt_count() == 0);

    ensure!(repository.try_acquire_lock(lock_request(&second)).await?.is_none());
    let untouched = repository.find_by_id(second.id()).await?;
    ensure!(untouched.as_ref() == Some(&second), "failed acquisition must change nothing");

    ensure!(
        repository
            .try_acquire_lock(lock_request(&elsewhere))
            .await?
            .is_some(),
        "other repositories are independent"
    );
    ensure!(repository.list_running().await?.len() == 2);
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn lock_is_released_when_the_holder_leaves_running(
    repository: Arc<InMemoryJobRepository>,
) -> Result<()> {
    let first = job("acme/web", "src/a.ts");
    let second = job("acme/web", "src/b.ts");
    repository.create(&first).await?;
    repository.create(&second).await?;

    let running = repository
        .try_acquire_lock(lock_request(&first))
        .await?
        .ok_or_else(|| eyre!("first lock should succeed"))?;
    repository
        .update(&running.mark_for_retry("boom", 3, &DefaultClock)?)
        .await?;

    ensure!(repository.try_acquire_lock(lock_request(&second)).await?.is_some());
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn lock_ignores_missing_and_non_executable_jobs(
    repository: Arc<InMemoryJobRepository>,
) -> Result<()> {
    let missing = job("acme/web", "src/a.ts");
    ensure!(repository.try_acquire_lock(lock_request(&missing)).await?.is_none());

    let held = job("acme/api", "src/a.ts");
    repository.create(&held).await?;
    ensure!(repository.try_acquire_lock(lock_request(&held)).await?.is_some());
    ensure!(
        repository.try_acquire_lock(lock_request(&held)).await?.is_none(),
        "a running job cannot be acquired twice"
    );
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn concurrent_acquisitions_yield_exactly_one_winner(
    repository: Arc<InMemoryJobRepository>,
) -> Result<()> {
    let mut contenders = Vec::new();
    for index in 0..16 {
        let candidate = job("acme/web", &format!("src/f{index}.ts"));
        repository.create(&candidate).await?;
        contenders.push(candidate);
    }

    let attempts = contenders.iter().map(|candidate| {
        let shared = Arc::clone(&repository);
        let request = lock_request(candidate);
        tokio::spawn(async move { shared.try_acquire_lock(request).await })
    });
    let mut winners = 0;
    for handle in attempts.collect::<Vec<_>>() {
        if handle.await??.is_some() {
            winners += 1;
        }
    }

    ensure!(winners == 1, "expected one winner, got {winners}");
    ensure!(repository.list_running().await?.len() == 1);
    Ok(())
}
