//! Two workers sharing one job store contend for repository locks.

use super::fakes::{Collaborators, Engine, FakeSourceControl, polled, summary};
use gapfill::job::domain::JobStatus;
use gapfill::job::ports::JobRepository;
use rstest::rstest;
use std::sync::Arc;
use tokio::sync::Semaphore;

#[rstest]
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_workers_run_at_most_one_job_per_repository() {
    let gate = Arc::new(Semaphore::new(0));
    let engine = Engine::new(
        Collaborators::new(
            FakeSourceControl::gated(Arc::clone(&gate)),
            &[summary(&["src/file.test.ts"])],
        ),
        3,
    );
    let second_worker = engine.second_worker(3);
    let mut jobs = Vec::new();
    for (repository, path) in [
        ("acme/web", "src/file.ts"),
        ("acme/web", "src/other.ts"),
        ("acme/api", "src/file.ts"),
        ("acme/api", "src/other.ts"),
    ] {
        jobs.push(engine.submit(repository, path).await);
    }

    let (left, right) = tokio::join!(engine.poll.tick(), second_worker.tick());
    let left = polled(left.expect("first worker tick"));
    let right = polled(right.expect("second worker tick"));
    assert_eq!(
        left.dispatched + right.dispatched,
        2,
        "one job per repository across both workers"
    );

    let running = engine.repository.list_running().await.expect("listing");
    assert_eq!(running.len(), 2);
    assert!(
        running
            .first()
            .zip(running.get(1))
            .is_some_and(|(a, b)| a.repository_id() != b.repository_id()),
        "running jobs must target different repositories"
    );

    gate.add_permits(64);
    engine.poll.wait_idle().await;
    second_worker.wait_idle().await;

    for _ in 0..2 {
        let (left, right) = tokio::join!(engine.poll.tick(), second_worker.tick());
        left.expect("first worker tick");
        right.expect("second worker tick");
        engine.poll.wait_idle().await;
        second_worker.wait_idle().await;
    }

    for job in jobs {
        assert_eq!(engine.job(job.id()).await.status(), JobStatus::Succeeded);
    }
    assert!(engine.workspaces_are_clean());
}
