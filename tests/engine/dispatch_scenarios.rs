//! Poll ticks driving jobs through the whole pipeline.

use super::fakes::{Collaborators, Engine, FakeSourceControl, polled, summary};
use gapfill::dispatch::TickSummary;
use gapfill::job::domain::{JobStatus, Progress, PullRequestUrl};
use gapfill::job::ports::JobRepository;
use gapfill::job::services::{CreateJobRequest, JobLifecycleError};
use rstest::rstest;
use std::sync::Arc;
use tokio::sync::Semaphore;

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn pending_job_runs_to_a_pull_request() {
    let engine = Engine::new(
        Collaborators::new(FakeSourceControl::open(), &[summary(&["src/file.test.ts"])]),
        3,
    );
    let job = engine.submit("acme/web", "src/file.ts").await;
    assert_eq!(job.status(), JobStatus::Pending);

    let tick = engine.tick_and_settle().await;
    assert_eq!(tick.dispatched, 1);

    let finished = engine.job(job.id()).await;
    assert_eq!(finished.status(), JobStatus::Succeeded);
    assert_eq!(finished.progress(), Progress::COMPLETE);
    assert_eq!(
        finished.pull_request_url().map(PullRequestUrl::as_str),
        Some("https://github.com/acme/web/pull/1")
    );
    assert_eq!(finished.coverage().delta_basis_points(), Some(3500));
    assert!(finished.started_at().is_some());

    let clones = engine.collaborators.source_control.clone_targets();
    assert_eq!(clones.len(), 1, "one workspace per attempt");
    assert!(clones.iter().all(|path| !path.exists()), "workspace must be removed");
    assert!(engine.workspaces_are_clean());

    let drafts = engine.collaborators.hosting.drafts();
    let draft = drafts.first().expect("a pull request was opened");
    assert_eq!(Some(&draft.head), finished.branch_name());
    assert_eq!(draft.base, "main");
    assert!(draft.body.contains("40.00%") && draft.body.contains("75.00%"));
    assert!(!finished.log().as_str().contains("secret"));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn second_job_for_a_locked_repository_waits_for_the_next_tick() {
    let gate = Arc::new(Semaphore::new(0));
    let engine = Engine::new(
        Collaborators::new(
            FakeSourceControl::gated(Arc::clone(&gate)),
            &[summary(&["src/file.test.ts"])],
        ),
        3,
    );
    let first = engine.submit("acme/web", "src/file.ts").await;
    let second = engine.submit("acme/web", "src/other.ts").await;

    let tick = polled(engine.poll.tick().await.expect("tick"));
    assert_eq!(
        tick,
        TickSummary {
            candidates: 2,
            dispatched: 1,
            contended: 1,
            ..TickSummary::default()
        }
    );
    assert_eq!(engine.job(first.id()).await.status(), JobStatus::Running);
    assert_eq!(engine.job(second.id()).await.status(), JobStatus::Pending);

    gate.add_permits(16);
    engine.poll.wait_idle().await;
    assert_eq!(engine.job(first.id()).await.status(), JobStatus::Succeeded);
    assert_eq!(engine.job(second.id()).await.status(), JobStatus::Pending);

    let retry_tick = engine.tick_and_settle().await;
    assert_eq!(retry_tick.dispatched, 1);
    let finished = engine.job(second.id()).await;
    assert_eq!(finished.status(), JobStatus::Succeeded);

    let branches = engine.collaborators.source_control.pushed_branches();
    assert_eq!(branches.len(), 2);
    assert_ne!(branches.first(), branches.get(1), "each job gets its own branch");
    assert!(engine.workspaces_are_clean());
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn empty_generation_is_retried_until_the_ceiling() {
    let engine = Engine::new(Collaborators::new(FakeSourceControl::open(), &[summary(&[])]), 3);
    let job = engine.submit("acme/web", "src/file.ts").await;

    engine.tick_and_settle().await;
    let first = engine.job(job.id()).await;
    assert_eq!(first.status(), JobStatus::Retry);
    assert_eq!(first.attempt_count(), 1);
    let branch = first.branch_name().cloned().expect("branch assigned on first lock");

    engine.tick_and_settle().await;
    let second = engine.job(job.id()).await;
    assert_eq!(second.status(), JobStatus::Retry);
    assert_eq!(second.attempt_count(), 2);
    assert_eq!(second.branch_name(), Some(&branch), "retries reuse the branch");

    engine.tick_and_settle().await;
    let third = engine.job(job.id()).await;
    assert_eq!(third.status(), JobStatus::Failed);
    assert_eq!(third.attempt_count(), 3);
    assert!(third.pull_request_url().is_none());
    assert!(
        third
            .log()
            .as_str()
            .contains("attempt 3/3 failed: generation produced no created or modified files")
    );

    let idle = engine.tick_and_settle().await;
    assert_eq!(idle, TickSummary::default(), "failed jobs are not polled");
    assert_eq!(engine.collaborators.generator.runs(), 3);
    assert!(engine.collaborators.hosting.drafts().is_empty());
    assert!(engine.workspaces_are_clean());
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn automatic_retry_succeeds_on_the_second_attempt() {
    let engine = Engine::new(
        Collaborators::new(
            FakeSourceControl::open(),
            &[summary(&[]), summary(&["src/file.test.ts"])],
        ),
        3,
    );
    let job = engine.submit("acme/web", "src/file.ts").await;

    engine.tick_and_settle().await;
    let first = engine.job(job.id()).await;
    assert_eq!(first.status(), JobStatus::Retry);
    assert_eq!(first.attempt_count(), 1);
    assert!(first.progress().value() > 0);
    let branch = first.branch_name().cloned().expect("branch assigned on first lock");

    let tick = engine.tick_and_settle().await;
    assert_eq!(tick.dispatched, 1);
    let finished = engine.job(job.id()).await;
    assert_eq!(finished.status(), JobStatus::Succeeded, "log:\n{}", finished.log().as_str());
    assert_eq!(finished.progress(), Progress::COMPLETE);
    assert_eq!(finished.attempt_count(), 1);
    assert_eq!(finished.branch_name(), Some(&branch));
    assert!(finished.pull_request_url().is_some());
    assert_eq!(engine.collaborators.generator.runs(), 2);
    assert!(engine.workspaces_are_clean());
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn manual_retry_puts_a_failed_job_back_in_the_queue() {
    let engine = Engine::new(
        Collaborators::new(
            FakeSourceControl::open(),
            &[summary(&[]), summary(&["src/file.test.ts"])],
        ),
        1,
    );
    let job = engine.submit("acme/web", "src/file.ts").await;

    engine.tick_and_settle().await;
    assert_eq!(engine.job(job.id()).await.status(), JobStatus::Failed);

    let retried = engine.service.retry(job.id()).await.expect("manual retry");
    assert_eq!(retried.status(), JobStatus::Pending);
    assert_eq!(retried.progress().value(), 0);

    engine.tick_and_settle().await;
    let finished = engine.job(job.id()).await;
    assert_eq!(finished.status(), JobStatus::Succeeded);
    assert_eq!(finished.attempt_count(), 1, "manual retry keeps the attempt count");
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn unknown_repository_is_rejected_before_a_job_exists() {
    let engine = Engine::new(Collaborators::new(FakeSourceControl::open(), &[summary(&[])]), 3);

    let result = engine
        .service
        .create_job(CreateJobRequest::new("acme/missing", "src/file.ts", "alice"))
        .await;

    assert!(matches!(result, Err(JobLifecycleError::Hosting(_))));
    let stored = engine.repository.list_executable().await.expect("listing");
    assert!(stored.is_empty());
}
