//! Background removal of stale workspaces.

use camino::{Utf8Path, Utf8PathBuf};
use gapfill::workspace::{WorkspaceManager, spawn_sweeper};
use rstest::rstest;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::watch;

const HOUR: Duration = Duration::from_secs(3600);

fn age(path: &Utf8Path, by: Duration) {
    let stamp = SystemTime::now()
        .checked_sub(by)
        .expect("age fits the system clock");
    std::fs::File::open(path)
        .expect("open directory")
        .set_modified(stamp)
        .expect("set modification time");
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn sweeper_removes_only_workspaces_past_the_age_limit() {
    let root = tempfile::tempdir().expect("temporary directory");
    let base = Utf8PathBuf::from_path_buf(root.path().join("workspaces")).expect("utf-8 path");
    let manager = Arc::new(WorkspaceManager::open(base).expect("workspace manager"));

    let stale = manager.create("job-stale").expect("stale workspace");
    let fresh = manager.create("job-fresh").expect("fresh workspace");
    std::fs::write(stale.join("package.json"), "{}").expect("seed file");
    age(&stale, 25 * HOUR);
    age(&fresh, HOUR);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = spawn_sweeper(
        Arc::clone(&manager),
        Duration::from_millis(20),
        24 * HOUR,
        shutdown_rx,
    );

    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while stale.exists() {
        assert!(tokio::time::Instant::now() < deadline, "stale workspace was never swept");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(fresh.is_dir(), "recent workspace must survive");
    assert!(manager.is_tracked(&fresh));
    assert!(!manager.is_tracked(&stale));

    shutdown_tx.send(true).expect("sweeper is listening");
    tokio::time::timeout(Duration::from_secs(5), sweeper)
        .await
        .expect("sweeper stops on shutdown")
        .expect("sweeper task completes");

    manager.cleanup_all();
    assert!(!fresh.exists());
    assert!(manager.tracked().is_empty());
}
