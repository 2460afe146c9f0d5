//! Periodic removal of stale workspaces.

use super::WorkspaceManager;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

/// Spawns a task that calls [`WorkspaceManager::cleanup_older_than`] every
/// `interval` until `shutdown` flips to `true` or its sender is dropped.
pub fn spawn_sweeper(
    manager: Arc<WorkspaceManager>,
    interval: Duration,
    max_age: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let sweep_target = Arc::clone(&manager);
                    match tokio::task::spawn_blocking(move || sweep_target.cleanup_older_than(max_age)).await {
                        Ok(removed) => debug!(removed, "workspace sweep finished"),
                        Err(err) => warn!(error = %err, "workspace sweep task failed"),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        debug!("workspace sweeper stopped");
    })
}
