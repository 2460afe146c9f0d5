//! Ephemeral per-job workspaces.
//!
//! Every workspace is a direct child of one configured base directory,
//! opened through a capability handle so removals cannot escape it. Created
//! paths are tracked until cleaned; a background sweep bounds disk growth
//! from processes that died before cleaning up.

mod error;
mod manager;
mod sweeper;

pub use error::{WorkspaceError, WorkspaceResult};
pub use manager::{WorkspaceLease, WorkspaceManager};
pub use sweeper::spawn_sweeper;

#[cfg(test)]
mod tests;
