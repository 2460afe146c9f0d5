//! Supervisor selection with a fail-closed default.

use super::{ContainerSupervisor, LocalProcessSupervisor};
use crate::sandbox::ports::{ProcessSupervisor, SandboxError, SandboxResult};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// What to do when no container runtime is usable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SandboxPolicy {
    /// Refuse to run untrusted commands without a container.
    #[default]
    Required,
    /// Fall back to host execution. Meant for development machines only.
    AllowUnsandboxed,
}

/// Checks the container runtime and returns the supervisor to use.
///
/// # Errors
///
/// Returns [`SandboxError::RuntimeUnavailable`] when the runtime is not
/// usable and `policy` is [`SandboxPolicy::Required`].
pub async fn select_supervisor(
    policy: SandboxPolicy,
    container: ContainerSupervisor,
) -> SandboxResult<Arc<dyn ProcessSupervisor>> {
    let available = ContainerSupervisor::is_available(container.runtime()).await;
    resolve(policy, available, container)
}

fn resolve(
    policy: SandboxPolicy,
    runtime_available: bool,
    container: ContainerSupervisor,
) -> SandboxResult<Arc<dyn ProcessSupervisor>> {
    let runtime = container.runtime();
    if runtime_available {
        info!(%runtime, "using container isolation");
        return Ok(Arc::new(container));
    }
    match policy {
        SandboxPolicy::Required => Err(SandboxError::RuntimeUnavailable(format!(
            "'{runtime}' is not usable and the sandbox policy requires isolation"
        ))),
        SandboxPolicy::AllowUnsandboxed => {
            warn!(%runtime, "container runtime unavailable, running commands UNSANDBOXED");
            Ok(Arc::new(LocalProcessSupervisor::new()))
        }
    }
}
