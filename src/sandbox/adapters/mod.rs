//! Process supervisor implementations.

mod container;
mod local;
mod select;

pub use container::{ContainerRuntime, ContainerSupervisor};
pub use local::LocalProcessSupervisor;
pub use select::{SandboxPolicy, select_supervisor};
