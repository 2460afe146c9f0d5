//! Sandboxed execution of untrusted external commands.
//!
//! A [`ports::ProcessSupervisor`] runs one command under a hard timeout with
//! escalated termination (graceful signal, then force kill after a grace
//! window) and a capped combined output buffer. Container-backed
//! supervisors additionally apply a read-only root, a small writable scratch
//! mount, dropped capabilities, memory/CPU/process ceilings, and a network
//! mode.
//!
//! - Domain types in [`domain`]
//! - Port contracts in [`ports`]
//! - Adapter implementations in [`adapters`]

pub mod adapters;
pub mod domain;
pub mod ports;

#[cfg(test)]
mod tests;
