//! Coverage-improvement job lifecycle.
//!
//! A job is one attempt to raise coverage for a single file in a single
//! repository. Every mutation produces a new [`domain::Job`] revision, and
//! the repository port owns the only piece of shared mutable state between
//! concurrent pipelines: the per-repository lock, taken through one atomic
//! conditional transition. The module follows hexagonal architecture:
//!
//! - Domain types in [`domain`]
//! - Port contracts in [`ports`]
//! - Adapter implementations in [`adapters`]
//! - Orchestration services in [`services`]

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod services;

#[cfg(test)]
mod tests;
