//! Port contracts for job persistence.
//!
//! Ports define infrastructure-agnostic interfaces used by job services, the
//! poll loop, and the pipeline.

pub mod repository;

pub use repository::{JobRepository, JobRepositoryError, JobRepositoryResult, LockRequest};
