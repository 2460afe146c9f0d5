//! Gapfill: a job engine that turns per-file coverage gaps into pull
//! requests.
//!
//! A job asks for better test coverage of one file in one repository. The
//! engine polls for runnable jobs, takes a per-repository lock, and runs a
//! six-stage pipeline in an ephemeral workspace: clone, baseline coverage,
//! sandboxed test generation, verification coverage, push, and pull request.
//! Failed attempts are retried up to a configured ceiling.
//!
//! # Architecture
//!
//! Gapfill follows hexagonal architecture principles:
//!
//! - **Domain**: Pure business logic with no infrastructure dependencies
//! - **Ports**: Abstract trait interfaces for external interactions
//! - **Adapters**: Concrete implementations of ports (database, CLIs, etc.)
//!
//! # Modules
//!
//! - [`job`]: Job state machine, persistence, and the repository lock
//! - [`sandbox`]: Supervised execution of untrusted commands
//! - [`workspace`]: Ephemeral per-job directories
//! - [`pipeline`]: The six stages and their external collaborators
//! - [`dispatch`]: The poll loop
//! - [`config`]: TOML configuration
//! - [`telemetry`]: Operational tracing setup

pub mod config;
pub mod dispatch;
pub mod job;
pub mod pipeline;
pub mod sandbox;
pub mod telemetry;
pub mod workspace;
