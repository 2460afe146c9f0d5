//! The six-stage pipeline that turns a dispatched job into a pull request.
//!
//! Stages run in a fixed order (clone, baseline coverage, generation,
//! verification coverage, push, pull request). Coverage stages are
//! best-effort; every other failure ends the attempt and goes through the
//! job's retry policy.

pub mod adapters;
mod error;
pub mod generator;
pub mod ports;
mod runner;
mod stage;
pub mod template;

pub use error::{PipelineError, PipelineResult};
pub use generator::{GenerationOutcome, GenerationRequest, Generator, GeneratorConfig};
pub use runner::{DEFAULT_MAX_ATTEMPTS, Pipeline, PipelineTools, PullRequestTemplates};
pub use stage::Stage;

#[cfg(test)]
pub(crate) mod tests;
