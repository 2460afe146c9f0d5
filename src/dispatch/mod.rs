//! Timer-driven discovery and dispatch of runnable jobs.
//!
//! One [`PollLoop`] tick lists `Pending` and `Retry` jobs oldest first,
//! takes a pipeline slot, synthesizes a branch, and tries the job's
//! repository lock. Winners run on their own task; the tick never waits
//! for a pipeline to finish.

mod error;
mod poll_loop;

pub use error::{DispatchError, DispatchResult};
pub use poll_loop::{
    DEFAULT_MAX_CONCURRENT_PIPELINES, DEFAULT_POLL_INTERVAL, PollLoop, TickOutcome, TickSummary,
};

#[cfg(test)]
mod tests;
