//! Unit tests for the sandbox module.

mod escalation_tests;
mod local_supervisor_tests;
