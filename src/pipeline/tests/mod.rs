//! Unit tests for the pipeline module.

pub(crate) mod support;
mod template_tests;
