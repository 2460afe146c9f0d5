//! Unit tests for the job module.

mod memory_repository_tests;
