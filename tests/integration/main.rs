//! Integration tests for the harvester
//!
//! These tests use wiremock to stand in for the storefront and tempfile for
//! the output store, and drive whole runs end to end.

mod common;
mod engine_tests;
mod harvest_tests;
mod review_tests;
