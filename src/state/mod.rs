//! State module for tracking harvest progress
//!
//! # Components
//!
//! - `FetchTarget` / `FetchOutcome` / `Verdict`: what is fetched and what came back
//! - `Counters` / `RetryQueue`: engine-owned accumulators safe under concurrent append
//! - `DetailBatch`: detail records flushed at a size threshold

mod batch;
mod counters;
mod outcome;

// Re-export main types
pub use batch::{DetailBatch, DetailRecord};
pub use counters::{CounterSnapshot, Counters, RetryQueue};
pub use outcome::{FetchOutcome, FetchTarget, SoftFailure, Verdict, DEFAULT_HEADERS};
