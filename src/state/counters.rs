//! Process-local running totals and the concurrent retry accumulator

use crate::state::FetchTarget;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Running totals incremented by the fetch engine
///
/// Every field is an independent atomic; readers get a consistent value per
/// counter, not across counters.
#[derive(Debug, Default)]
pub struct Counters {
    requests_issued: AtomicU64,
    responses_received: AtomicU64,
    succeeded: AtomicU64,
    invalid: AtomicU64,
    dropped: AtomicU64,
    retried: AtomicU64,
}

/// A point-in-time copy of [`Counters`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterSnapshot {
    pub requests_issued: u64,
    pub responses_received: u64,
    pub succeeded: u64,
    pub invalid: u64,
    pub dropped: u64,
    pub retried: u64,
}

impl Counters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one request and returns the new total
    pub fn request_issued(&self) -> u64 {
        self.requests_issued.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Records one response and returns the new total
    pub fn response_received(&self) -> u64 {
        self.responses_received.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn record_success(&self) {
        self.succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_invalid(&self) {
        self.invalid.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_retry(&self) {
        self.retried.fetch_add(1, Ordering::Relaxed);
    }

    pub fn invalid_count(&self) -> u64 {
        self.invalid.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            requests_issued: self.requests_issued.load(Ordering::Relaxed),
            responses_received: self.responses_received.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            invalid: self.invalid.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            retried: self.retried.load(Ordering::Relaxed),
        }
    }
}

/// Append-only queue of targets awaiting the next round
///
/// Appends from concurrent attempts never interleave; a round drains the
/// whole queue at once.
#[derive(Debug, Default)]
pub struct RetryQueue {
    inner: Mutex<Vec<FetchTarget>>,
}

impl RetryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, target: FetchTarget) {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(target);
    }

    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Takes every queued target, leaving the queue empty
    pub fn drain(&self) -> Vec<FetchTarget> {
        std::mem::take(
            &mut *self
                .inner
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
        )
    }
}
