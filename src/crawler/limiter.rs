//! Global request-rate ceiling shared by every in-flight attempt

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Grants request slots at a fixed rate
///
/// Each caller reserves the next free slot under a fair (FIFO) lock and then
/// sleeps until it outside the lock. Slots are spaced exactly `1 / rate`
/// apart and an idle limiter does not bank unused slots, so there is no
/// burst beyond the rate.
#[derive(Debug)]
pub struct RateLimiter {
    interval: Duration,
    next_slot: Mutex<Option<Instant>>,
}

impl RateLimiter {
    /// Creates a limiter for `rate_per_second` requests per second
    pub fn new(rate_per_second: f64) -> Self {
        let rate = if rate_per_second > 0.0 { rate_per_second } else { 1.0 };
        Self {
            interval: Duration::from_secs_f64(1.0 / rate),
            next_slot: Mutex::new(None),
        }
    }

    /// Suspends until this caller's slot comes up; never fails
    pub async fn acquire(&self) {
        let slot = {
            let mut next_slot = self.next_slot.lock().await;
            let now = Instant::now();
            let slot = match *next_slot {
                Some(next) if next > now => next,
                _ => now,
            };
            *next_slot = Some(slot + self.interval);
            slot
        };
        tokio::time::sleep_until(slot).await;
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}
