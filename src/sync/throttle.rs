//! Time-throttled progress reporting.
//!
//! Callbacks fire at most once per interval while work drains, and once
//! more at 100% when it finishes.

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use std::sync::Arc;
use std::time::Duration;

/// Receives a completion percentage in `0.0..=100.0`.
pub type ProgressCallback = Arc<dyn Fn(f64) + Send + Sync>;

/// Default minimum time between two progress callbacks.
pub const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_secs(1);

type Limiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Gates progress callbacks with a one-cell token bucket refilled once per
/// interval. A zero interval reports every tick.
pub struct ProgressThrottle {
    callback: Option<ProgressCallback>,
    limiter: Option<Limiter>,
    total: usize,
}

impl ProgressThrottle {
    pub fn new(callback: Option<ProgressCallback>, interval: Duration, total: usize) -> Self {
        let limiter = Quota::with_period(interval).map(|quota| {
            let limiter = RateLimiter::direct(quota);
            // Spend the initial cell so the first report waits a full interval.
            let _ = limiter.check();
            limiter
        });

        Self {
            callback,
            limiter,
            total,
        }
    }

    /// Report `done` completed items if the interval has elapsed.
    pub fn tick(&mut self, done: usize) {
        let Some(callback) = &self.callback else {
            return;
        };
        let due = match &self.limiter {
            Some(limiter) => limiter.check().is_ok(),
            None => true,
        };
        if due {
            callback(percentage(done, self.total));
        }
    }

    /// Unconditional final 100% report.
    pub fn finish(&mut self) {
        if let Some(callback) = &self.callback {
            callback(100.0);
        }
    }
}

/// Percentage of `done` out of `total`; an empty batch counts as complete.
pub fn percentage(done: usize, total: usize) -> f64 {
    if total == 0 {
        return 100.0;
    }
    done as f64 / total as f64 * 100.0
}
