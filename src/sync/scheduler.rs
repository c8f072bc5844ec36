//! Bounded worker pool for per-file transfers.
//!
//! Every item becomes a task in a [`JoinSet`], gated by a semaphore so at
//! most `workers` run at once. Outcomes are drained in completion order by
//! a single loop that owns the completed count and the progress throttle,
//! so workers share no mutable state. Dropping the pool (including on an
//! early return or panic) aborts whatever is still running.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::sync::error::TransferError;
use crate::sync::throttle::{ProgressCallback, ProgressThrottle, DEFAULT_PROGRESS_INTERVAL};

/// Default worker pool width.
pub const DEFAULT_WORKERS: usize = 8;

/// Result of one per-file operation.
#[derive(Debug)]
pub enum TransferOutcome {
    Uploaded,
    Skipped,
    Downloaded,
    Failed(TransferError),
}

/// Aggregate counts over a batch of outcomes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutcomeCounts {
    pub uploaded: usize,
    pub skipped: usize,
    pub downloaded: usize,
    pub failed: usize,
}

impl OutcomeCounts {
    pub fn record(&mut self, outcome: &TransferOutcome) {
        match outcome {
            TransferOutcome::Uploaded => self.uploaded += 1,
            TransferOutcome::Skipped => self.skipped += 1,
            TransferOutcome::Downloaded => self.downloaded += 1,
            TransferOutcome::Failed(_) => self.failed += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.uploaded + self.skipped + self.downloaded + self.failed
    }
}

impl<'a> FromIterator<&'a TransferOutcome> for OutcomeCounts {
    fn from_iter<I: IntoIterator<Item = &'a TransferOutcome>>(iter: I) -> Self {
        let mut counts = Self::default();
        for outcome in iter {
            counts.record(outcome);
        }
        counts
    }
}

pub struct TransferScheduler {
    workers: usize,
    progress_interval: Duration,
    progress: Option<ProgressCallback>,
}

impl Default for TransferScheduler {
    fn default() -> Self {
        Self::new(DEFAULT_WORKERS)
    }
}

impl TransferScheduler {
    /// Create a scheduler with `workers` concurrent slots (at least one).
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            progress: None,
        }
    }

    pub fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = interval;
        self
    }

    /// Set a progress callback function
    pub fn with_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(f64) + Send + Sync + 'static,
    {
        self.progress = Some(Arc::new(callback));
        self
    }

    pub fn with_progress_callback(mut self, callback: Option<ProgressCallback>) -> Self {
        self.progress = callback;
        self
    }

    /// Run `op` over every item and return the outcomes in completion order.
    pub async fn run<I, F, Fut>(&self, items: Vec<I>, op: F) -> Vec<TransferOutcome>
    where
        I: Send + 'static,
        F: Fn(I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = TransferOutcome> + Send + 'static,
    {
        let total = items.len();
        let op = Arc::new(op);
        let slots = Arc::new(Semaphore::new(self.workers));
        let mut pool = JoinSet::new();

        for item in items {
            let op = op.clone();
            let slots = slots.clone();
            pool.spawn(async move {
                // The semaphore is never closed, so acquisition only fails
                // if the pool itself is being torn down.
                let _permit = slots.acquire_owned().await;
                op(item).await
            });
        }

        let mut throttle =
            ProgressThrottle::new(self.progress.clone(), self.progress_interval, total);
        let mut outcomes = Vec::with_capacity(total);

        while let Some(joined) = pool.join_next().await {
            let outcome = match joined {
                Ok(outcome) => outcome,
                Err(e) => TransferOutcome::Failed(TransferError::Worker(e.to_string())),
            };
            outcomes.push(outcome);
            throttle.tick(outcomes.len());
        }

        throttle.finish();
        outcomes
    }
}
