//! Retrying client over an [`ObjectStore`].
//!
//! `put`, `get` and `delete` are retried with linear backoff and resolve to
//! a typed [`TransferError`] once the attempts run out. `stat` never fails:
//! any error, including not-found, means there is no metadata to trust.

use anyhow::Result;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::fs::{ObjectMetadata, ObjectStore, ObjectStream, SHA256_METADATA_KEY};
use crate::sync::error::TransferError;

/// Bounded retry with linear backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub attempts: u32,
    /// Delay before attempt `n + 1` is `base_delay * n`.
    pub base_delay: Duration,
    /// Deadline for each individual attempt. `None` waits indefinitely.
    pub call_timeout: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay: Duration::from_millis(100),
            call_timeout: None,
        }
    }
}

impl RetryPolicy {
    /// No delay between attempts.
    pub fn immediate(attempts: u32) -> Self {
        Self {
            attempts,
            base_delay: Duration::ZERO,
            call_timeout: None,
        }
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }

    /// Delay after failed attempt number `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay * attempt
    }

    /// Run `f` until it succeeds or the attempts are used up.
    pub async fn run<T, F, Fut>(
        &self,
        operation: &'static str,
        key: &str,
        mut f: F,
    ) -> std::result::Result<T, TransferError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let attempts = self.attempts.max(1);
        let mut attempt = 1;

        loop {
            let result = match self.call_timeout {
                Some(timeout) => match tokio::time::timeout(timeout, f()).await {
                    Ok(result) => result,
                    Err(_) => Err(anyhow::anyhow!("timed out after {:?}", timeout)),
                },
                None => f().await,
            };

            match result {
                Ok(value) => return Ok(value),
                Err(e) if attempt >= attempts => {
                    tracing::warn!(
                        "{} {} failed after {} attempts: {:#}",
                        operation,
                        key,
                        attempts,
                        e
                    );
                    return Err(TransferError::Exhausted {
                        operation,
                        key: key.to_string(),
                        attempts,
                        last: format!("{:#}", e),
                    });
                }
                Err(e) => {
                    tracing::debug!("{} {} attempt {} failed: {:#}", operation, key, attempt, e);
                    tokio::time::sleep(self.delay_after(attempt)).await;
                    attempt += 1;
                }
            }
        }
    }
}

/// Shared, read-only handle used by every transfer worker.
pub struct StoreClient {
    store: Arc<dyn ObjectStore>,
    retry: RetryPolicy,
}

impl StoreClient {
    pub fn new(store: Arc<dyn ObjectStore>, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    pub fn display_path(&self, bucket: &str, key: &str) -> String {
        self.store.display_path(bucket, key)
    }

    /// Not retried: a failure here happens before any transfer starts.
    pub async fn bucket_exists(&self, bucket: &str) -> Result<bool> {
        self.store.bucket_exists(bucket).await
    }

    pub async fn stat(&self, bucket: &str, key: &str) -> Option<ObjectMetadata> {
        match self.store.stat(bucket, key).await {
            Ok(meta) => meta,
            Err(e) => {
                tracing::debug!("stat {} failed, treating as absent: {:#}", key, e);
                None
            }
        }
    }

    /// Upload `data` with its hex SHA-256 attached as user metadata.
    pub async fn put(
        &self,
        bucket: &str,
        key: &str,
        data: &[u8],
        sha256: &str,
    ) -> std::result::Result<(), TransferError> {
        let metadata = HashMap::from([(SHA256_METADATA_KEY.to_string(), sha256.to_string())]);
        self.retry
            .run("put", key, || {
                self.store.put(bucket, key, data.to_vec(), metadata.clone())
            })
            .await
    }

    pub async fn get(&self, bucket: &str, key: &str) -> std::result::Result<Vec<u8>, TransferError> {
        self.retry.run("get", key, || self.store.get(bucket, key)).await
    }

    pub async fn delete(&self, bucket: &str, key: &str) -> std::result::Result<(), TransferError> {
        self.retry.run("delete", key, || self.store.delete(bucket, key)).await
    }

    /// Not retried: the stream cannot be restarted mid-iteration.
    pub async fn list(&self, bucket: &str, prefix: &str) -> Result<ObjectStream> {
        self.store.list(bucket, prefix).await
    }
}
