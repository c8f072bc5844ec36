//! Sync session: one directory-level cache or restore pass.
//!
//! A session moves through `Enumerating → Deciding → Transferring →
//! (Sweeping) → Reporting` exactly once. Per-file problems are recorded as
//! [`TransferOutcome::Failed`] and never abort the pass; only failures that
//! happen before any transfer starts (unreadable root, listing the prefix
//! for a restore) are returned as errors.

use anyhow::{Context, Result};
use futures::StreamExt;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::fs::local::{local_path_for_key, normalize_prefix};
use crate::fs::{LocalFile, LocalFs};
use crate::sync::client::{RetryPolicy, StoreClient};
use crate::sync::error::TransferError;
use crate::sync::hash::hash_file_async;
use crate::sync::scheduler::{OutcomeCounts, TransferOutcome, TransferScheduler, DEFAULT_WORKERS};
use crate::sync::throttle::{ProgressCallback, ProgressThrottle, DEFAULT_PROGRESS_INTERVAL};

/// Tunables for a session.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Worker pool width.
    pub workers: usize,
    /// Minimum time between two progress reports.
    pub progress_interval: Duration,
    /// Retry policy for put/get/delete.
    pub retry: RetryPolicy,
    /// Delete remote objects under the prefix that were not part of the
    /// upload pass.
    pub clear_existing: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            retry: RetryPolicy::default(),
            clear_existing: false,
        }
    }
}

/// Current sync phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Enumerating,
    Deciding,
    Transferring,
    Sweeping,
    Reporting,
}

impl SyncPhase {
    fn label(self, direction: Direction) -> &'static str {
        match (self, direction) {
            (SyncPhase::Sweeping, _) => "Deleting unused files",
            (_, Direction::Upload) => "Uploading to cache",
            (_, Direction::Download) => "Restoring from cache",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Upload,
    Download,
}

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionStatus {
    #[default]
    Completed,
    /// The bucket does not exist; nothing was transferred.
    BucketMissing,
    /// The local root does not exist; nothing was cached.
    SourceMissing,
}

/// Final counts of a session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub status: SessionStatus,
    pub uploaded: usize,
    pub skipped: usize,
    pub downloaded: usize,
    pub failed: usize,
    /// Stale objects removed by the sweep.
    pub deleted: usize,
    /// Stale objects the sweep could not remove.
    pub delete_failed: usize,
    /// Phases entered, in order.
    pub phases: Vec<SyncPhase>,
}

impl SyncReport {
    fn skipped_with(status: SessionStatus) -> Self {
        Self {
            status,
            ..Self::default()
        }
    }

    fn absorb(&mut self, counts: OutcomeCounts) {
        self.uploaded += counts.uploaded;
        self.skipped += counts.skipped;
        self.downloaded += counts.downloaded;
        self.failed += counts.failed;
    }

    /// Files that went through the transfer phase.
    pub fn processed(&self) -> usize {
        self.uploaded + self.skipped + self.downloaded + self.failed
    }
}

/// Observer for throttled progress, called with the phase and a percentage.
pub type PhaseProgress = Arc<dyn Fn(SyncPhase, f64) + Send + Sync>;

/// Work item for an upload.
struct UploadItem {
    file: LocalFile,
    key: String,
}

/// Work item for a download.
struct DownloadItem {
    key: String,
    local_path: PathBuf,
}

/// Orchestrates one cache (upload) or restore (download) pass.
pub struct SyncSession {
    client: Arc<StoreClient>,
    bucket: String,
    prefix: String,
    options: SyncOptions,
    progress: Option<PhaseProgress>,
}

impl SyncSession {
    /// `id` is normalized into the remote prefix.
    pub fn new(client: Arc<StoreClient>, bucket: &str, id: &str, options: SyncOptions) -> Self {
        Self {
            client,
            bucket: bucket.to_string(),
            prefix: normalize_prefix(id),
            options,
            progress: None,
        }
    }

    /// Replace the default log-line progress reporting.
    pub fn with_progress(mut self, progress: PhaseProgress) -> Self {
        self.progress = Some(progress);
        self
    }

    fn progress_for(&self, phase: SyncPhase, direction: Direction) -> ProgressCallback {
        match &self.progress {
            Some(progress) => {
                let progress = progress.clone();
                Arc::new(move |p: f64| progress(phase, p))
            }
            None => {
                let label = phase.label(direction);
                Arc::new(move |p: f64| tracing::info!("{} {:.1}%", label, p))
            }
        }
    }

    fn scheduler(&self, direction: Direction) -> TransferScheduler {
        TransferScheduler::new(self.options.workers)
            .with_progress_interval(self.options.progress_interval)
            .with_progress_callback(Some(self.progress_for(SyncPhase::Transferring, direction)))
    }

    fn enter(&self, report: &mut SyncReport, phase: SyncPhase) {
        tracing::debug!("{}/{}: {:?}", self.bucket, self.prefix, phase);
        report.phases.push(phase);
    }

    /// Mirror `local_root` into `bucket/prefix`.
    pub async fn upload(&self, local_root: &Path) -> Result<SyncReport> {
        if !local_root.exists() {
            tracing::warn!(
                "The specified path directory does not exist: {}... Skipping cache",
                local_root.display()
            );
            return Ok(SyncReport::skipped_with(SessionStatus::SourceMissing));
        }

        let mut report = SyncReport::default();
        self.enter(&mut report, SyncPhase::Enumerating);
        let tree = LocalFs::enumerate_async(local_root).await?;

        if !self
            .client
            .bucket_exists(&self.bucket)
            .await
            .with_context(|| format!("Failed to check bucket {}", self.bucket))?
        {
            tracing::warn!("Bucket {} does not exist. Skipping upload", self.bucket);
            return Ok(SyncReport::skipped_with(SessionStatus::BucketMissing));
        }

        tracing::info!(
            "Cache local directory {} to remote path {}/{}",
            local_root.display(),
            self.bucket,
            self.prefix
        );

        self.enter(&mut report, SyncPhase::Deciding);
        for rejected in &tree.rejected {
            tracing::warn!("Skipping {}: {}", rejected.path.display(), rejected.reason);
            report.failed += 1;
        }

        let items: Vec<UploadItem> = tree
            .files
            .iter()
            .map(|file| UploadItem {
                key: file.remote_key(&self.prefix),
                file: file.clone(),
            })
            .collect();

        // Every key considered in this pass should exist afterwards,
        // including ones whose upload failed: an older copy may still be
        // valid and is not ours to delete.
        let live_keys: HashSet<String> = items.iter().map(|i| i.key.clone()).collect();

        tracing::info!(
            "Starting upload of {} files ({}) with {} workers...",
            items.len(),
            humansize::format_size(tree.total_bytes(), humansize::BINARY),
            self.options.workers
        );

        self.enter(&mut report, SyncPhase::Transferring);
        let client = self.client.clone();
        let bucket = self.bucket.clone();
        let outcomes = self
            .scheduler(Direction::Upload)
            .run(items, move |item| {
                let client = client.clone();
                let bucket = bucket.clone();
                async move { upload_one(&client, &bucket, item).await }
            })
            .await;

        let counts: OutcomeCounts = outcomes.iter().collect();
        report.absorb(counts);
        tracing::info!(
            "Upload completed! {} uploaded, {} skipped, {} failed",
            report.uploaded,
            report.skipped,
            report.failed
        );

        if self.options.clear_existing {
            self.enter(&mut report, SyncPhase::Sweeping);
            tracing::info!("Clear unused files in remote path {}/{}", self.bucket, self.prefix);
            let (deleted, delete_failed) = self.sweep(live_keys).await;
            report.deleted = deleted;
            report.delete_failed = delete_failed;
        }

        self.enter(&mut report, SyncPhase::Reporting);
        Ok(report)
    }

    /// Restore `bucket/prefix` into `local_root`.
    pub async fn download(&self, local_root: &Path) -> Result<SyncReport> {
        if !local_root.exists() {
            LocalFs::create_dir(local_root)?;
        }

        if !self
            .client
            .bucket_exists(&self.bucket)
            .await
            .with_context(|| format!("Failed to check bucket {}", self.bucket))?
        {
            tracing::warn!("Bucket {} does not exist. Skipping download", self.bucket);
            return Ok(SyncReport::skipped_with(SessionStatus::BucketMissing));
        }

        tracing::info!(
            "Restore remote cache {}/{} to local directory {}",
            self.bucket,
            self.prefix,
            local_root.display()
        );

        let mut report = SyncReport::default();
        self.enter(&mut report, SyncPhase::Enumerating);
        tracing::info!("Listing files in {}/{}...", self.bucket, self.prefix);
        let mut listing = self
            .client
            .list(&self.bucket, &self.prefix)
            .await
            .with_context(|| format!("Failed to list {}/{}", self.bucket, self.prefix))?;

        let mut keys = Vec::new();
        while let Some(object) = listing.next().await {
            let object =
                object.with_context(|| format!("Failed to list {}/{}", self.bucket, self.prefix))?;
            keys.push(object.key);
        }

        self.enter(&mut report, SyncPhase::Deciding);
        let mut items = Vec::new();
        for key in keys {
            match local_path_for_key(local_root, &self.prefix, &key) {
                Some(local_path) => items.push(DownloadItem { key, local_path }),
                // A directory marker for the prefix itself is not a file.
                None if key == self.prefix => {}
                None => {
                    let error = TransferError::InvalidKey {
                        key,
                        reason: "does not map inside the local root".to_string(),
                    };
                    tracing::warn!("{}", error);
                    report.failed += 1;
                }
            }
        }

        tracing::info!(
            "Starting download of {} files with {} workers...",
            items.len(),
            self.options.workers
        );

        self.enter(&mut report, SyncPhase::Transferring);
        let client = self.client.clone();
        let bucket = self.bucket.clone();
        let outcomes = self
            .scheduler(Direction::Download)
            .run(items, move |item| {
                let client = client.clone();
                let bucket = bucket.clone();
                async move { download_one(&client, &bucket, item).await }
            })
            .await;

        report.absorb(outcomes.iter().collect());
        tracing::info!(
            "Download completed! {} files downloaded, {} failed",
            report.downloaded,
            report.failed
        );

        self.enter(&mut report, SyncPhase::Reporting);
        Ok(report)
    }

    /// Delete every object under the prefix that is not in `live_keys`.
    ///
    /// Returns `(deleted, failed)`. Listing errors end the sweep early but
    /// objects already identified as stale are still removed.
    async fn sweep(&self, live_keys: HashSet<String>) -> (usize, usize) {
        tracing::info!("Finding unused files in {}/{}...", self.bucket, self.prefix);

        let mut stale = Vec::new();
        match self.client.list(&self.bucket, &self.prefix).await {
            Ok(mut listing) => {
                while let Some(object) = listing.next().await {
                    match object {
                        Ok(object) if !live_keys.contains(&object.key) => stale.push(object.key),
                        Ok(_) => {}
                        Err(e) => {
                            tracing::warn!("Listing {}/{} failed: {:#}", self.bucket, self.prefix, e);
                            break;
                        }
                    }
                }
            }
            Err(e) => {
                tracing::warn!("Listing {}/{} failed: {:#}", self.bucket, self.prefix, e);
                return (0, 0);
            }
        }

        let total = stale.len();
        let mut throttle = ProgressThrottle::new(
            Some(self.progress_for(SyncPhase::Sweeping, Direction::Upload)),
            self.options.progress_interval,
            total,
        );

        let mut deleted = 0;
        let mut failed = 0;
        for (done, key) in stale.iter().enumerate() {
            match self.client.delete(&self.bucket, key).await {
                Ok(()) => deleted += 1,
                Err(e) => {
                    tracing::warn!(
                        "Failed to delete {}: {}",
                        self.client.display_path(&self.bucket, key),
                        e
                    );
                    failed += 1;
                }
            }
            throttle.tick(done + 1);
        }
        throttle.finish();

        tracing::info!(
            "Deleted {} out of {} unused files from {}/{}",
            deleted,
            total,
            self.bucket,
            self.prefix
        );
        (deleted, failed)
    }
}

async fn upload_one(client: &StoreClient, bucket: &str, item: UploadItem) -> TransferOutcome {
    let (fingerprint, data) = match hash_file_async(&item.file.absolute_path).await {
        Ok(result) => result,
        Err(source) => {
            let error = TransferError::Fingerprint {
                path: item.file.absolute_path,
                source,
            };
            tracing::warn!("{}", error);
            return TransferOutcome::Failed(error);
        }
    };

    if let Some(remote) = client.stat(bucket, &item.key).await {
        if fingerprint.matches(&remote) {
            tracing::debug!("{} unchanged, skipping", item.key);
            return TransferOutcome::Skipped;
        }
    }

    match client.put(bucket, &item.key, &data, &fingerprint.hash).await {
        Ok(()) => TransferOutcome::Uploaded,
        Err(e) => TransferOutcome::Failed(e),
    }
}

async fn download_one(client: &StoreClient, bucket: &str, item: DownloadItem) -> TransferOutcome {
    let data = match client.get(bucket, &item.key).await {
        Ok(data) => data,
        Err(e) => return TransferOutcome::Failed(e),
    };

    match write_local(&item.local_path, data).await {
        Ok(()) => TransferOutcome::Downloaded,
        Err(source) => {
            let error = TransferError::LocalWrite {
                path: item.local_path,
                source,
            };
            tracing::warn!("{}", error);
            TransferOutcome::Failed(error)
        }
    }
}

async fn write_local(path: &Path, data: Vec<u8>) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, data).await
}
