// Shared fixtures: a recording, fault-injecting store and temp trees

use anyhow::Result;
use async_trait::async_trait;
use futures::StreamExt;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use dircache::fs::{MemoryStore, ObjectMetadata, ObjectStore, ObjectStream};
use dircache::sync::{RetryPolicy, StoreClient, SyncOptions, SyncSession};

pub const BUCKET: &str = "ci-cache";
pub const ID: &str = "linux/deps";
pub const PREFIX: &str = "linux/deps/";

/// Wraps a [`MemoryStore`], records every call and fails chosen calls a
/// fixed number of times before letting them through.
#[derive(Default)]
pub struct FlakyStore {
    pub inner: MemoryStore,
    calls: Mutex<Vec<(&'static str, String)>>,
    failures: Mutex<HashMap<(&'static str, String), u32>>,
    broken_listings: Mutex<HashMap<String, usize>>,
}

impl FlakyStore {
    pub fn with_bucket() -> Arc<Self> {
        Arc::new(Self {
            inner: MemoryStore::with_buckets([BUCKET]),
            ..Self::default()
        })
    }

    pub fn without_bucket() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Fail the next `times` calls of `op` on `key`.
    pub fn fail_times(&self, op: &'static str, key: &str, times: u32) {
        self.failures
            .lock()
            .unwrap()
            .insert((op, key.to_string()), times);
    }

    /// Make listings of `prefix` yield `after` entries and then an error.
    pub fn break_listing_after(&self, prefix: &str, after: usize) {
        self.broken_listings
            .lock()
            .unwrap()
            .insert(prefix.to_string(), after);
    }

    pub fn count(&self, op: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|(o, _)| *o == op).count()
    }

    pub fn count_for(&self, op: &str, key: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(o, k)| *o == op && k == key)
            .count()
    }

    pub fn reset_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    fn enter(&self, op: &'static str, key: &str) -> Result<()> {
        self.calls.lock().unwrap().push((op, key.to_string()));
        let mut failures = self.failures.lock().unwrap();
        if let Some(remaining) = failures.get_mut(&(op, key.to_string())) {
            if *remaining > 0 {
                *remaining -= 1;
                anyhow::bail!("injected {} failure for {}", op, key);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for FlakyStore {
    async fn bucket_exists(&self, bucket: &str) -> Result<bool> {
        self.enter("bucket_exists", bucket)?;
        self.inner.bucket_exists(bucket).await
    }

    async fn stat(&self, bucket: &str, key: &str) -> Result<Option<ObjectMetadata>> {
        self.enter("stat", key)?;
        self.inner.stat(bucket, key).await
    }

    async fn put(
        &self,
        bucket: &str,
        key: &str,
        data: Vec<u8>,
        metadata: HashMap<String, String>,
    ) -> Result<()> {
        self.enter("put", key)?;
        self.inner.put(bucket, key, data, metadata).await
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        self.enter("get", key)?;
        self.inner.get(bucket, key).await
    }

    async fn list(&self, bucket: &str, prefix: &str) -> Result<ObjectStream> {
        self.enter("list", prefix)?;
        let listing = self.inner.list(bucket, prefix).await?;
        let broken_after = self.broken_listings.lock().unwrap().get(prefix).copied();
        match broken_after {
            Some(after) => {
                let failure = futures::stream::once(async {
                    Err(anyhow::anyhow!("injected listing failure"))
                });
                Ok(listing.take(after).chain(failure).boxed())
            }
            None => Ok(listing),
        }
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<()> {
        self.enter("delete", key)?;
        self.inner.delete(bucket, key).await
    }
}

pub fn options(clear_existing: bool) -> SyncOptions {
    SyncOptions {
        workers: 4,
        progress_interval: Duration::from_secs(3600),
        retry: RetryPolicy::immediate(3),
        clear_existing,
    }
}

pub fn session(store: &Arc<FlakyStore>, clear_existing: bool) -> SyncSession {
    let client = Arc::new(StoreClient::new(store.clone(), RetryPolicy::immediate(3)));
    SyncSession::new(client, BUCKET, ID, options(clear_existing))
}

/// Write `files` (relative path, contents) under `root`.
pub fn write_tree(root: &Path, files: &[(&str, &str)]) {
    for (rel, contents) in files {
        let path = root.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, contents).unwrap();
    }
}

/// Every file under `root` as sorted (relative path, contents) pairs.
pub fn read_tree(root: &Path) -> Vec<(String, Vec<u8>)> {
    let tree = dircache::fs::LocalFs::enumerate(root).unwrap();
    let mut files: Vec<(String, Vec<u8>)> = tree
        .files
        .into_iter()
        .map(|f| (f.relative_path, fs::read(f.absolute_path).unwrap()))
        .collect();
    files.sort();
    files
}
