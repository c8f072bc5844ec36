use anyhow::{bail, Result};
use async_trait::async_trait;
use futures::StreamExt;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use crate::fs::backend::{ObjectMetadata, ObjectStore, ObjectStream, ObjectSummary};

#[derive(Debug, Clone)]
struct StoredObject {
    data: Vec<u8>,
    metadata: HashMap<String, String>,
}

/// In-process object store keyed by bucket, then object key.
///
/// Buckets must be created up front; operations against an unknown bucket
/// fail the same way a remote store would.
#[derive(Default)]
pub struct MemoryStore {
    buckets: Mutex<HashMap<String, BTreeMap<String, StoredObject>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store with the given buckets already present.
    pub fn with_buckets<I, S>(buckets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let store = Self::new();
        {
            let mut map = store.lock();
            for bucket in buckets {
                map.insert(bucket.into(), BTreeMap::new());
            }
        }
        store
    }

    /// Insert an object directly, bypassing user metadata.
    pub fn insert(&self, bucket: &str, key: &str, data: impl Into<Vec<u8>>) {
        self.lock()
            .entry(bucket.to_string())
            .or_default()
            .insert(
                key.to_string(),
                StoredObject {
                    data: data.into(),
                    metadata: HashMap::new(),
                },
            );
    }

    /// Sorted keys currently stored in `bucket`.
    pub fn keys(&self, bucket: &str) -> Vec<String> {
        self.lock()
            .get(bucket)
            .map(|objects| objects.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Raw contents of an object, if present.
    pub fn object(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        self.lock()
            .get(bucket)
            .and_then(|objects| objects.get(key))
            .map(|o| o.data.clone())
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, BTreeMap<String, StoredObject>>> {
        // A panicking test thread must not wedge every other caller.
        self.buckets.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn bucket_exists(&self, bucket: &str) -> Result<bool> {
        Ok(self.lock().contains_key(bucket))
    }

    async fn stat(&self, bucket: &str, key: &str) -> Result<Option<ObjectMetadata>> {
        let buckets = self.lock();
        let Some(objects) = buckets.get(bucket) else {
            bail!("No such bucket: {}", bucket);
        };
        Ok(objects.get(key).map(|o| {
            ObjectMetadata::from_user_metadata(o.data.len() as u64, Some(&o.metadata))
        }))
    }

    async fn put(
        &self,
        bucket: &str,
        key: &str,
        data: Vec<u8>,
        metadata: HashMap<String, String>,
    ) -> Result<()> {
        let mut buckets = self.lock();
        let Some(objects) = buckets.get_mut(bucket) else {
            bail!("No such bucket: {}", bucket);
        };
        objects.insert(key.to_string(), StoredObject { data, metadata });
        Ok(())
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        let buckets = self.lock();
        let Some(objects) = buckets.get(bucket) else {
            bail!("No such bucket: {}", bucket);
        };
        match objects.get(key) {
            Some(o) => Ok(o.data.clone()),
            None => bail!("No such key: {}", key),
        }
    }

    async fn list(&self, bucket: &str, prefix: &str) -> Result<ObjectStream> {
        let buckets = self.lock();
        let Some(objects) = buckets.get(bucket) else {
            bail!("No such bucket: {}", bucket);
        };
        let entries: Vec<Result<ObjectSummary>> = objects
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, o)| {
                Ok(ObjectSummary {
                    key: key.clone(),
                    size: o.data.len() as u64,
                })
            })
            .collect();
        Ok(futures::stream::iter(entries).boxed())
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<()> {
        let mut buckets = self.lock();
        let Some(objects) = buckets.get_mut(bucket) else {
            bail!("No such bucket: {}", bucket);
        };
        objects.remove(key);
        Ok(())
    }

    fn display_path(&self, bucket: &str, key: &str) -> String {
        format!("memory://{}/{}", bucket, key)
    }
}
