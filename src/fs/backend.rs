use anyhow::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;
use std::collections::HashMap;

/// User metadata key carrying the hex SHA-256 of an uploaded object.
pub const SHA256_METADATA_KEY: &str = "sha256";

/// Object metadata from a stat call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMetadata {
    /// Native content length of the stored object.
    pub size: u64,
    /// Hex SHA-256 stored as user metadata at upload time, if any.
    pub content_hash: Option<String>,
}

impl ObjectMetadata {
    pub fn from_user_metadata(size: u64, user: Option<&HashMap<String, String>>) -> Self {
        let content_hash = user.and_then(|m| {
            m.iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(SHA256_METADATA_KEY))
                .map(|(_, v)| v.clone())
        });
        Self { size, content_hash }
    }
}

/// One entry of a prefix listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectSummary {
    pub key: String,
    pub size: u64,
}

/// Lazy, finite, non-restartable listing of objects.
pub type ObjectStream = BoxStream<'static, Result<ObjectSummary>>;

/// Capability set of a key/value object store.
///
/// Implementations perform exactly one remote call per method and never
/// retry; retries belong to [`crate::sync::StoreClient`].
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Whether the bucket exists and is reachable.
    async fn bucket_exists(&self, bucket: &str) -> Result<bool>;

    /// Stat an object. `Ok(None)` means the object does not exist.
    async fn stat(&self, bucket: &str, key: &str) -> Result<Option<ObjectMetadata>>;

    /// Store `data` at `key`, attaching `metadata` as user metadata.
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        data: Vec<u8>,
        metadata: HashMap<String, String>,
    ) -> Result<()>;

    /// Read the full contents of an object.
    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>>;

    /// List every object under `prefix`, recursively.
    async fn list(&self, bucket: &str, prefix: &str) -> Result<ObjectStream>;

    /// Delete a single object.
    async fn delete(&self, bucket: &str, key: &str) -> Result<()>;

    /// Get display path for an object
    fn display_path(&self, bucket: &str, key: &str) -> String {
        format!("{}/{}", bucket, key)
    }
}
