use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use opendal::{services::S3, ErrorKind, Operator};
use std::collections::HashMap;
use std::sync::Mutex;

use crate::fs::backend::{ObjectMetadata, ObjectStore, ObjectStream, ObjectSummary};

/// S3 and S3-compatible storage backend using OpenDAL
///
/// OpenDAL binds an operator to one bucket, so operators are built lazily
/// and cached per bucket. Cloning an [`Operator`] is cheap and shares the
/// underlying HTTP client.
pub struct S3Store {
    endpoint: String,
    region: String,
    access_key: String,
    secret_key: String,
    operators: Mutex<HashMap<String, Operator>>,
}

impl S3Store {
    /// Create a new S3-compatible backend with explicit credentials.
    ///
    /// `server` may be a bare `host[:port]`, in which case TLS is assumed.
    pub fn new(server: &str, region: &str, access_key: &str, secret_key: &str) -> Self {
        Self {
            endpoint: endpoint_url(server),
            region: region.to_string(),
            access_key: access_key.to_string(),
            secret_key: secret_key.to_string(),
            operators: Mutex::new(HashMap::new()),
        }
    }

    fn operator(&self, bucket: &str) -> Result<Operator> {
        let mut operators = self
            .operators
            .lock()
            .map_err(|_| anyhow::anyhow!("S3 operator cache poisoned"))?;

        if let Some(op) = operators.get(bucket) {
            return Ok(op.clone());
        }

        let builder = S3::default()
            .bucket(bucket)
            .region(&self.region)
            .endpoint(&self.endpoint)
            .access_key_id(&self.access_key)
            .secret_access_key(&self.secret_key);

        let op = Operator::new(builder)
            .with_context(|| format!("Failed to configure S3 operator for bucket {}", bucket))?
            .finish();

        operators.insert(bucket.to_string(), op.clone());
        Ok(op)
    }
}

/// Turn a configured server value into an endpoint URL.
pub fn endpoint_url(server: &str) -> String {
    let server = server.trim().trim_end_matches('/');
    if server.contains("://") {
        server.to_string()
    } else {
        format!("https://{}", server)
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn bucket_exists(&self, bucket: &str) -> Result<bool> {
        let op = self.operator(bucket)?;

        // A one-entry listing of the bucket root; S3 answers NoSuchBucket
        // with a 404, which OpenDAL maps to NotFound.
        let mut lister = match op.lister_with("/").limit(1).await {
            Ok(lister) => lister,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e).context("Failed to check S3 bucket"),
        };

        match lister.next().await {
            Some(Err(e)) if e.kind() == ErrorKind::NotFound => Ok(false),
            Some(Err(e)) => Err(e).context("Failed to check S3 bucket"),
            _ => Ok(true),
        }
    }

    async fn stat(&self, bucket: &str, key: &str) -> Result<Option<ObjectMetadata>> {
        let op = self.operator(bucket)?;

        match op.stat(key).await {
            Ok(meta) => Ok(Some(ObjectMetadata::from_user_metadata(
                meta.content_length(),
                meta.user_metadata(),
            ))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).context("Failed to stat S3 object"),
        }
    }

    async fn put(
        &self,
        bucket: &str,
        key: &str,
        data: Vec<u8>,
        metadata: HashMap<String, String>,
    ) -> Result<()> {
        let op = self.operator(bucket)?;

        op.write_with(key, data)
            .user_metadata(metadata)
            .await
            .context("Failed to upload to S3")?;

        Ok(())
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        let op = self.operator(bucket)?;
        let content = op.read(key).await.context("Failed to download from S3")?;
        Ok(content.to_vec())
    }

    async fn list(&self, bucket: &str, prefix: &str) -> Result<ObjectStream> {
        let op = self.operator(bucket)?;

        let lister = op
            .lister_with(prefix)
            .recursive(true)
            .await
            .context("Failed to list S3 prefix")?;

        let stream = lister
            .try_filter(|entry| futures::future::ready(!entry.metadata().mode().is_dir()))
            .map(|entry| -> Result<ObjectSummary> {
                let entry = entry.context("Failed to list S3 prefix")?;
                Ok(ObjectSummary {
                    key: entry.path().trim_start_matches('/').to_string(),
                    size: entry.metadata().content_length(),
                })
            });

        Ok(stream.boxed())
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<()> {
        let op = self.operator(bucket)?;
        op.delete(key).await.context("Failed to delete S3 object")?;
        Ok(())
    }

    fn display_path(&self, bucket: &str, key: &str) -> String {
        format!("s3://{}/{}", bucket, key.trim_start_matches('/'))
    }
}
