use anyhow::Result;
use std::sync::Arc;

use crate::config::{Action, CacheConfig};
use crate::fs::{ObjectStore, S3Store};
use crate::sync::{StoreClient, SyncReport, SyncSession};

/// One invocation of the cache action.
pub struct App {
    pub config: CacheConfig,
    pub store: Arc<dyn ObjectStore>,
}

impl App {
    /// Build an app backed by the configured S3-compatible server.
    pub fn new(config: CacheConfig) -> Self {
        let store: Arc<dyn ObjectStore> = Arc::new(S3Store::new(
            &config.server,
            &config.region,
            &config.access_key,
            &config.secret_key,
        ));
        Self::with_store(config, store)
    }

    /// Build an app against any store implementation.
    pub fn with_store(config: CacheConfig, store: Arc<dyn ObjectStore>) -> Self {
        Self { config, store }
    }

    fn session(&self) -> SyncSession {
        let client = Arc::new(StoreClient::new(
            self.store.clone(),
            self.config.options.retry,
        ));
        SyncSession::new(
            client,
            &self.config.bucket,
            &self.config.id,
            self.config.options.clone(),
        )
    }

    /// Run the configured action. An unknown action is logged and ignored.
    pub async fn run(&self) -> Result<Option<SyncReport>> {
        let report = match &self.config.action {
            Action::Cache => self.session().upload(&self.config.path).await?,
            Action::Restore => self.session().download(&self.config.path).await?,
            Action::Unknown(action) => {
                tracing::warn!("Unknown action: {}", action);
                return Ok(None);
            }
        };

        tracing::info!(
            "{:?}: {} uploaded, {} downloaded, {} skipped, {} deleted, {} failed",
            report.status,
            report.uploaded,
            report.downloaded,
            report.skipped,
            report.deleted,
            report.failed + report.delete_failed
        );
        Ok(Some(report))
    }
}
