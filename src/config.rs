//! Command line / environment configuration for the cache action.
//!
//! Every setting can come from a flag or from the `INPUT_*` variable a CI
//! runner exports for the action. Validation happens before any I/O.

use clap::Parser;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::fs::local::{normalize_prefix, resolve_path};
use crate::sync::{RetryPolicy, SyncOptions, DEFAULT_WORKERS};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required setting {name} (set --{flag} or {env})")]
    Missing {
        name: &'static str,
        flag: &'static str,
        env: &'static str,
    },

    #[error("invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

#[derive(Parser, Debug, Clone, Default)]
#[command(name = "dircache")]
#[command(about = "Cache a directory in an S3-compatible bucket, or restore it")]
pub struct Args {
    /// Object store server (host[:port] or URL)
    #[arg(long, env = "INPUT_SERVER")]
    pub server: Option<String>,

    /// Access key
    #[arg(long, env = "INPUT_SERVER_ACCESS_KEY", hide_env_values = true)]
    pub access_key: Option<String>,

    /// Secret key
    #[arg(long, env = "INPUT_SERVER_SECRET_KEY", hide_env_values = true)]
    pub secret_key: Option<String>,

    /// Bucket name
    #[arg(long, env = "INPUT_SERVER_BUCKET")]
    pub bucket: Option<String>,

    /// Cache identifier, used as the remote prefix
    #[arg(long, env = "INPUT_ID")]
    pub id: Option<String>,

    /// Local directory, relative to the working directory
    #[arg(long, env = "INPUT_PATH")]
    pub path: Option<String>,

    /// Delete remote files that no longer exist locally ("true" to enable)
    #[arg(long, env = "INPUT_CLEAR_EXISTING", default_value = "false")]
    pub clear_existing: String,

    /// cache (upload) or restore (download)
    #[arg(long, env = "INPUT_ACTION", default_value = "cache")]
    pub action: String,

    /// Signing region for the S3 API
    #[arg(long, env = "INPUT_REGION", default_value = "us-east-1")]
    pub region: String,

    /// Number of parallel transfers
    #[arg(long, env = "INPUT_WORKERS", default_value_t = DEFAULT_WORKERS)]
    pub workers: usize,

    /// Per-request timeout in seconds (0 = no timeout)
    #[arg(long, env = "INPUT_CALL_TIMEOUT", default_value_t = 0)]
    pub call_timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Cache,
    Restore,
    Unknown(String),
}

impl Action {
    pub fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "cache" => Action::Cache,
            "restore" => Action::Restore,
            _ => Action::Unknown(value.to_string()),
        }
    }
}

/// Validated settings for one invocation.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub server: String,
    pub region: String,
    pub access_key: String,
    pub secret_key: String,
    pub bucket: String,
    pub id: String,
    pub path: PathBuf,
    pub action: Action,
    pub options: SyncOptions,
}

fn required(
    value: Option<String>,
    name: &'static str,
    flag: &'static str,
    env: &'static str,
) -> Result<String, ConfigError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ConfigError::Missing { name, flag, env }),
    }
}

impl CacheConfig {
    /// Validate parsed arguments. Relative paths resolve against `cwd`.
    pub fn from_args(args: Args, cwd: &Path) -> Result<Self, ConfigError> {
        let server = required(args.server, "server", "server", "INPUT_SERVER")?;
        let access_key = required(
            args.access_key,
            "access key",
            "access-key",
            "INPUT_SERVER_ACCESS_KEY",
        )?;
        let secret_key = required(
            args.secret_key,
            "secret key",
            "secret-key",
            "INPUT_SERVER_SECRET_KEY",
        )?;
        let bucket = required(args.bucket, "bucket", "bucket", "INPUT_SERVER_BUCKET")?;
        let id = required(args.id, "cache id", "id", "INPUT_ID")?;
        let path = required(args.path, "path", "path", "INPUT_PATH")?;

        // An id of only separators would make the prefix cover the whole bucket.
        if normalize_prefix(&id).is_empty() {
            return Err(ConfigError::Invalid {
                name: "cache id",
                reason: format!("{:?} does not name a prefix", id),
            });
        }

        if args.workers == 0 {
            return Err(ConfigError::Invalid {
                name: "workers",
                reason: "must be at least 1".to_string(),
            });
        }

        let mut retry = RetryPolicy::default();
        if args.call_timeout_secs > 0 {
            retry = retry.with_call_timeout(Duration::from_secs(args.call_timeout_secs));
        }

        Ok(Self {
            server,
            region: args.region,
            access_key,
            secret_key,
            bucket,
            id,
            path: resolve_path(Path::new(&path), cwd),
            action: Action::parse(&args.action),
            options: SyncOptions {
                workers: args.workers,
                retry,
                clear_existing: args.clear_existing.trim().eq_ignore_ascii_case("true"),
                ..SyncOptions::default()
            },
        })
    }
}
