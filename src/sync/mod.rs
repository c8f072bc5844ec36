//! Directory ⇄ object store synchronization.
//!
//! Fingerprinting, a retrying store client, a bounded transfer pool and the
//! session that ties them together.

pub mod client;
pub mod engine;
pub mod error;
pub mod hash;
pub mod scheduler;
pub mod throttle;

pub use client::{RetryPolicy, StoreClient};
pub use engine::{Direction, PhaseProgress, SessionStatus, SyncOptions, SyncPhase, SyncReport, SyncSession};
pub use error::TransferError;
pub use hash::{hash_bytes, hash_file, hash_file_async, Fingerprint};
pub use scheduler::{OutcomeCounts, TransferOutcome, TransferScheduler, DEFAULT_WORKERS};
pub use throttle::{ProgressCallback, ProgressThrottle, DEFAULT_PROGRESS_INTERVAL};
