use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Why a single file transfer did not succeed.
///
/// A `TransferError` is always local to one item; the session records it
/// and carries on with the rest.
#[derive(Error, Debug)]
pub enum TransferError {
    #[error("failed to read {path}: {source}")]
    Fingerprint {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{operation} {key} failed after {attempts} attempts: {last}")]
    Exhausted {
        operation: &'static str,
        key: String,
        attempts: u32,
        last: String,
    },

    #[error("failed to write {path}: {source}")]
    LocalWrite {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot map {key}: {reason}")]
    InvalidKey { key: String, reason: String },

    #[error("transfer worker stopped: {0}")]
    Worker(String),
}
