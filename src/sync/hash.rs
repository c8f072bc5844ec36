//! Content fingerprints for skip-if-unchanged decisions.
//!
//! A fingerprint is the SHA-256 of a file's full contents plus its length.
//! Files are read in one piece; the bytes are handed back to the caller so
//! an upload does not read the file a second time.

use sha2::{Digest, Sha256};
use std::io;
use std::path::Path;

use crate::fs::ObjectMetadata;

/// A computed content identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    /// Lowercase hex SHA-256.
    pub hash: String,
    /// Length in bytes.
    pub size: u64,
}

impl Fingerprint {
    /// Fingerprint an in-memory buffer.
    pub fn of_bytes(data: &[u8]) -> Self {
        Self {
            hash: hash_bytes(data),
            size: data.len() as u64,
        }
    }

    /// Whether a remote object is known to hold exactly this content.
    ///
    /// Missing hash metadata never matches.
    pub fn matches(&self, remote: &ObjectMetadata) -> bool {
        remote.size == self.size
            && remote
                .content_hash
                .as_deref()
                .is_some_and(|h| h.eq_ignore_ascii_case(&self.hash))
    }
}

/// Hex SHA-256 of a buffer.
pub fn hash_bytes(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Read a file and fingerprint it.
pub fn hash_file(path: &Path) -> io::Result<(Fingerprint, Vec<u8>)> {
    let data = std::fs::read(path)?;
    let fingerprint = Fingerprint::of_bytes(&data);
    Ok((fingerprint, data))
}

/// Read and fingerprint a file on the blocking pool.
pub async fn hash_file_async(path: &Path) -> io::Result<(Fingerprint, Vec<u8>)> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || hash_file(&path))
        .await
        .map_err(io::Error::other)?
}
