use std::path::PathBuf;

/// A file found while enumerating a local root.
///
/// `relative_path` always uses `/` separators and is the join key to the
/// object's remote key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFile {
    pub absolute_path: PathBuf,
    pub relative_path: String,
    /// Size at enumeration time.
    pub size: u64,
}

impl LocalFile {
    /// Remote key for this file under a normalized prefix.
    pub fn remote_key(&self, prefix: &str) -> String {
        format!("{}{}", prefix, self.relative_path)
    }
}

/// A file that could not be turned into a [`LocalFile`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedFile {
    pub path: PathBuf,
    pub reason: String,
}

/// Snapshot of a local tree taken at session start.
#[derive(Debug, Clone, Default)]
pub struct LocalTree {
    pub files: Vec<LocalFile>,
    pub rejected: Vec<RejectedFile>,
}

impl LocalTree {
    pub fn total_bytes(&self) -> u64 {
        self.files.iter().map(|f| f.size).sum()
    }
}
