// Local tree enumeration and local/remote path mapping
// Remote keys always use forward slashes regardless of the host separator

use anyhow::{bail, Context, Result};
use jwalk::WalkDir;
use std::path::{Component, Path, PathBuf};

use crate::fs::types::{LocalFile, LocalTree, RejectedFile};

pub struct LocalFs;

impl LocalFs {
    /// Snapshot every regular file under `root`.
    ///
    /// Symlinks are not descended into, but a symlink that resolves to a
    /// file is included. Files whose names are not valid UTF-8 cannot be
    /// mapped to a key and are returned in `rejected`.
    pub fn enumerate(root: &Path) -> Result<LocalTree> {
        let root_meta = std::fs::metadata(root)
            .with_context(|| format!("Failed to read directory: {}", root.display()))?;
        if !root_meta.is_dir() {
            bail!("{} is not a directory", root.display());
        }

        let mut tree = LocalTree::default();

        let walk = WalkDir::new(root).follow_links(false).sort(true).skip_hidden(false);

        for entry in walk {
            let entry =
                entry.with_context(|| format!("Failed to read directory: {}", root.display()))?;
            let file_type = entry.file_type();
            let path = entry.path();

            let is_file = file_type.is_file() || (file_type.is_symlink() && path.is_file());
            if !is_file {
                continue;
            }

            let relative = path.strip_prefix(root).with_context(|| {
                format!("{} is not under {}", path.display(), root.display())
            })?;

            let relative_path = match relative_key(relative) {
                Some(key) => key,
                None => {
                    tree.rejected.push(RejectedFile {
                        path: path.clone(),
                        reason: "file name is not valid UTF-8".to_string(),
                    });
                    continue;
                }
            };

            // `\` is a separator on Windows hosts; such a key could not be restored.
            if relative_path.contains('\\') {
                tree.rejected.push(RejectedFile {
                    path: path.clone(),
                    reason: "file name contains a backslash".to_string(),
                });
                continue;
            }

            let size = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
            tree.files.push(LocalFile {
                absolute_path: path.clone(),
                relative_path,
                size,
            });
        }

        Ok(tree)
    }

    /// [`LocalFs::enumerate`] on the blocking pool.
    pub async fn enumerate_async(root: &Path) -> Result<LocalTree> {
        let root = root.to_path_buf();
        tokio::task::spawn_blocking(move || Self::enumerate(&root))
            .await
            .context("Enumeration task failed")?
    }

    pub fn create_dir(path: &Path) -> Result<()> {
        std::fs::create_dir_all(path)
            .with_context(|| format!("Failed to create directory: {}", path.display()))?;
        Ok(())
    }
}

/// Join the normal components of a relative path with `/`.
pub fn relative_key(relative: &Path) -> Option<String> {
    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_str()?),
            Component::CurDir => continue,
            _ => return None,
        }
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

/// Normalize a cache identifier into a remote prefix.
///
/// Backslashes become `/`, leading slashes are dropped and the result always
/// ends in exactly one `/`, so the prefix never matches a sibling cache
/// (`app` vs `app-old`).
pub fn normalize_prefix(id: &str) -> String {
    let normalized = id.replace('\\', "/");
    let trimmed = normalized.trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{}/", trimmed)
    }
}

/// Map a remote key back to a path under `root`.
///
/// Keys that do not start with `prefix`, that name the prefix itself, or
/// whose remainder contains empty, `.` or `..` segments are rejected so a
/// listing can never write outside the local root.
pub fn local_path_for_key(root: &Path, prefix: &str, key: &str) -> Option<PathBuf> {
    let relative = key.strip_prefix(prefix)?;
    if relative.is_empty() {
        return None;
    }

    let mut path = root.to_path_buf();
    for segment in relative.split('/') {
        if segment.is_empty() || segment == "." || segment == ".." || segment.contains('\\') {
            return None;
        }
        path.push(segment);
    }
    Some(path)
}

/// Resolve a path that may be relative or absolute
/// If relative, resolves against the provided base directory
pub fn resolve_path(path: &Path, base_dir: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    }
}
