//! Deterministic directory traversal.
//!
//! Entries are yielded depth-first in pre-order, siblings sorted by file
//! name, symlinks never followed. Trees deeper than the configured cap are
//! rejected instead of silently truncated.

use super::metadata::EntryKind;
use crate::utils::errors::{Result, VaultError};
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

/// Options for directory walking
#[derive(Debug, Clone)]
pub struct WalkOptions {
    /// Deepest level allowed below the root (direct children are depth 1)
    pub max_depth: usize,
}

impl Default for WalkOptions {
    fn default() -> Self {
        Self {
            max_depth: crate::config::DEFAULT_MAX_DEPTH,
        }
    }
}

/// Information about an entry discovered during walking
#[derive(Debug, Clone)]
pub struct FileInfo {
    /// Full path to the entry
    pub path: PathBuf,

    /// Relative path from the root
    pub relative_path: PathBuf,

    pub kind: EntryKind,

    /// Depth from root
    pub depth: usize,
}

impl FileInfo {
    fn from_entry(entry: &DirEntry, root: &Path) -> Self {
        let path = entry.path().to_path_buf();
        let relative_path = path.strip_prefix(root).unwrap_or(&path).to_path_buf();

        Self {
            path,
            relative_path,
            kind: EntryKind::from_file_type(entry.file_type()),
            depth: entry.depth(),
        }
    }

    /// Relative path with `/` separators, as recorded in fingerprints.
    pub fn relative_str(&self) -> String {
        self.relative_path
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    }
}

/// Walk a directory tree and collect every entry below the root.
pub fn walk_directory(root: &Path, options: &WalkOptions) -> Result<Vec<FileInfo>> {
    let mut entries = Vec::new();
    walk_directory_with_callback(root, options, |info| {
        entries.push(info.clone());
        Ok(())
    })?;
    Ok(entries)
}

/// Walk a directory tree with a callback for each entry.
///
/// The root itself is not reported. The callback may abort the walk by
/// returning an error.
pub fn walk_directory_with_callback<F>(root: &Path, options: &WalkOptions, mut callback: F) -> Result<()>
where
    F: FnMut(&FileInfo) -> Result<()>,
{
    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .min_depth(1)
        .max_depth(options.max_depth + 1);

    for entry in walker {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(root).to_path_buf();
            VaultError::Filesystem {
                path,
                source: e.into(),
            }
        })?;

        if entry.depth() > options.max_depth {
            return Err(VaultError::Filesystem {
                path: entry.path().to_path_buf(),
                source: std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!("directory tree is deeper than {} levels", options.max_depth),
                ),
            });
        }

        callback(&FileInfo::from_entry(&entry, root))?;
    }

    Ok(())
}
