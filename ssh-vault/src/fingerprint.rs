//! Content fingerprint of a credential directory.
//!
//! The fingerprint covers relative paths, permission bits, symlink targets
//! and file content. Timestamps are not part of it, so touching a file does
//! not make an existing backup stale.

use crate::fs::metadata::{EntryKind, FileRecord};
use crate::fs::walker::{walk_directory_with_callback, WalkOptions};
use crate::utils::errors::Result;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Summary of a source tree, computed fresh on every run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSnapshot {
    /// Hex SHA-256 over the newline-joined descriptor lines
    pub fingerprint: String,

    /// Files and symlinks (directories excluded)
    pub file_count: u64,

    /// Sum of regular file sizes
    pub total_bytes: u64,
}

/// Fingerprint every entry below `root`.
pub fn compute_snapshot(root: &Path, options: &WalkOptions) -> Result<SourceSnapshot> {
    let mut lines = Vec::new();
    let mut file_count = 0u64;
    let mut total_bytes = 0u64;

    walk_directory_with_callback(root, options, |info| {
        let record = FileRecord::from_path(&info.path, info.relative_str())?;

        match record.kind {
            EntryKind::File => {
                file_count += 1;
                total_bytes += record.size;
            }
            EntryKind::Symlink => file_count += 1,
            EntryKind::Dir | EntryKind::Other => {}
        }

        lines.push(record.descriptor());
        Ok(())
    })?;

    let fingerprint = hex::encode(Sha256::digest(lines.join("\n").as_bytes()));

    tracing::debug!(
        "Fingerprinted {}: {} files, {} bytes",
        root.display(),
        file_count,
        total_bytes
    );

    Ok(SourceSnapshot {
        fingerprint,
        file_count,
        total_bytes,
    })
}
