//! Atomic file replacement.
//!
//! Content is written to a temporary file in the destination directory and
//! renamed over the target, so readers only ever see the old or the new
//! bytes. The temporary file is removed on every failure path.

use crate::utils::errors::{IoResultExt, Result, VaultError};
use std::fs;
use std::io::Write;
use std::path::Path;

/// Atomically replace `path` with `bytes`, leaving it with permission bits `mode`.
pub fn write_atomic(path: &Path, bytes: &[u8], mode: u32) -> Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).at(parent)?;

    let mut temp = tempfile::Builder::new()
        .prefix(".ssh-vault-")
        .suffix(".tmp")
        .tempfile_in(parent)
        .at(parent)?;

    temp.write_all(bytes).at(temp.path())?;
    temp.as_file().sync_all().at(temp.path())?;
    super::metadata::set_mode(temp.path(), mode)?;

    temp.persist(path).map_err(|e| VaultError::Filesystem {
        path: path.to_path_buf(),
        source: e.error,
    })?;

    tracing::debug!("Atomically wrote {} ({} bytes)", path.display(), bytes.len());
    Ok(())
}
