//! Tar codec for the credential directory.
//!
//! Every archive holds a single top-level directory named [`ARCHIVE_ROOT`],
//! the same layout `tar -C $HOME -cf - .ssh` produces, so archives written by
//! older tooling unpack the same way.

use crate::fs::metadata::EntryKind;
use crate::fs::walker::{walk_directory_with_callback, WalkOptions};
use crate::utils::errors::{IoResultExt, Result, VaultError};
use std::path::{Path, PathBuf};
use tar::{Archive, Builder};
use zeroize::Zeroizing;

/// Name of the top-level entry inside every archive.
pub const ARCHIVE_ROOT: &str = ".ssh";

const BLOCK_SIZE: usize = 512;

/// Pack `root` into an in-memory tar stream, preserving modes and symlink targets.
///
/// Sockets, FIFOs and device nodes are skipped.
pub fn pack_directory(root: &Path, options: &WalkOptions) -> Result<Zeroizing<Vec<u8>>> {
    let mut builder = Builder::new(Vec::new());
    builder.follow_symlinks(false);

    builder.append_dir(ARCHIVE_ROOT, root).at(root)?;

    let mut entries = 0usize;
    walk_directory_with_callback(root, options, |info| {
        let name = Path::new(ARCHIVE_ROOT).join(&info.relative_path);
        match info.kind {
            EntryKind::Dir => builder.append_dir(&name, &info.path).at(&info.path)?,
            EntryKind::File | EntryKind::Symlink => {
                builder.append_path_with_name(&info.path, &name).at(&info.path)?
            }
            EntryKind::Other => {
                tracing::debug!("Skipping special file {}", info.path.display());
                return Ok(());
            }
        }
        entries += 1;
        Ok(())
    })?;

    let bytes = builder.into_inner().at(root)?;
    tracing::debug!("Packed {} entries ({} bytes)", entries, bytes.len());
    Ok(Zeroizing::new(bytes))
}

/// Unpack a tar stream under `dest` and return the path of the top-level directory.
pub fn unpack_archive(bytes: &[u8], dest: &Path) -> Result<PathBuf> {
    check_complete(bytes)?;

    let mut archive = Archive::new(bytes);
    archive.set_preserve_permissions(true);
    archive.set_preserve_mtime(true);
    archive.set_overwrite(true);
    archive
        .unpack(dest)
        .map_err(|e| VaultError::ExtractionFailure(e.to_string()))?;

    let top = dest.join(ARCHIVE_ROOT);
    match std::fs::symlink_metadata(&top) {
        Ok(meta) if meta.is_dir() => Ok(top),
        _ => Err(VaultError::ExtractionFailure(format!(
            "decrypted archive does not contain a {} directory",
            ARCHIVE_ROOT
        ))),
    }
}

/// A complete tar stream is block-aligned and ends with two zero blocks.
fn check_complete(bytes: &[u8]) -> Result<()> {
    let end_marker = 2 * BLOCK_SIZE;
    if bytes.len() < end_marker || bytes.len() % BLOCK_SIZE != 0 {
        return Err(VaultError::ExtractionFailure(format!(
            "archive is truncated ({} bytes)",
            bytes.len()
        )));
    }
    if bytes[bytes.len() - end_marker..].iter().any(|&b| b != 0) {
        return Err(VaultError::ExtractionFailure(
            "archive is missing its end-of-archive marker".to_string(),
        ));
    }
    Ok(())
}
