//! Per-entry metadata used for fingerprinting and permission normalization.

use crate::utils::errors::{IoResultExt, Result};
use sha2::{Digest, Sha256};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Kind of a directory entry, as seen without following symlinks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Dir,
    Symlink,
    /// Sockets, FIFOs and device nodes
    Other,
}

impl EntryKind {
    pub fn from_file_type(file_type: fs::FileType) -> Self {
        if file_type.is_symlink() {
            EntryKind::Symlink
        } else if file_type.is_dir() {
            EntryKind::Dir
        } else if file_type.is_file() {
            EntryKind::File
        } else {
            EntryKind::Other
        }
    }
}

/// Everything about one entry that contributes to the source fingerprint.
///
/// Modification time is deliberately absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    /// Relative path with `/` separators
    pub path: String,

    pub kind: EntryKind,

    /// Permission bits (`mode & 0o777`)
    pub mode: u32,

    /// Size in bytes (files only)
    pub size: u64,

    /// Hex SHA-256 of the content (files only)
    pub sha256: Option<String>,

    /// Raw link target (symlinks only)
    pub link_target: Option<PathBuf>,
}

impl FileRecord {
    /// Extract a record from `full_path` without following symlinks.
    pub fn from_path(full_path: &Path, relative: String) -> Result<Self> {
        let metadata = fs::symlink_metadata(full_path).at(full_path)?;
        let kind = EntryKind::from_file_type(metadata.file_type());

        let (size, sha256, link_target) = match kind {
            EntryKind::File => (
                metadata.len(),
                Some(sha256_file(full_path).at(full_path)?),
                None,
            ),
            EntryKind::Symlink => (0, None, Some(fs::read_link(full_path).at(full_path)?)),
            EntryKind::Dir | EntryKind::Other => (0, None, None),
        };

        Ok(Self {
            path: relative,
            kind,
            mode: permission_bits(&metadata),
            size,
            sha256,
            link_target,
        })
    }

    /// One descriptor line of the fingerprint input.
    pub fn descriptor(&self) -> String {
        let mode = format!("{:03o}", self.mode);
        match self.kind {
            EntryKind::Dir => format!("dir {} mode={}", self.path, mode),
            EntryKind::File => format!(
                "file {} mode={} size={} sha256={}",
                self.path,
                mode,
                self.size,
                self.sha256.as_deref().unwrap_or_default()
            ),
            EntryKind::Symlink => format!(
                "symlink {} mode={} -> {}",
                self.path,
                mode,
                self.link_target
                    .as_deref()
                    .map(|t| t.to_string_lossy())
                    .unwrap_or_default()
            ),
            EntryKind::Other => format!("other {} mode={}", self.path, mode),
        }
    }
}

/// Hex SHA-256 of a file's content, streamed.
pub fn sha256_file(path: &Path) -> io::Result<String> {
    let mut file = fs::File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(unix)]
pub fn permission_bits(metadata: &fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o777
}

#[cfg(not(unix))]
pub fn permission_bits(metadata: &fs::Metadata) -> u32 {
    if metadata.permissions().readonly() {
        0o444
    } else {
        0o644
    }
}

/// Set permission bits on a path (follows symlinks; callers skip them).
#[cfg(unix)]
pub fn set_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode)).at(path)
}

#[cfg(not(unix))]
pub fn set_mode(_path: &Path, _mode: u32) -> Result<()> {
    // On non-Unix platforms permission bits are not representable
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    #[test]
    fn test_file_record() -> Result<()> {
        let mut temp_file = NamedTempFile::new()?;
        temp_file.write_all(b"test content")?;
        temp_file.flush()?;

        let record = FileRecord::from_path(temp_file.path(), "f".to_string())?;

        assert_eq!(record.kind, EntryKind::File);
        assert_eq!(record.size, 12);
        assert_eq!(
            record.sha256.as_deref(),
            Some("6ae8a75555209fd6c44157c0aed8016e763ff435a19cf186f76863140143ff72")
        );
        assert!(record.link_target.is_none());
        Ok(())
    }

    #[test]
    #[cfg(unix)]
    fn test_descriptor_lines() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let key = temp_dir.path().join("id_ed25519");
        fs::write(&key, b"KEY-A")?;
        set_mode(&key, 0o600)?;
        fs::create_dir(temp_dir.path().join("sub"))?;
        set_mode(&temp_dir.path().join("sub"), 0o700)?;
        std::os::unix::fs::symlink("id_ed25519", temp_dir.path().join("alias"))?;

        let file = FileRecord::from_path(&key, "id_ed25519".into())?;
        assert!(file
            .descriptor()
            .starts_with("file id_ed25519 mode=600 size=5 sha256="));

        let dir = FileRecord::from_path(&temp_dir.path().join("sub"), "sub".into())?;
        assert_eq!(dir.descriptor(), "dir sub mode=700");

        let link = FileRecord::from_path(&temp_dir.path().join("alias"), "alias".into())?;
        assert_eq!(link.kind, EntryKind::Symlink);
        assert!(link.descriptor().ends_with("-> id_ed25519"));
        Ok(())
    }

    #[test]
    #[cfg(unix)]
    fn test_set_mode() -> Result<()> {
        let temp_file = NamedTempFile::new()?;
        set_mode(temp_file.path(), 0o644)?;

        let metadata = fs::metadata(temp_file.path())?;
        assert_eq!(permission_bits(&metadata), 0o644);
        Ok(())
    }
}
