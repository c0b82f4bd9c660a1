//! Custom error types for the SSH vault.

use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum VaultError {
    #[error("Missing prerequisite: {0}")]
    PrerequisiteMissing(String),

    #[error("Passphrase must be at least {min} characters (set SSH_VAULT_PASSPHRASE)")]
    WeakPassphrase { min: usize },

    #[error("{0}")]
    SourceMissing(String),

    #[error("Encrypted SSH backup is malformed or truncated: {0}")]
    MalformedArchive(String),

    #[error("Encrypted SSH backup format is unsupported")]
    UnsupportedFormat,

    #[error("Failed to decrypt and authenticate SSH backup; check the passphrase and backup integrity")]
    AuthenticationFailure,

    #[error("Archive extraction failed: {0}")]
    ExtractionFailure(String),

    #[error("Filesystem error at {}: {source}", path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, VaultError>;

/// Attach the offending path to an I/O failure.
pub trait IoResultExt<T> {
    fn at(self, path: &Path) -> Result<T>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn at(self, path: &Path) -> Result<T> {
        self.map_err(|source| VaultError::Filesystem {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filesystem_error_names_path() {
        let err: Result<()> = Err(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"))
            .at(Path::new("/tmp/missing"));
        let msg = err.unwrap_err().to_string();
        assert!(msg.contains("/tmp/missing"));
        assert!(msg.contains("gone"));
    }

    #[test]
    fn test_authentication_failure_message_is_generic() {
        let msg = VaultError::AuthenticationFailure.to_string();
        assert!(msg.contains("passphrase"));
    }
}
