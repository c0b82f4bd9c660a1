//! Metadata sidecar written next to the encrypted blob.
//!
//! The sidecar records what was backed up and how it was encrypted. Its
//! `sourceFingerprint` is what makes a repeated backup a no-op.

use crate::config::Config;
use crate::crypto::{CIPHER_NAME, KDF_DIGEST, KDF_NAME};
use crate::fingerprint::SourceSnapshot;
use crate::fs::atomic::write_atomic;
use crate::utils::errors::Result;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Backup metadata, serialized as pretty JSON with camelCase keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupMetadata {
    pub created_at: String,
    pub host: String,
    pub source_dir: PathBuf,
    pub encrypted_backup_file: PathBuf,
    pub cipher: String,
    pub kdf: String,
    pub kdf_digest: String,
    pub kdf_iterations: u32,
    pub source_fingerprint: String,
    pub source_file_count: u64,
    pub source_total_bytes: u64,
    pub encrypted_backup_sha256: String,
}

impl BackupMetadata {
    pub fn new(config: &Config, snapshot: &SourceSnapshot, blob_sha256: String) -> Self {
        Self {
            created_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            host: local_hostname(),
            source_dir: config.paths.ssh_dir.clone(),
            encrypted_backup_file: config.paths.backup_file.clone(),
            cipher: CIPHER_NAME.to_string(),
            kdf: KDF_NAME.to_string(),
            kdf_digest: KDF_DIGEST.to_string(),
            kdf_iterations: config.crypto.kdf_iterations,
            source_fingerprint: snapshot.fingerprint.clone(),
            source_file_count: snapshot.file_count,
            source_total_bytes: snapshot.total_bytes,
            encrypted_backup_sha256: blob_sha256,
        }
    }

    /// Read the sidecar. Missing or unparseable files yield `None`, which
    /// simply forces a fresh backup.
    pub fn read(path: &Path) -> Option<Self> {
        let content = std::fs::read_to_string(path).ok()?;
        match serde_json::from_str(&content) {
            Ok(metadata) => Some(metadata),
            Err(e) => {
                tracing::warn!("Ignoring unreadable metadata {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Atomically write the sidecar with owner-only permissions.
    pub fn write(&self, path: &Path) -> Result<()> {
        let mut json = serde_json::to_string_pretty(self)?;
        json.push('\n');
        write_atomic(path, json.as_bytes(), 0o600)
    }
}

fn local_hostname() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string())
}
