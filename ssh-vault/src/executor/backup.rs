//! Backup orchestrator: fingerprint, and only when the source changed,
//! pack, encrypt and write the blob plus its metadata sidecar.

use super::manifest::BackupMetadata;
use super::swap::{read_journal, SwapJournal};
use crate::archive::pack_directory;
use crate::config::{Config, Passphrase};
use crate::crypto;
use crate::fingerprint::{compute_snapshot, SourceSnapshot};
use crate::fs::atomic::write_atomic;
use crate::fs::metadata::sha256_file;
use crate::utils::errors::{IoResultExt, Result, VaultError};
use sha2::{Digest, Sha256};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::info;

/// Result of a backup run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackupOutcome {
    /// The recorded fingerprint matches; nothing was written
    Unchanged { snapshot: SourceSnapshot },

    /// A new blob and sidecar were written
    Created {
        snapshot: SourceSnapshot,
        backup_file: PathBuf,
        metadata_file: PathBuf,
        duration_ms: u128,
    },
}

/// Read-only view of the vault for `ssh-vault status`
#[derive(Debug, Clone)]
pub struct BackupStatus {
    /// `None` when the credential directory does not exist
    pub snapshot: Option<SourceSnapshot>,
    pub metadata: Option<BackupMetadata>,
    pub blob_present: bool,
    /// `None` when there is no blob or no sidecar to compare against
    pub blob_sha256_matches: Option<bool>,
    pub up_to_date: bool,
    pub interrupted_swap: Option<SwapJournal>,
}

pub struct BackupExecutor<'a> {
    config: &'a Config,
    passphrase: &'a Passphrase,
}

impl<'a> BackupExecutor<'a> {
    pub fn new(config: &'a Config, passphrase: &'a Passphrase) -> Self {
        Self { config, passphrase }
    }

    /// Execute a backup run
    pub fn execute(&self) -> Result<BackupOutcome> {
        let started = Instant::now();
        let paths = &self.config.paths;

        info!("Checking SSH backup prerequisites");
        self.check_prereqs()?;

        info!("Fingerprinting {}", paths.ssh_dir.display());
        let snapshot = compute_snapshot(&paths.ssh_dir, &self.config.walk_options())?;

        if is_current(&paths.backup_file, &paths.metadata_file, &snapshot) {
            info!("SSH backup unchanged ({} files)", snapshot.file_count);
            return Ok(BackupOutcome::Unchanged { snapshot });
        }

        info!("Creating encrypted SSH archive");
        let archive = pack_directory(&paths.ssh_dir, &self.config.walk_options())?;
        let blob = crypto::encrypt(&archive, self.passphrase, self.config.crypto.kdf_iterations)?;
        drop(archive);

        write_atomic(&paths.backup_file, &blob, 0o600)?;

        info!("Writing backup metadata");
        let blob_sha256 = hex::encode(Sha256::digest(&blob));
        BackupMetadata::new(self.config, &snapshot, blob_sha256).write(&paths.metadata_file)?;

        let duration_ms = started.elapsed().as_millis();
        info!(
            "SSH backup complete: {} files, {} bytes in {}ms",
            snapshot.file_count, snapshot.total_bytes, duration_ms
        );

        Ok(BackupOutcome::Created {
            snapshot,
            backup_file: paths.backup_file.clone(),
            metadata_file: paths.metadata_file.clone(),
            duration_ms,
        })
    }

    fn check_prereqs(&self) -> Result<()> {
        let ssh_dir = &self.config.paths.ssh_dir;
        match std::fs::metadata(ssh_dir) {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => {
                return Err(VaultError::SourceMissing(format!(
                    "{} is not a directory",
                    ssh_dir.display()
                )))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(VaultError::SourceMissing(format!(
                    "SSH directory not found: {}",
                    ssh_dir.display()
                )))
            }
            Err(e) => return Err(e).at(ssh_dir),
        }
        self.passphrase.validate()
    }
}

/// The blob exists and the sidecar records this exact fingerprint.
fn is_current(backup_file: &Path, metadata_file: &Path, snapshot: &SourceSnapshot) -> bool {
    if !backup_file.is_file() {
        return false;
    }
    BackupMetadata::read(metadata_file)
        .map(|m| m.source_fingerprint == snapshot.fingerprint)
        .unwrap_or(false)
}

/// Inspect the vault without writing anything.
pub fn status(config: &Config) -> Result<BackupStatus> {
    let paths = &config.paths;

    let snapshot = if paths.ssh_dir.is_dir() {
        Some(compute_snapshot(&paths.ssh_dir, &config.walk_options())?)
    } else {
        None
    };
    let metadata = BackupMetadata::read(&paths.metadata_file);
    let blob_present = paths.backup_file.is_file();

    let blob_sha256_matches = match (&metadata, blob_present) {
        (Some(meta), true) => {
            let actual = sha256_file(&paths.backup_file).at(&paths.backup_file)?;
            Some(actual == meta.encrypted_backup_sha256)
        }
        _ => None,
    };

    let up_to_date = match &snapshot {
        Some(snapshot) => is_current(&paths.backup_file, &paths.metadata_file, snapshot),
        None => false,
    };

    Ok(BackupStatus {
        snapshot,
        metadata,
        blob_present,
        blob_sha256_matches,
        up_to_date,
        interrupted_swap: read_journal(&paths.ssh_dir)?,
    })
}
