//! Restore orchestrator.
//!
//! The blob is decrypted in memory and unpacked into a staging directory
//! beside the live credential directory. Permissions and the managed host
//! block are fixed up in staging, then the staged tree is swapped in whole.
//! Any failure before the swap leaves the live directory untouched.

use super::manifest::BackupMetadata;
use super::swap::{atomic_swap, recover_interrupted, OsRenamer, Recovery, Renamer, STAGING_PREFIX};
use crate::archive::unpack_archive;
use crate::config::{Config, HostEntry, Passphrase};
use crate::crypto::BlobFormat;
use crate::fs::metadata::{set_mode, EntryKind};
use crate::fs::walker::{walk_directory_with_callback, WalkOptions};
use crate::ssh_config;
use crate::utils::errors::{IoResultExt, Result, VaultError};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const DIR_MODE: u32 = 0o700;
const PRIVATE_MODE: u32 = 0o600;
const PUBLIC_MODE: u32 = 0o644;

/// Restore progress, logged as each stage is entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreState {
    Idle,
    Decrypting,
    Staging,
    Normalizing,
    Merging,
    Swapping,
    Committed,
}

impl fmt::Display for RestoreState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RestoreState::Idle => "Checking SSH restore prerequisites",
            RestoreState::Decrypting => "Decrypting and authenticating SSH archive",
            RestoreState::Staging => "Extracting archive into staging",
            RestoreState::Normalizing => "Normalizing permissions",
            RestoreState::Merging => "Updating managed hosts in SSH config",
            RestoreState::Swapping => "Swapping restored directory into place",
            RestoreState::Committed => "SSH restore complete",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone)]
pub struct RestoreOutcome {
    /// Live directory now holding the restored tree
    pub ssh_dir: PathBuf,

    /// Previous tree, moved aside rather than deleted
    pub aside: Option<PathBuf>,

    /// Format the blob was read in
    pub format: &'static str,

    /// Whether the managed host block had to be rewritten
    pub config_updated: bool,

    /// Result of cleaning up after an earlier interrupted restore
    pub recovered: Option<Recovery>,

    pub hosts: Vec<HostEntry>,
}

/// Main restore executor
pub struct RestoreExecutor<'a> {
    config: &'a Config,
    passphrase: &'a Passphrase,
    renamer: Box<dyn Renamer + 'a>,
}

impl<'a> RestoreExecutor<'a> {
    pub fn new(config: &'a Config, passphrase: &'a Passphrase) -> Self {
        Self::with_renamer(config, passphrase, OsRenamer)
    }

    /// Create a restore executor with a custom rename primitive
    pub fn with_renamer(
        config: &'a Config,
        passphrase: &'a Passphrase,
        renamer: impl Renamer + 'a,
    ) -> Self {
        Self {
            config,
            passphrase,
            renamer: Box::new(renamer),
        }
    }

    /// Execute a restore
    pub fn execute(&self) -> Result<RestoreOutcome> {
        let paths = &self.config.paths;
        let live = paths.ssh_dir.as_path();

        enter(RestoreState::Idle);
        self.check_prereqs()?;
        let recovered = recover_interrupted(live, &*self.renamer)?;
        let parent = live.parent().ok_or_else(|| {
            VaultError::PrerequisiteMissing(format!("{} has no parent directory", live.display()))
        })?;
        std::fs::create_dir_all(parent).at(parent)?;

        enter(RestoreState::Decrypting);
        let blob = std::fs::read(&paths.backup_file).at(&paths.backup_file)?;
        let format = BlobFormat::decode(&blob)?;
        debug!("Detected {} backup format", format.name());
        let iterations = self.kdf_iterations_for(&blob);
        let archive = format.open(self.passphrase, iterations)?;

        enter(RestoreState::Staging);
        let staging = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .tempdir_in(parent)
            .at(parent)?;
        let staged = unpack_archive(&archive, staging.path())?;
        drop(archive);

        enter(RestoreState::Normalizing);
        normalize_permissions(&staged, &self.config.walk_options())?;

        enter(RestoreState::Merging);
        let config_path = staged.join("config");
        let config_updated = ssh_config::apply(&config_path, &self.config.hosts)?;

        enter(RestoreState::Swapping);
        let aside = atomic_swap(&staged, live, &*self.renamer)?;

        enter(RestoreState::Committed);
        // `staging` is dropped here and removes whatever is left of the staging root.
        Ok(RestoreOutcome {
            ssh_dir: live.to_path_buf(),
            aside,
            format: format.name(),
            config_updated,
            recovered,
            hosts: self.config.hosts.clone(),
        })
    }

    /// Iteration count recorded by the sidecar when it describes this exact
    /// blob, else the configured count.
    fn kdf_iterations_for(&self, blob: &[u8]) -> u32 {
        let configured = self.config.crypto.kdf_iterations;
        let Some(metadata) = BackupMetadata::read(&self.config.paths.metadata_file) else {
            return configured;
        };
        if metadata.kdf_iterations == 0
            || metadata.encrypted_backup_sha256 != hex::encode(Sha256::digest(blob))
        {
            return configured;
        }
        if metadata.kdf_iterations != configured {
            info!(
                "Using {} KDF iterations recorded with the backup (configured: {})",
                metadata.kdf_iterations, configured
            );
        }
        metadata.kdf_iterations
    }

    fn check_prereqs(&self) -> Result<()> {
        let backup_file = &self.config.paths.backup_file;
        if !backup_file.is_file() {
            return Err(VaultError::SourceMissing(format!(
                "Encrypted SSH backup not found: {}",
                backup_file.display()
            )));
        }
        self.passphrase.validate()
    }
}

fn enter(state: RestoreState) {
    info!("{}", state);
}

/// Mode a restored entry should end up with, or `None` to leave it alone.
fn target_mode(kind: EntryKind, path: &Path) -> Option<u32> {
    match kind {
        EntryKind::Dir => Some(DIR_MODE),
        EntryKind::File => {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            if name.ends_with(".pub") || name.contains("known_hosts") {
                Some(PUBLIC_MODE)
            } else {
                Some(PRIVATE_MODE)
            }
        }
        EntryKind::Symlink | EntryKind::Other => None,
    }
}

/// Directories 0700, public keys and known_hosts 0644, every other file 0600.
/// Symlinks are skipped so their targets are never touched.
pub fn normalize_permissions(root: &Path, options: &WalkOptions) -> Result<()> {
    set_mode(root, DIR_MODE)?;
    walk_directory_with_callback(root, options, |info| {
        if let Some(mode) = target_mode(info.kind, &info.path) {
            set_mode(&info.path, mode)?;
        }
        Ok(())
    })
}
