//! Directory-level swap of a staged tree into the live path, with rollback.
//!
//! The live directory is renamed aside, then the staged directory is renamed
//! into place. Both are single `rename(2)` calls on the same filesystem, so
//! an observer sees either the old tree or the new one. If the second rename
//! fails, the aside copy is renamed back before the error propagates.
//!
//! A small JSON journal is written before the first rename and removed once
//! the swap is committed or rolled back. If the process dies in between,
//! [`recover_interrupted`] puts the aside copy back on the next run.

use crate::fs::atomic::write_atomic;
use crate::utils::errors::{IoResultExt, Result, VaultError};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

/// Prefix of the staging directory created next to the live directory.
pub const STAGING_PREFIX: &str = ".ssh-vault-staged-";

/// Rename primitive used by the swap. Swappable so tests can inject failures.
pub trait Renamer {
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;
}

/// `std::fs::rename`
#[derive(Debug, Default, Clone, Copy)]
pub struct OsRenamer;

impl Renamer for OsRenamer {
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        std::fs::rename(from, to)
    }
}

/// Persisted record of a swap in progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapJournal {
    pub live: PathBuf,
    pub aside: PathBuf,
    pub staged: PathBuf,
    pub started_at: String,
}

/// What [`recover_interrupted`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recovery {
    /// The aside copy was renamed back into the live path
    RestoredAside(PathBuf),
    /// The live path was intact; only the stale journal was removed
    JournalCleared,
}

/// `<parent>/.<name>.ssh-vault-swap.json`
pub fn journal_path(live: &Path) -> PathBuf {
    let name = live
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "ssh".to_string());
    let file = format!(".{}.ssh-vault-swap.json", name.trim_start_matches('.'));
    match live.parent() {
        Some(parent) => parent.join(file),
        None => PathBuf::from(file),
    }
}

/// A not-yet-existing sibling of `live` stamped with the current UTC time.
fn aside_path(live: &Path) -> PathBuf {
    let stamp = Utc::now().format("%Y%m%dT%H%M%S%.3fZ");
    let base = format!("{}.bak-{}", live.display(), stamp);

    let mut candidate = PathBuf::from(&base);
    let mut counter = 1;
    while std::fs::symlink_metadata(&candidate).is_ok() {
        candidate = PathBuf::from(format!("{base}-{counter}"));
        counter += 1;
    }
    candidate
}

/// Read the swap journal. An unparseable journal is reported and treated as absent.
pub fn read_journal(live: &Path) -> Result<Option<SwapJournal>> {
    let path = journal_path(live);
    let raw = match std::fs::read(&path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e).at(&path),
    };
    match serde_json::from_slice(&raw) {
        Ok(journal) => Ok(Some(journal)),
        Err(e) => {
            warn!("Ignoring unreadable swap journal {}: {}", path.display(), e);
            Ok(None)
        }
    }
}

fn clear_journal(live: &Path) -> Result<()> {
    let path = journal_path(live);
    match std::fs::remove_file(&path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).at(&path),
    }
}

fn is_staging_dir(path: &Path) -> bool {
    path.file_name()
        .map(|n| n.to_string_lossy().starts_with(STAGING_PREFIX))
        .unwrap_or(false)
}

fn exists(path: &Path) -> bool {
    std::fs::symlink_metadata(path).is_ok()
}

/// Replace `live` with `staged`. Returns the aside copy of the previous tree, if any.
pub fn atomic_swap(staged: &Path, live: &Path, renamer: &dyn Renamer) -> Result<Option<PathBuf>> {
    let aside = if exists(live) {
        let aside = aside_path(live);
        let journal = SwapJournal {
            live: live.to_path_buf(),
            aside: aside.clone(),
            staged: staged.to_path_buf(),
            started_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        };
        let mut json = serde_json::to_vec_pretty(&journal)?;
        json.push(b'\n');
        write_atomic(&journal_path(live), &json, 0o600)?;

        if let Err(e) = renamer.rename(live, &aside) {
            clear_journal(live)?;
            return Err(e).at(live);
        }
        info!("Moved previous {} aside to {}", live.display(), aside.display());
        Some(aside)
    } else {
        None
    };

    let err = match renamer.rename(staged, live) {
        Ok(()) => {
            clear_journal(live)?;
            return Ok(aside);
        }
        Err(e) => e,
    };

    if let Some(aside) = &aside {
        if !exists(live) {
            if let Err(rollback_err) = renamer.rename(aside, live) {
                error!(
                    "Rollback failed; previous tree remains at {} (journal kept)",
                    aside.display()
                );
                return Err(VaultError::Filesystem {
                    path: aside.clone(),
                    source: io::Error::new(
                        rollback_err.kind(),
                        format!("swap failed ({err}) and rollback failed ({rollback_err})"),
                    ),
                });
            }
            warn!("Swap failed; rolled back {} from {}", live.display(), aside.display());
        }
        clear_journal(live)?;
    }

    Err(err).at(live)
}

/// Resolve a swap left half-done by a crashed process.
pub fn recover_interrupted(live: &Path, renamer: &dyn Renamer) -> Result<Option<Recovery>> {
    let Some(journal) = read_journal(live)? else {
        // Removes an unreadable journal; a no-op when there is none.
        clear_journal(live)?;
        return Ok(None);
    };

    let recovery = if !exists(live) && exists(&journal.aside) {
        renamer.rename(&journal.aside, live).at(&journal.aside)?;
        warn!(
            "Recovered interrupted restore: moved {} back to {}",
            journal.aside.display(),
            live.display()
        );
        Recovery::RestoredAside(journal.aside.clone())
    } else {
        info!("Clearing stale swap journal for {}", live.display());
        Recovery::JournalCleared
    };

    if let Some(staging_root) = journal.staged.parent().filter(|p| is_staging_dir(p)) {
        // Leftover staging from the crashed run.
        if let Err(e) = std::fs::remove_dir_all(staging_root) {
            warn!("Could not remove stale staging {}: {}", staging_root.display(), e);
        }
    }

    clear_journal(live)?;
    Ok(Some(recovery))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::cell::Cell;
    use std::fs;
    use tempfile::TempDir;

    /// Fails the `fail_on`-th rename call (1-based); every other call is real.
    pub(crate) struct FailingRenamer {
        pub fail_on: usize,
        pub calls: Cell<usize>,
    }

    impl FailingRenamer {
        pub(crate) fn new(fail_on: usize) -> Self {
            Self {
                fail_on,
                calls: Cell::new(0),
            }
        }
    }

    impl Renamer for FailingRenamer {
        fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
            let call = self.calls.get() + 1;
            self.calls.set(call);
            if call == self.fail_on {
                return Err(io::Error::new(io::ErrorKind::Other, "injected rename failure"));
            }
            std::fs::rename(from, to)
        }
    }

    fn setup() -> io::Result<(TempDir, PathBuf, PathBuf)> {
        let home = TempDir::new()?;
        let live = home.path().join(".ssh");
        fs::create_dir(&live)?;
        fs::write(live.join("id_ed25519"), b"OLD")?;

        let staged = home.path().join("stage");
        fs::create_dir(&staged)?;
        fs::write(staged.join("id_ed25519"), b"NEW")?;
        Ok((home, live, staged))
    }

    fn asides(home: &Path) -> Vec<PathBuf> {
        fs::read_dir(home)
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.to_string_lossy().contains(".ssh.bak-"))
            .collect()
    }

    #[test]
    fn test_swap_commits() -> Result<()> {
        let (home, live, staged) = setup()?;

        let aside = atomic_swap(&staged, &live, &OsRenamer)?.expect("aside copy");

        assert_eq!(fs::read(live.join("id_ed25519"))?, b"NEW");
        assert_eq!(fs::read(aside.join("id_ed25519"))?, b"OLD");
        assert!(!staged.exists());
        assert!(!journal_path(&live).exists());
        assert_eq!(asides(home.path()).len(), 1);
        Ok(())
    }

    #[test]
    fn test_swap_without_live_dir() -> Result<()> {
        let (_home, live, staged) = setup()?;
        fs::remove_dir_all(&live)?;

        assert_eq!(atomic_swap(&staged, &live, &OsRenamer)?, None);
        assert_eq!(fs::read(live.join("id_ed25519"))?, b"NEW");
        Ok(())
    }

    #[test]
    fn test_second_rename_failure_rolls_back() -> Result<()> {
        let (home, live, staged) = setup()?;
        let renamer = FailingRenamer::new(2);

        let result = atomic_swap(&staged, &live, &renamer);

        assert!(result.is_err());
        assert_eq!(fs::read(live.join("id_ed25519"))?, b"OLD");
        assert!(asides(home.path()).is_empty());
        assert!(!journal_path(&live).exists());
        assert_eq!(renamer.calls.get(), 3);
        Ok(())
    }

    #[test]
    fn test_first_rename_failure_touches_nothing() -> Result<()> {
        let (_home, live, staged) = setup()?;

        assert!(atomic_swap(&staged, &live, &FailingRenamer::new(1)).is_err());
        assert_eq!(fs::read(live.join("id_ed25519"))?, b"OLD");
        assert!(staged.exists());
        assert!(!journal_path(&live).exists());
        Ok(())
    }

    #[test]
    fn test_failed_rollback_keeps_journal_and_recovers() -> Result<()> {
        let (_home, live, staged) = setup()?;

        // Second rename (staged -> live) and third (rollback) both fail.
        struct Flaky(Cell<usize>);
        impl Renamer for Flaky {
            fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
                self.0.set(self.0.get() + 1);
                if self.0.get() >= 2 {
                    return Err(io::Error::new(io::ErrorKind::Other, "disk gone"));
                }
                std::fs::rename(from, to)
            }
        }

        let err = atomic_swap(&staged, &live, &Flaky(Cell::new(0))).unwrap_err();
        assert!(err.to_string().contains("rollback failed"));
        assert!(!live.exists());

        let journal = read_journal(&live)?.expect("journal kept");
        assert_eq!(journal.live, live);

        let recovery = recover_interrupted(&live, &OsRenamer)?;
        assert_eq!(recovery, Some(Recovery::RestoredAside(journal.aside)));
        assert_eq!(fs::read(live.join("id_ed25519"))?, b"OLD");
        assert!(!journal_path(&live).exists());
        Ok(())
    }

    #[test]
    fn test_recover_after_commit_only_clears_journal() -> Result<()> {
        let (_home, live, staged) = setup()?;
        let aside = atomic_swap(&staged, &live, &OsRenamer)?.unwrap();

        // Simulate a crash after the second rename but before the journal was removed.
        let journal = SwapJournal {
            live: live.clone(),
            aside,
            staged: staged.clone(),
            started_at: "2026-01-01T00:00:00.000Z".into(),
        };
        fs::write(journal_path(&live), serde_json::to_vec(&journal)?)?;

        assert_eq!(
            recover_interrupted(&live, &OsRenamer)?,
            Some(Recovery::JournalCleared)
        );
        assert_eq!(fs::read(live.join("id_ed25519"))?, b"NEW");
        Ok(())
    }

    #[test]
    fn test_recover_without_journal_is_noop() -> Result<()> {
        let (_home, live, _staged) = setup()?;
        assert_eq!(recover_interrupted(&live, &OsRenamer)?, None);
        Ok(())
    }

    #[test]
    fn test_unreadable_journal_is_treated_as_stale() -> Result<()> {
        let (_home, live, _staged) = setup()?;
        fs::write(journal_path(&live), b"{ truncated")?;

        assert_eq!(read_journal(&live)?, None);
        assert_eq!(recover_interrupted(&live, &OsRenamer)?, None);
        assert!(!journal_path(&live).exists());
        assert_eq!(fs::read(live.join("id_ed25519"))?, b"OLD");
        Ok(())
    }

    #[test]
    fn test_journal_path_is_hidden_sibling() {
        assert_eq!(
            journal_path(Path::new("/home/dev/.ssh")),
            PathBuf::from("/home/dev/.ssh.ssh-vault-swap.json")
        );
    }
}
