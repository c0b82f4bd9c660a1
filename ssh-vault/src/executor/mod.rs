//! Backup and restore orchestration.
//!
//! Each executor takes the resolved [`Config`](crate::config::Config) and a
//! [`Passphrase`](crate::config::Passphrase) and runs one operation to
//! completion on the calling thread.

pub mod backup;
pub mod manifest;
pub mod restore;
pub mod swap;

pub use backup::{status, BackupExecutor, BackupOutcome, BackupStatus};
pub use manifest::BackupMetadata;
pub use restore::{RestoreExecutor, RestoreOutcome};
