//! SSH Vault Library
//!
//! Encrypted, idempotent backup of an SSH credential directory and atomic
//! restore with permission normalization and a managed host block in
//! `~/.ssh/config`.

pub mod archive;
pub mod config;
pub mod crypto;
pub mod executor;
pub mod fingerprint;
pub mod fs;
pub mod ssh_config;
pub mod utils;

// Re-export commonly used types
pub use config::{Config, Passphrase};
pub use utils::errors::{Result, VaultError};
