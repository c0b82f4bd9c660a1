//! Utility modules for the SSH vault.

pub mod errors;
pub mod logger;

pub use errors::{IoResultExt, Result, VaultError};
