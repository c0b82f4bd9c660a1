//! Passphrase-based encryption of archive bytes.
//!
//! New blobs are always written in the current AES-256-GCM format. Reading
//! dispatches on the leading magic bytes so older OpenSSL-produced blobs stay
//! restorable with the same passphrase.

pub mod envelope;
pub mod kdf;
pub mod legacy;

use crate::config::Passphrase;
use crate::utils::errors::{Result, VaultError};
use envelope::Envelope;
use legacy::LegacyEnvelope;
use zeroize::Zeroizing;

/// Cipher identifier recorded in the metadata sidecar.
pub const CIPHER_NAME: &str = "aes-256-gcm";
pub const KDF_NAME: &str = "pbkdf2";
pub const KDF_DIGEST: &str = "sha256";

/// A blob decoded into one of the known formats.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlobFormat<'a> {
    Current(Envelope<'a>),
    Legacy(LegacyEnvelope<'a>),
}

impl<'a> BlobFormat<'a> {
    /// Try the current parser, then the legacy parser, else reject.
    pub fn decode(bytes: &'a [u8]) -> Result<Self> {
        if bytes.len() < envelope::MAGIC.len() {
            return Err(VaultError::MalformedArchive(format!(
                "{} bytes is shorter than any format header",
                bytes.len()
            )));
        }
        if let Some(current) = Envelope::parse(bytes)? {
            return Ok(BlobFormat::Current(current));
        }
        if let Some(legacy) = LegacyEnvelope::parse(bytes)? {
            return Ok(BlobFormat::Legacy(legacy));
        }
        Err(VaultError::UnsupportedFormat)
    }

    pub fn name(&self) -> &'static str {
        match self {
            BlobFormat::Current(_) => "current (aes-256-gcm)",
            BlobFormat::Legacy(_) => "legacy (openssl aes-256-cbc)",
        }
    }

    pub fn open(&self, passphrase: &Passphrase, iterations: u32) -> Result<Zeroizing<Vec<u8>>> {
        match self {
            BlobFormat::Current(env) => env.open(passphrase, iterations),
            BlobFormat::Legacy(env) => env.open(passphrase, iterations),
        }
    }
}

/// Encrypt plaintext into a current-format blob.
pub fn encrypt(plaintext: &[u8], passphrase: &Passphrase, iterations: u32) -> Result<Vec<u8>> {
    passphrase.validate()?;
    envelope::seal(plaintext, passphrase, iterations)
}

/// Decrypt a blob of any supported format.
pub fn decrypt(blob: &[u8], passphrase: &Passphrase, iterations: u32) -> Result<Zeroizing<Vec<u8>>> {
    passphrase.validate()?;
    let format = BlobFormat::decode(blob)?;
    tracing::debug!("Detected {} backup format", format.name());
    format.open(passphrase, iterations)
}
