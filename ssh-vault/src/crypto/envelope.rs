//! Current blob format: AES-256-GCM under a PBKDF2-derived key.
//!
//! Layout: `MAGIC(8) || SALT(16) || IV(12) || TAG(16) || CIPHERTEXT(N)`.
//! Salt and IV are drawn fresh from the OS RNG for every blob, so a
//! (key, IV) pair never repeats.

use super::kdf::derive_key;
use crate::config::Passphrase;
use crate::utils::errors::{Result, VaultError};
use aes_gcm::aead::{AeadInPlace, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce, Tag};
use rand::{rngs::OsRng, RngCore};
use zeroize::{Zeroize, Zeroizing};

/// Magic bytes at the start of every current-format blob.
pub const MAGIC: &[u8; 8] = b"SCRYSSH2";

pub const SALT_LEN: usize = 16;
pub const IV_LEN: usize = 12;
pub const TAG_LEN: usize = 16;

/// magic(8) + salt(16) + iv(12) + tag(16) = 52
pub const HEADER_LEN: usize = MAGIC.len() + SALT_LEN + IV_LEN + TAG_LEN;

/// A parsed current-format blob, borrowing its ciphertext.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope<'a> {
    pub salt: [u8; SALT_LEN],
    pub iv: [u8; IV_LEN],
    pub tag: [u8; TAG_LEN],
    pub ciphertext: &'a [u8],
}

impl<'a> Envelope<'a> {
    /// Parse by fixed offsets. `Ok(None)` when the magic does not match.
    pub fn parse(bytes: &'a [u8]) -> Result<Option<Self>> {
        if !bytes.starts_with(MAGIC) {
            return Ok(None);
        }
        if bytes.len() < HEADER_LEN {
            return Err(VaultError::MalformedArchive(format!(
                "{} bytes, header needs {}",
                bytes.len(),
                HEADER_LEN
            )));
        }

        let salt_end = MAGIC.len() + SALT_LEN;
        let iv_end = salt_end + IV_LEN;

        let mut salt = [0u8; SALT_LEN];
        salt.copy_from_slice(&bytes[MAGIC.len()..salt_end]);
        let mut iv = [0u8; IV_LEN];
        iv.copy_from_slice(&bytes[salt_end..iv_end]);
        let mut tag = [0u8; TAG_LEN];
        tag.copy_from_slice(&bytes[iv_end..HEADER_LEN]);

        Ok(Some(Self {
            salt,
            iv,
            tag,
            ciphertext: &bytes[HEADER_LEN..],
        }))
    }

    /// Serialize back into the on-disk layout.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN + self.ciphertext.len());
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&self.salt);
        out.extend_from_slice(&self.iv);
        out.extend_from_slice(&self.tag);
        out.extend_from_slice(self.ciphertext);
        out
    }

    /// Authenticate and decrypt. No plaintext escapes unless the tag verifies.
    pub fn open(&self, passphrase: &Passphrase, iterations: u32) -> Result<Zeroizing<Vec<u8>>> {
        let key = derive_key(passphrase, &self.salt, iterations);
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_slice()));

        let mut buffer = Zeroizing::new(self.ciphertext.to_vec());
        match cipher.decrypt_in_place_detached(
            Nonce::from_slice(&self.iv),
            b"",
            &mut buffer[..],
            Tag::from_slice(&self.tag),
        ) {
            Ok(()) => Ok(buffer),
            Err(_) => {
                // The buffer may already hold keystream output; wipe before dropping.
                buffer.zeroize();
                Err(VaultError::AuthenticationFailure)
            }
        }
    }
}

/// Encrypt `plaintext` into a complete current-format blob.
pub fn seal(plaintext: &[u8], passphrase: &Passphrase, iterations: u32) -> Result<Vec<u8>> {
    let mut salt = [0u8; SALT_LEN];
    let mut iv = [0u8; IV_LEN];
    OsRng.fill_bytes(&mut salt);
    OsRng.fill_bytes(&mut iv);

    let key = derive_key(passphrase, &salt, iterations);
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_slice()));

    let mut buffer = plaintext.to_vec();
    let tag = cipher
        .encrypt_in_place_detached(Nonce::from_slice(&iv), b"", &mut buffer)
        .map_err(|_| {
            VaultError::MalformedArchive("plaintext is too large for AES-256-GCM".to_string())
        })?;

    let mut tag_bytes = [0u8; TAG_LEN];
    tag_bytes.copy_from_slice(tag.as_slice());

    Ok(Envelope {
        salt,
        iv,
        tag: tag_bytes,
        ciphertext: &buffer,
    }
    .encode())
}
