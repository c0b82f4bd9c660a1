//! Legacy blob format written by `openssl enc -aes-256-cbc -pbkdf2`.
//!
//! Layout: `"Salted__"(8) || SALT(8) || CIPHERTEXT` with PKCS#7 padding.
//! Key and IV come out of a single 48-byte PBKDF2-HMAC-SHA-256 derivation.
//! CBC carries no authentication tag, so a wrong passphrase is only caught
//! when the padding fails to verify.

use super::kdf::{derive_into, KEY_LEN};
use crate::config::Passphrase;
use crate::utils::errors::{Result, VaultError};
use cbc::cipher::{block_padding::Pkcs7, BlockDecryptMut, KeyIvInit};
use zeroize::Zeroizing;

type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

pub const LEGACY_MAGIC: &[u8; 8] = b"Salted__";

pub const LEGACY_SALT_LEN: usize = 8;

const IV_LEN: usize = 16;
const BLOCK_LEN: usize = 16;
const HEADER_LEN: usize = LEGACY_MAGIC.len() + LEGACY_SALT_LEN;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyEnvelope<'a> {
    pub salt: [u8; LEGACY_SALT_LEN],
    pub ciphertext: &'a [u8],
}

impl<'a> LegacyEnvelope<'a> {
    /// `Ok(None)` when the bytes do not carry the OpenSSL salt header.
    pub fn parse(bytes: &'a [u8]) -> Result<Option<Self>> {
        if !bytes.starts_with(LEGACY_MAGIC) {
            return Ok(None);
        }

        let ciphertext = bytes.get(HEADER_LEN..).unwrap_or_default();
        if ciphertext.is_empty() || ciphertext.len() % BLOCK_LEN != 0 {
            return Err(VaultError::MalformedArchive(format!(
                "legacy ciphertext of {} bytes is not a whole number of blocks",
                ciphertext.len()
            )));
        }

        let mut salt = [0u8; LEGACY_SALT_LEN];
        salt.copy_from_slice(&bytes[LEGACY_MAGIC.len()..HEADER_LEN]);

        Ok(Some(Self { salt, ciphertext }))
    }

    pub fn open(&self, passphrase: &Passphrase, iterations: u32) -> Result<Zeroizing<Vec<u8>>> {
        let mut derived = Zeroizing::new([0u8; KEY_LEN + IV_LEN]);
        derive_into(passphrase, &self.salt, iterations, &mut derived[..]);
        let (key, iv) = derived.split_at(KEY_LEN);

        let decryptor = Aes256CbcDec::new_from_slices(key, iv)
            .map_err(|_| VaultError::MalformedArchive("invalid legacy key length".to_string()))?;

        decryptor
            .decrypt_padded_vec_mut::<Pkcs7>(self.ciphertext)
            .map(Zeroizing::new)
            .map_err(|_| VaultError::AuthenticationFailure)
    }
}

/// Produce a blob in the legacy layout, as `openssl enc` would.
#[cfg(test)]
pub(crate) fn seal_for_tests(
    plaintext: &[u8],
    passphrase: &Passphrase,
    iterations: u32,
    salt: [u8; LEGACY_SALT_LEN],
) -> Vec<u8> {
    use cbc::cipher::BlockEncryptMut;
    type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;

    let mut derived = [0u8; KEY_LEN + IV_LEN];
    derive_into(passphrase, &salt, iterations, &mut derived);
    let (key, iv) = derived.split_at(KEY_LEN);

    let ciphertext = Aes256CbcEnc::new_from_slices(key, iv)
        .unwrap()
        .encrypt_padded_vec_mut::<Pkcs7>(plaintext);

    let mut out = LEGACY_MAGIC.to_vec();
    out.extend_from_slice(&salt);
    out.extend_from_slice(&ciphertext);
    out
}
