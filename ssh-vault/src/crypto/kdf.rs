//! PBKDF2-HMAC-SHA-256 key derivation.

use crate::config::Passphrase;
use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;
use zeroize::Zeroizing;

/// AES-256 key length in bytes.
pub const KEY_LEN: usize = 32;

/// Derive a 32-byte key from the passphrase and salt.
pub fn derive_key(passphrase: &Passphrase, salt: &[u8], iterations: u32) -> Zeroizing<[u8; KEY_LEN]> {
    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    derive_into(passphrase, salt, iterations, &mut key[..]);
    key
}

/// Fill `out` with derived bytes of any length (the legacy format takes key and IV together).
pub fn derive_into(passphrase: &Passphrase, salt: &[u8], iterations: u32, out: &mut [u8]) {
    pbkdf2_hmac::<Sha256>(passphrase.as_bytes(), salt, iterations, out);
}
