//! AEAD cipher primitive.
//!
//! The default implementation is AES-256-GCM with a 12-byte random nonce
//! prepended to the ciphertext-and-tag, matching the envelope encryption
//! layout used elsewhere for restricted-data-at-rest handling.

use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Nonce};
use rand::RngCore;

use crate::error::{CryptoError, CryptoResult};

const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;

/// A symmetric AEAD cipher keyed with a single key, bound to caller-supplied
/// additional authenticated data (AAD) on both encrypt and decrypt.
///
/// Implementations MUST use a fresh nonce per call to `encrypt` and MUST NOT
/// fall back to returning partial plaintext on authentication failure.
pub trait AeadCipher: Send + Sync {
    /// Encrypt `plaintext`, returning `nonce || ciphertext || tag`.
    fn encrypt(&self, plaintext: &[u8], aad: &[u8]) -> CryptoResult<Vec<u8>>;

    /// Decrypt a value produced by `encrypt` with the same key and AAD.
    fn decrypt(&self, data: &[u8], aad: &[u8]) -> CryptoResult<Vec<u8>>;
}

/// Generate a fresh 32-byte symmetric key suitable for [`Aes256GcmCipher`].
pub fn generate_key() -> [u8; KEY_LEN] {
    let mut key = [0u8; KEY_LEN];
    OsRng.fill_bytes(&mut key);
    key
}

/// AES-256-GCM cipher over a single 32-byte key.
pub struct Aes256GcmCipher {
    cipher: Aes256Gcm,
}

impl Aes256GcmCipher {
    /// Construct a cipher from exactly 32 bytes of key material.
    pub fn new(key: &[u8]) -> CryptoResult<Self> {
        if key.len() != KEY_LEN {
            return Err(CryptoError::KeyLength {
                expected: KEY_LEN,
                actual: key.len(),
            });
        }
        let cipher =
            Aes256Gcm::new_from_slice(key).map_err(|_| CryptoError::KeyLength {
                expected: KEY_LEN,
                actual: key.len(),
            })?;
        Ok(Self { cipher })
    }
}

impl AeadCipher for Aes256GcmCipher {
    fn encrypt(&self, plaintext: &[u8], aad: &[u8]) -> CryptoResult<Vec<u8>> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let payload = aes_gcm::aead::Payload {
            msg: plaintext,
            aad,
        };
        let ciphertext = self
            .cipher
            .encrypt(nonce, payload)
            .map_err(|_| CryptoError::Encryption)?;

        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    fn decrypt(&self, data: &[u8], aad: &[u8]) -> CryptoResult<Vec<u8>> {
        if data.len() < NONCE_LEN {
            return Err(CryptoError::Malformed("ciphertext shorter than nonce"));
        }
        let (nonce_bytes, ciphertext) = data.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);

        let payload = aes_gcm::aead::Payload {
            msg: ciphertext,
            aad,
        };
        self.cipher
            .decrypt(nonce, payload)
            .map_err(|_| CryptoError::Decryption)
    }
}
