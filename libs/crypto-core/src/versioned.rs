//! Versioned ciphers.
//!
//! Both the KMS (wrapping DEKs under a KEK) and the DEK store (wrapping
//! payloads under a stream's DEK) need to prepend the key version they used
//! so a later decrypt can pick the right key even after rotation. Both needs
//! are the same shape, so they share this implementation: a single-version
//! wrapper, and a composite that can decrypt any version it was built with
//! while always encrypting under the newest.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::cipher::AeadCipher;
use crate::error::{CryptoError, CryptoResult};

const VERSION_LEN: usize = 4;

/// Wraps a single [`AeadCipher`] and prepends its key version (big-endian
/// u32) to every ciphertext. Decrypt rejects ciphertexts framed with any
/// other version.
pub struct VersionedCipher<C> {
    version: u32,
    inner: C,
}

impl<C: AeadCipher> VersionedCipher<C> {
    pub fn new(version: u32, inner: C) -> Self {
        Self { version, inner }
    }

    pub fn version(&self) -> u32 {
        self.version
    }
}

impl<C: AeadCipher> AeadCipher for VersionedCipher<C> {
    fn encrypt(&self, plaintext: &[u8], aad: &[u8]) -> CryptoResult<Vec<u8>> {
        let body = self.inner.encrypt(plaintext, aad)?;
        let mut out = Vec::with_capacity(VERSION_LEN + body.len());
        out.extend_from_slice(&self.version.to_be_bytes());
        out.extend_from_slice(&body);
        Ok(out)
    }

    fn decrypt(&self, data: &[u8], aad: &[u8]) -> CryptoResult<Vec<u8>> {
        if data.len() < VERSION_LEN {
            return Err(CryptoError::Malformed("ciphertext shorter than version prefix"));
        }
        let (version_bytes, body) = data.split_at(VERSION_LEN);
        let version = u32::from_be_bytes(version_bytes.try_into().unwrap());
        if version != self.version {
            return Err(CryptoError::UnknownVersion(version));
        }
        self.inner.decrypt(body, aad)
    }
}

/// Holds one inner cipher per key version. Encrypts under `current`;
/// decrypts by reading the version prefix and dispatching to the matching
/// inner cipher, so old ciphertexts stay decryptable across rotations.
pub struct CompositeVersionedCipher {
    current: u32,
    ciphers: BTreeMap<u32, Arc<dyn AeadCipher>>,
}

impl CompositeVersionedCipher {
    /// Build from an explicit `(version, cipher)` map and the version to use
    /// for new encryptions. `current` must be a key in `ciphers`.
    pub fn new(current: u32, ciphers: BTreeMap<u32, Arc<dyn AeadCipher>>) -> CryptoResult<Self> {
        if !ciphers.contains_key(&current) {
            return Err(CryptoError::UnknownVersion(current));
        }
        Ok(Self { current, ciphers })
    }

    pub fn current_version(&self) -> u32 {
        self.current
    }

    pub fn versions(&self) -> impl Iterator<Item = u32> + '_ {
        self.ciphers.keys().copied()
    }
}

impl AeadCipher for CompositeVersionedCipher {
    fn encrypt(&self, plaintext: &[u8], aad: &[u8]) -> CryptoResult<Vec<u8>> {
        let cipher = self
            .ciphers
            .get(&self.current)
            .ok_or(CryptoError::UnknownVersion(self.current))?;
        let body = cipher.encrypt(plaintext, aad)?;
        let mut out = Vec::with_capacity(VERSION_LEN + body.len());
        out.extend_from_slice(&self.current.to_be_bytes());
        out.extend_from_slice(&body);
        Ok(out)
    }

    fn decrypt(&self, data: &[u8], aad: &[u8]) -> CryptoResult<Vec<u8>> {
        if data.len() < VERSION_LEN {
            return Err(CryptoError::Malformed("ciphertext shorter than version prefix"));
        }
        let (version_bytes, body) = data.split_at(VERSION_LEN);
        let version = u32::from_be_bytes(version_bytes.try_into().unwrap());
        let cipher = self
            .ciphers
            .get(&version)
            .ok_or(CryptoError::UnknownVersion(version))?;
        cipher.decrypt(body, aad)
    }
}
