//! Error types for the crypto-core library.

use thiserror::Error;

/// Result type alias for cipher operations.
pub type CryptoResult<T> = Result<T, CryptoError>;

/// Errors that can occur while encrypting, decrypting or generating keys.
#[derive(Error, Debug)]
pub enum CryptoError {
    /// Key material was not the length the cipher requires.
    #[error("invalid key length: expected {expected} bytes, got {actual}")]
    KeyLength { expected: usize, actual: usize },

    /// AEAD seal failed (RNG failure, cipher construction failure).
    #[error("encryption failed")]
    Encryption,

    /// AEAD open failed: wrong key, wrong AAD, truncated input, or tampering.
    /// Never distinguishes which, to avoid leaking oracle information.
    #[error("decryption failed")]
    Decryption,

    /// Ciphertext was shorter than the minimum framing (nonce/version prefix).
    #[error("malformed ciphertext: {0}")]
    Malformed(&'static str),

    /// A versioned cipher was asked to decrypt a ciphertext prefixed with a
    /// version it does not hold the key material for.
    #[error("unknown key version: {0}")]
    UnknownVersion(u32),
}
