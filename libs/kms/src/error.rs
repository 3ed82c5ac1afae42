//! Error types for the KMS library.

use thiserror::Error;

/// Result type alias for KMS operations.
pub type KmsResult<T> = Result<T, KmsError>;

#[derive(Error, Debug)]
pub enum KmsError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The KEK version indicated by a ciphertext's prefix (or requested
    /// explicitly) has no row for the tenant.
    #[error("KEK not found for tenant {tenant}, version {version}")]
    KekNotFound { tenant: String, version: u32 },

    #[error("crypto failure: {0}")]
    Crypto(#[from] crypto_core::CryptoError),

    #[error("malformed ciphertext: {0}")]
    Malformed(&'static str),

    #[error("remote KMS call failed: {0}")]
    Remote(#[from] reqwest::Error),

    #[error("remote KMS circuit breaker is open")]
    CircuitOpen,

    #[error("kms error: {0}")]
    Other(#[from] anyhow::Error),
}
