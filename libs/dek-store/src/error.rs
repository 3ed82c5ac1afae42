//! Error types for the DEK store library.

use thiserror::Error;

pub type DekStoreResult<T> = Result<T, DekStoreError>;

#[derive(Error, Debug)]
pub enum DekStoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("KMS error: {0}")]
    Kms(#[from] kms::KmsError),

    #[error("crypto failure: {0}")]
    Crypto(#[from] crypto_core::CryptoError),

    #[error("no DEK found for stream {stream}, version {version}")]
    DekNotFound { stream: String, version: u32 },

    #[error("dek store error: {0}")]
    Other(#[from] anyhow::Error),
}

impl DekStoreError {
    /// True for a unique-constraint violation on the DEK primary key — the
    /// signal that a concurrent `GetOrCreate` already won the race.
    pub fn is_duplicate_key(&self) -> bool {
        matches!(
            self,
            DekStoreError::Database(sqlx::Error::Database(db)) if db.is_unique_violation()
        )
    }
}
