//! Error types for the codec library.

use thiserror::Error;

/// Result type alias for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur while encoding or decoding a payload through a
/// codec chain.
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("json encode/decode failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("compression failed: {0}")]
    Compression(#[source] std::io::Error),

    #[error("decompression failed: {0}")]
    Decompression(#[source] std::io::Error),

    #[error("encryption failed: {0}")]
    Encryption(#[from] crypto_core::CryptoError),
}
