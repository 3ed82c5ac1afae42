//! Symmetric AEAD primitives shared by the KMS and DEK-store layers.
//!
//! This crate has no knowledge of tenants, streams or key hierarchies — it
//! only knows how to seal and open bytes under a key, and how to frame that
//! with a key version so callers can rotate keys without losing the ability
//! to decrypt what came before.

pub mod cipher;
pub mod error;
pub mod versioned;

pub use cipher::{generate_key, AeadCipher, Aes256GcmCipher};
pub use error::{CryptoError, CryptoResult};
pub use versioned::{CompositeVersionedCipher, VersionedCipher};
