//! Composable encode/decode pipeline for event payloads: JSON leaf codec,
//! an optional compression stage, and an encryption stage, stacked by
//! delegation rather than inheritance.

pub mod codec;
pub mod compression;
pub mod encryption;
pub mod error;
pub mod json;

pub use codec::Codec;
pub use compression::CompressionCodec;
pub use encryption::EncryptionCodec;
pub use error::{CodecError, CodecResult};
pub use json::JsonCodec;
