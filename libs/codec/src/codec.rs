//! The `Codec<T>` contract all chain stages implement.

use crate::error::CodecResult;

/// Encodes a typed value to bytes and back. Implementations compose by
/// delegation: a stage holds its inner codec as a field and wraps/unwraps
/// around it, rather than through inheritance.
pub trait Codec<T> {
    fn encode(&self, value: &T) -> CodecResult<Vec<u8>>;
    fn decode(&self, bytes: &[u8]) -> CodecResult<T>;
}
