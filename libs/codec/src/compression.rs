//! Compression stage: gzips the inner codec's bytes on encode, inflates
//! on decode. Opaque to the codec it wraps — it only ever sees bytes.

use std::io::{Read, Write};
use std::marker::PhantomData;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::codec::Codec;
use crate::error::{CodecError, CodecResult};

pub struct CompressionCodec<T, Inner> {
    inner: Inner,
    level: Compression,
    _marker: PhantomData<fn() -> T>,
}

impl<T, Inner: Codec<T>> CompressionCodec<T, Inner> {
    pub fn new(inner: Inner) -> Self {
        Self {
            inner,
            level: Compression::default(),
            _marker: PhantomData,
        }
    }

    pub fn with_level(inner: Inner, level: Compression) -> Self {
        Self {
            inner,
            level,
            _marker: PhantomData,
        }
    }
}

impl<T, Inner: Codec<T>> Codec<T> for CompressionCodec<T, Inner> {
    fn encode(&self, value: &T) -> CodecResult<Vec<u8>> {
        let raw = self.inner.encode(value)?;
        let mut encoder = GzEncoder::new(Vec::new(), self.level);
        encoder
            .write_all(&raw)
            .map_err(CodecError::Compression)?;
        encoder.finish().map_err(CodecError::Compression)
    }

    fn decode(&self, bytes: &[u8]) -> CodecResult<T> {
        let mut decoder = GzDecoder::new(bytes);
        let mut raw = Vec::new();
        decoder
            .read_to_end(&mut raw)
            .map_err(CodecError::Decompression)?;
        self.inner.decode(&raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::json::JsonCodec;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Sample {
        name: String,
        value: u32,
    }

    #[test]
    fn roundtrip() {
        let codec = CompressionCodec::new(JsonCodec::<Sample>::new());
        let value = Sample {
            name: "test".into(),
            value: 42,
        };
        let bytes = codec.encode(&value).unwrap();
        assert_eq!(codec.decode(&bytes).unwrap(), value);
    }

    #[test]
    fn shrinks_repetitive_payloads() {
        let codec = CompressionCodec::new(JsonCodec::<Sample>::new());
        let value = Sample {
            name: "x".repeat(4096),
            value: 1,
        };
        let plain = JsonCodec::<Sample>::new().encode(&value).unwrap();
        let compressed = codec.encode(&value).unwrap();
        assert!(compressed.len() < plain.len());
    }
}
