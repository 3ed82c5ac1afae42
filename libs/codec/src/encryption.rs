//! Encryption stage: encrypts the inner codec's bytes, prefixed with the
//! DEK version used, so the DEK store can later look up the matching key
//! before asking this codec to decrypt.

use std::marker::PhantomData;
use std::sync::Arc;

use crypto_core::AeadCipher;

use crate::codec::Codec;
use crate::error::{CodecError, CodecResult};

const DEK_VERSION_LEN: usize = 4;

pub struct EncryptionCodec<T, Inner> {
    inner: Inner,
    cipher: Arc<dyn AeadCipher>,
    dek_version: u32,
    aad: Vec<u8>,
    _marker: PhantomData<fn() -> T>,
}

impl<T, Inner: Codec<T>> EncryptionCodec<T, Inner> {
    /// `aad` binds the ciphertext to the stream it belongs to (stream id,
    /// tenant id, or similar) so a ciphertext copied between streams fails
    /// to decrypt.
    pub fn new(inner: Inner, cipher: Arc<dyn AeadCipher>, dek_version: u32, aad: Vec<u8>) -> Self {
        Self {
            inner,
            cipher,
            dek_version,
            aad,
            _marker: PhantomData,
        }
    }

    pub fn dek_version(&self) -> u32 {
        self.dek_version
    }

    /// Reads the DEK version a ciphertext was framed with, without
    /// attempting to decrypt it. Callers use this to pick the matching
    /// cipher before constructing a codec to actually decode.
    pub fn peek_dek_version(data: &[u8]) -> CodecResult<u32> {
        if data.len() < DEK_VERSION_LEN {
            return Err(CodecError::Encryption(crypto_core::CryptoError::Malformed(
                "ciphertext shorter than DEK version prefix",
            )));
        }
        Ok(u32::from_be_bytes(data[..DEK_VERSION_LEN].try_into().unwrap()))
    }
}

impl<T, Inner: Codec<T>> Codec<T> for EncryptionCodec<T, Inner> {
    fn encode(&self, value: &T) -> CodecResult<Vec<u8>> {
        let raw = self.inner.encode(value)?;
        let ciphertext = self.cipher.encrypt(&raw, &self.aad)?;
        let mut out = Vec::with_capacity(DEK_VERSION_LEN + ciphertext.len());
        out.extend_from_slice(&self.dek_version.to_be_bytes());
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    fn decode(&self, bytes: &[u8]) -> CodecResult<T> {
        if bytes.len() < DEK_VERSION_LEN {
            return Err(CodecError::Encryption(crypto_core::CryptoError::Malformed(
                "ciphertext shorter than DEK version prefix",
            )));
        }
        let (_version, ciphertext) = bytes.split_at(DEK_VERSION_LEN);
        let raw = self.cipher.decrypt(ciphertext, &self.aad)?;
        self.inner.decode(&raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::json::JsonCodec;
    use crypto_core::{generate_key, Aes256GcmCipher};
    use serde::{Deserialize, Serialize};

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Sample {
        name: String,
        value: u32,
    }

    fn make_codec(version: u32, aad: &[u8]) -> EncryptionCodec<Sample, JsonCodec<Sample>> {
        let cipher: Arc<dyn AeadCipher> = Arc::new(Aes256GcmCipher::new(&generate_key()).unwrap());
        EncryptionCodec::new(JsonCodec::new(), cipher, version, aad.to_vec())
    }

    #[test]
    fn roundtrip() {
        let codec = make_codec(7, b"stream-1");
        let value = Sample {
            name: "test".into(),
            value: 42,
        };
        let bytes = codec.encode(&value).unwrap();
        assert_eq!(&bytes[..4], &7u32.to_be_bytes());
        assert_eq!(codec.decode(&bytes).unwrap(), value);
    }

    #[test]
    fn two_encodings_differ_byte_for_byte() {
        let codec = make_codec(1, b"stream-1");
        let value = Sample {
            name: "test".into(),
            value: 42,
        };
        let a = codec.encode(&value).unwrap();
        let b = codec.encode(&value).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn decoding_with_wrong_aad_fails() {
        let codec_a = make_codec(1, b"stream-1");
        let cipher = Arc::new(Aes256GcmCipher::new(&generate_key()).unwrap());
        let _ = cipher;
        let value = Sample {
            name: "test".into(),
            value: 42,
        };
        let bytes = codec_a.encode(&value).unwrap();

        let codec_b = EncryptionCodec::new(
            JsonCodec::new(),
            Arc::new(Aes256GcmCipher::new(&generate_key()).unwrap()),
            1,
            b"stream-2".to_vec(),
        );
        assert!(codec_b.decode(&bytes).is_err());
    }

    #[test]
    fn peek_dek_version_reads_prefix_without_decrypting() {
        let codec = make_codec(9, b"stream-1");
        let value = Sample {
            name: "test".into(),
            value: 42,
        };
        let bytes = codec.encode(&value).unwrap();
        assert_eq!(EncryptionCodec::<Sample, JsonCodec<Sample>>::peek_dek_version(&bytes).unwrap(), 9);
    }
}
