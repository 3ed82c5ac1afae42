//! The `KeyManagementService` contract and its PostgreSQL-backed
//! implementation.

use async_trait::async_trait;
use chrono::Utc;
use crypto_core::{generate_key, AeadCipher, Aes256GcmCipher};
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::KmsConfig;
use crate::error::{KmsError, KmsResult};
use crate::repository::{KekRow, KmsRepository};

const KEK_VERSION_LEN: usize = 4;

/// Per-tenant Key-Encryption-Key lifecycle: issue, rotate,
/// decrypt-DEK-under-current-KEK, delete.
#[async_trait]
pub trait KeyManagementService: Send + Sync {
    /// Seals `dek_bytes` under the tenant's current KEK (creating KEK
    /// version 1 first if none exists), producing
    /// `kek_version(4B BE) || nonce(12B) || AEAD(dek||tag)`.
    async fn encrypt_dek(&self, tenant_id: &str, dek_bytes: &[u8]) -> KmsResult<Vec<u8>>;

    /// Reads the KEK version from `ciphertext`'s prefix, fetches that
    /// version, and opens the remainder. Fails with `KekNotFound` if the
    /// indicated version is absent.
    async fn decrypt_dek(&self, tenant_id: &str, ciphertext: &[u8]) -> KmsResult<Vec<u8>>;

    /// Generates a fresh 32-byte DEK and seals it, returning both forms.
    async fn generate_dek(&self, tenant_id: &str) -> KmsResult<(Vec<u8>, Vec<u8>)>;

    /// Creates a new KEK version (1 if none exists, else current+1).
    /// Earlier versions are never overwritten or forgotten.
    async fn rotate_kek(&self, tenant_id: &str) -> KmsResult<i32>;

    /// Unwraps then re-wraps `wrapped_dek`, keying the output to the
    /// current KEK version.
    async fn rewrap_dek(&self, tenant_id: &str, wrapped_dek: &[u8]) -> KmsResult<Vec<u8>>;

    /// Crypto-shredding: removes every KEK row for the tenant.
    async fn delete_kek(&self, tenant_id: &str) -> KmsResult<()>;
}

/// KMS backed by a local Postgres table, with KEKs themselves wrapped
/// under a single master key held by the process (e.g. loaded from a
/// secrets manager at startup, out of scope here).
pub struct PostgresKms {
    repo: Arc<dyn KmsRepository>,
    master_cipher: Arc<dyn AeadCipher>,
    config: KmsConfig,
}

impl PostgresKms {
    pub fn new(repo: Arc<dyn KmsRepository>, master_cipher: Arc<dyn AeadCipher>, config: KmsConfig) -> Self {
        Self {
            repo,
            master_cipher,
            config,
        }
    }

    fn tenant_aad(tenant_id: &str) -> Vec<u8> {
        tenant_id.as_bytes().to_vec()
    }

    async fn kek_plaintext(&self, tenant_id: &str, version: i32) -> KmsResult<Vec<u8>> {
        let row = self
            .repo
            .get(tenant_id, version)
            .await?
            .ok_or_else(|| KmsError::KekNotFound {
                tenant: tenant_id.to_string(),
                version: version as u32,
            })?;
        self.master_cipher
            .decrypt(&row.encrypted_key, &Self::tenant_aad(tenant_id))
            .map_err(KmsError::from)
    }

    async fn current_kek(&self, tenant_id: &str) -> KmsResult<(i32, Vec<u8>)> {
        match self.repo.current_version(tenant_id).await? {
            Some(version) => {
                let plaintext = self.kek_plaintext(tenant_id, version).await?;
                Ok((version, plaintext))
            }
            None => {
                let version = self.rotate_kek(tenant_id).await?;
                let plaintext = self.kek_plaintext(tenant_id, version).await?;
                Ok((version, plaintext))
            }
        }
    }
}

#[async_trait]
impl KeyManagementService for PostgresKms {
    async fn encrypt_dek(&self, tenant_id: &str, dek_bytes: &[u8]) -> KmsResult<Vec<u8>> {
        let (version, kek_bytes) = self.current_kek(tenant_id).await?;
        let cipher = Aes256GcmCipher::new(&kek_bytes)?;
        let sealed = cipher.encrypt(dek_bytes, &Self::tenant_aad(tenant_id))?;

        let mut out = Vec::with_capacity(KEK_VERSION_LEN + sealed.len());
        out.extend_from_slice(&(version as u32).to_be_bytes());
        out.extend_from_slice(&sealed);
        Ok(out)
    }

    async fn decrypt_dek(&self, tenant_id: &str, ciphertext: &[u8]) -> KmsResult<Vec<u8>> {
        if ciphertext.len() < KEK_VERSION_LEN {
            return Err(KmsError::Malformed("ciphertext shorter than KEK version prefix"));
        }
        let (version_bytes, sealed) = ciphertext.split_at(KEK_VERSION_LEN);
        let version = u32::from_be_bytes(version_bytes.try_into().unwrap()) as i32;

        let kek_bytes = self.kek_plaintext(tenant_id, version).await?;
        let cipher = Aes256GcmCipher::new(&kek_bytes)?;
        cipher
            .decrypt(sealed, &Self::tenant_aad(tenant_id))
            .map_err(KmsError::from)
    }

    async fn generate_dek(&self, tenant_id: &str) -> KmsResult<(Vec<u8>, Vec<u8>)> {
        let plaintext = generate_key().to_vec();
        let wrapped = self.encrypt_dek(tenant_id, &plaintext).await?;
        Ok((plaintext, wrapped))
    }

    async fn rotate_kek(&self, tenant_id: &str) -> KmsResult<i32> {
        let next_version = self.repo.current_version(tenant_id).await?.unwrap_or(0) + 1;
        let kek_bytes = generate_key();
        let encrypted_key = self
            .master_cipher
            .encrypt(&kek_bytes, &Self::tenant_aad(tenant_id))?;

        self.repo
            .insert(&KekRow {
                tenant_id: tenant_id.to_string(),
                key_version: next_version,
                encrypted_key,
                master_algorithm: self.config.master_algorithm.clone(),
                key_algorithm: "AES-256-GCM".to_string(),
                created_at: Utc::now(),
            })
            .await?;

        info!(tenant_id, version = next_version, "rotated KEK");
        Ok(next_version)
    }

    async fn rewrap_dek(&self, tenant_id: &str, wrapped_dek: &[u8]) -> KmsResult<Vec<u8>> {
        let plaintext = self.decrypt_dek(tenant_id, wrapped_dek).await?;
        self.encrypt_dek(tenant_id, &plaintext).await
    }

    async fn delete_kek(&self, tenant_id: &str) -> KmsResult<()> {
        let removed = self.repo.delete_all(tenant_id).await?;
        warn!(tenant_id, removed, "deleted all KEK versions (crypto-shredding)");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::KmsError;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct InMemoryKmsRepository {
        rows: Mutex<HashMap<(String, i32), KekRow>>,
    }

    #[async_trait]
    impl KmsRepository for InMemoryKmsRepository {
        async fn current_version(&self, tenant_id: &str) -> KmsResult<Option<i32>> {
            Ok(self
                .rows
                .lock()
                .unwrap()
                .keys()
                .filter(|(t, _)| t == tenant_id)
                .map(|(_, v)| *v)
                .max())
        }

        async fn get(&self, tenant_id: &str, version: i32) -> KmsResult<Option<KekRow>> {
            Ok(self
                .rows
                .lock()
                .unwrap()
                .get(&(tenant_id.to_string(), version))
                .cloned())
        }

        async fn insert(&self, row: &KekRow) -> KmsResult<()> {
            self.rows
                .lock()
                .unwrap()
                .insert((row.tenant_id.clone(), row.key_version), row.clone());
            Ok(())
        }

        async fn delete_all(&self, tenant_id: &str) -> KmsResult<u64> {
            let mut rows = self.rows.lock().unwrap();
            let before = rows.len();
            rows.retain(|(t, _), _| t != tenant_id);
            Ok((before - rows.len()) as u64)
        }
    }

    fn make_kms() -> PostgresKms {
        let master_cipher: Arc<dyn AeadCipher> =
            Arc::new(Aes256GcmCipher::new(&generate_key()).unwrap());
        PostgresKms::new(
            Arc::new(InMemoryKmsRepository::default()),
            master_cipher,
            KmsConfig::default(),
        )
    }

    #[tokio::test]
    async fn first_access_lazily_creates_kek_version_1() {
        let kms = make_kms();
        let (version, _) = kms.current_kek("tenant1").await.unwrap();
        assert_eq!(version, 1);
    }

    #[tokio::test]
    async fn rotate_kek_never_forgets_earlier_versions() {
        let kms = make_kms();
        let v1 = kms.rotate_kek("tenant1").await.unwrap();
        let v2 = kms.rotate_kek("tenant1").await.unwrap();
        assert_eq!((v1, v2), (1, 2));
        assert!(kms.kek_plaintext("tenant1", v1).await.is_ok());
        assert!(kms.kek_plaintext("tenant1", v2).await.is_ok());
    }

    #[tokio::test]
    async fn encrypt_decrypt_dek_roundtrip() {
        let kms = make_kms();
        let (plaintext, wrapped) = kms.generate_dek("tenant1").await.unwrap();
        let decrypted = kms.decrypt_dek("tenant1", &wrapped).await.unwrap();
        assert_eq!(decrypted, plaintext);
    }

    #[tokio::test]
    async fn decrypt_dek_fails_for_missing_kek_version() {
        let kms = make_kms();
        let (_, wrapped) = kms.generate_dek("tenant1").await.unwrap();
        kms.delete_kek("tenant1").await.unwrap();
        assert!(matches!(
            kms.decrypt_dek("tenant1", &wrapped).await,
            Err(KmsError::KekNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn rewrap_dek_survives_kek_rotation() {
        let kms = make_kms();
        let (plaintext, wrapped_v1) = kms.generate_dek("tenant1").await.unwrap();
        kms.rotate_kek("tenant1").await.unwrap();

        let rewrapped = kms.rewrap_dek("tenant1", &wrapped_v1).await.unwrap();
        let decrypted = kms.decrypt_dek("tenant1", &rewrapped).await.unwrap();
        assert_eq!(decrypted, plaintext);

        // old ciphertext is still decryptable too: rotation never deletes
        // earlier KEK versions.
        let still_decryptable = kms.decrypt_dek("tenant1", &wrapped_v1).await.unwrap();
        assert_eq!(still_decryptable, plaintext);
    }

    #[tokio::test]
    async fn aad_binds_ciphertext_to_tenant() {
        let kms = make_kms();
        let (_, wrapped) = kms.generate_dek("tenant1").await.unwrap();
        assert!(kms.decrypt_dek("tenant2", &wrapped).await.is_err());
    }
}
