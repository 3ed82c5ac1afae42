//! Per-stream Data-Encryption-Key lifecycle.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use crypto_core::{AeadCipher, Aes256GcmCipher, VersionedCipher};
use kms::KeyManagementService;
use messaging_contracts::StreamId;
use tracing::{info, warn};

use crate::config::DekStoreConfig;
use crate::error::{DekStoreError, DekStoreResult};
use crate::repository::{DekRepository, DekRow};

pub struct DekStore {
    repo: Arc<dyn DekRepository>,
    kms: Arc<dyn KeyManagementService>,
    config: DekStoreConfig,
}

impl DekStore {
    pub fn new(
        repo: Arc<dyn DekRepository>,
        kms: Arc<dyn KeyManagementService>,
        config: DekStoreConfig,
    ) -> Self {
        Self { repo, kms, config }
    }

    async fn cipher_for_row(&self, stream: &StreamId, row: &DekRow) -> DekStoreResult<Arc<dyn AeadCipher>> {
        let plaintext = self.kms.decrypt_dek(&stream.tenant_id, &row.encrypted_dek).await?;
        let inner = Aes256GcmCipher::new(&plaintext)?;
        Ok(Arc::new(VersionedCipher::new(row.version as u32, inner)))
    }

    /// Returns a cipher keyed to the stream's current DEK version, creating
    /// version 1 on first access. Concurrent callers racing to create the
    /// same stream's DEK converge on a single row: the loser's insert hits
    /// the primary-key uniqueness constraint and retries the read.
    pub async fn get_or_create(&self, stream: &StreamId) -> DekStoreResult<Arc<dyn AeadCipher>> {
        if let Some(version) = self.repo.current_version(stream).await? {
            let row = self
                .repo
                .get(stream, version)
                .await?
                .ok_or_else(|| DekStoreError::DekNotFound {
                    stream: stream.display_form(),
                    version: version as u32,
                })?;
            return self.cipher_for_row(stream, &row).await;
        }

        let (_, wrapped) = self.kms.generate_dek(&stream.tenant_id).await?;
        let row = DekRow {
            tenant_id: stream.tenant_id.clone(),
            stream_type: stream.stream_type.clone(),
            stream_id: stream.stream_id.clone(),
            version: 1,
            encrypted_dek: wrapped,
            algorithm: self.config.algorithm.clone(),
            created_at: Utc::now(),
        };

        match self.repo.insert(&row).await {
            Ok(()) => {
                info!(stream = %stream.display_form(), "issued DEK version 1");
                self.cipher_for_row(stream, &row).await
            }
            Err(err) if err.is_duplicate_key() => {
                warn!(stream = %stream.display_form(), "lost GetOrCreate race, re-reading winner's DEK");
                let version = self.repo.current_version(stream).await?.ok_or_else(|| {
                    DekStoreError::DekNotFound {
                        stream: stream.display_form(),
                        version: 1,
                    }
                })?;
                let winner = self.repo.get(stream, version).await?.ok_or_else(|| {
                    DekStoreError::DekNotFound {
                        stream: stream.display_form(),
                        version: version as u32,
                    }
                })?;
                self.cipher_for_row(stream, &winner).await
            }
            Err(err) => Err(err),
        }
    }

    /// Returns a cipher for exactly the given DEK version.
    pub async fn get(&self, stream: &StreamId, version: i32) -> DekStoreResult<Arc<dyn AeadCipher>> {
        let row = self
            .repo
            .get(stream, version)
            .await?
            .ok_or_else(|| DekStoreError::DekNotFound {
                stream: stream.display_form(),
                version: version as u32,
            })?;
        self.cipher_for_row(stream, &row).await
    }

    /// Returns a composite cipher able to decrypt any persisted version of
    /// the stream's DEK while encrypting new payloads under the latest.
    pub async fn get_all(&self, stream: &StreamId) -> DekStoreResult<Arc<dyn AeadCipher>> {
        let rows = self.repo.get_all(stream).await?;
        if rows.is_empty() {
            return Err(DekStoreError::DekNotFound {
                stream: stream.display_form(),
                version: 0,
            });
        }

        let mut ciphers: BTreeMap<u32, Arc<dyn AeadCipher>> = BTreeMap::new();
        let mut current = 0u32;
        for row in &rows {
            let plaintext = self.kms.decrypt_dek(&stream.tenant_id, &row.encrypted_dek).await?;
            let inner = Aes256GcmCipher::new(&plaintext)?;
            ciphers.insert(row.version as u32, Arc::new(inner));
            current = current.max(row.version as u32);
        }

        let composite = crypto_core::CompositeVersionedCipher::new(current, ciphers)?;
        Ok(Arc::new(composite))
    }

    /// Re-wraps every DEK the tenant owns (across all streams) under the
    /// tenant's current KEK. Returns the number of rows updated.
    pub async fn rewrap(&self, tenant_id: &str) -> DekStoreResult<u64> {
        let rows = self.repo.all_for_tenant(tenant_id).await?;
        let mut updated = 0u64;
        for row in rows {
            let rewrapped = self.kms.rewrap_dek(tenant_id, &row.encrypted_dek).await?;
            self.repo
                .update_encrypted_key(
                    &row.tenant_id,
                    &row.stream_type,
                    &row.stream_id,
                    row.version,
                    &rewrapped,
                )
                .await?;
            updated += 1;
        }
        info!(tenant_id, updated, "rewrapped DEKs after KEK rotation");
        Ok(updated)
    }

    pub async fn delete(&self, stream: &StreamId) -> DekStoreResult<()> {
        let removed = self.repo.delete(stream).await?;
        warn!(stream = %stream.display_form(), removed, "deleted DEK rows");
        Ok(())
    }
}
