//! Stream-scoped Data-Encryption-Key management.
//!
//! Wraps a [`kms::KeyManagementService`] with per-stream DEK persistence:
//! every outbox/inbox stream gets its own DEK, itself wrapped by the
//! tenant's KEK. Rotating a KEK does not require re-encrypting payloads —
//! only `rewrap` re-wraps the (much smaller) DEK rows.

pub mod config;
pub mod error;
pub mod repository;
pub mod store;

pub use config::DekStoreConfig;
pub use error::{DekStoreError, DekStoreResult};
pub use repository::{DekRepository, DekRow, SqlxDekRepository};
pub use store::DekStore;

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use kms::{KeyManagementService, KmsResult};
    use messaging_contracts::StreamId;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct InMemoryDekRepository {
        rows: Mutex<HashMap<(String, String, String, i32), DekRow>>,
    }

    impl InMemoryDekRepository {
        fn new() -> Self {
            Self {
                rows: Mutex::new(HashMap::new()),
            }
        }

        fn key(stream: &StreamId, version: i32) -> (String, String, String, i32) {
            (
                stream.tenant_id.clone(),
                stream.stream_type.clone(),
                stream.stream_id.to_string(),
                version,
            )
        }
    }

    #[async_trait]
    impl DekRepository for InMemoryDekRepository {
        async fn current_version(&self, stream: &StreamId) -> DekStoreResult<Option<i32>> {
            let rows = self.rows.lock().unwrap();
            Ok(rows
                .keys()
                .filter(|(t, st, si, _)| {
                    t == &stream.tenant_id && st == &stream.stream_type && si == &stream.stream_id.to_string()
                })
                .map(|(_, _, _, v)| *v)
                .max())
        }

        async fn get(&self, stream: &StreamId, version: i32) -> DekStoreResult<Option<DekRow>> {
            let rows = self.rows.lock().unwrap();
            Ok(rows.get(&Self::key(stream, version)).cloned())
        }

        async fn get_all(&self, stream: &StreamId) -> DekStoreResult<Vec<DekRow>> {
            let rows = self.rows.lock().unwrap();
            let mut out: Vec<DekRow> = rows
                .values()
                .filter(|r| {
                    r.tenant_id == stream.tenant_id
                        && r.stream_type == stream.stream_type
                        && r.stream_id == stream.stream_id
                })
                .cloned()
                .collect();
            out.sort_by_key(|r| r.version);
            Ok(out)
        }

        async fn insert(&self, row: &DekRow) -> DekStoreResult<()> {
            let mut rows = self.rows.lock().unwrap();
            let key = (
                row.tenant_id.clone(),
                row.stream_type.clone(),
                row.stream_id.to_string(),
                row.version,
            );
            if rows.contains_key(&key) {
                return Err(DekStoreError::Other(anyhow::anyhow!(
                    "duplicate key (test double, not a real sqlx unique violation)"
                )));
            }
            rows.insert(key, row.clone());
            Ok(())
        }

        async fn all_for_tenant(&self, tenant_id: &str) -> DekStoreResult<Vec<DekRow>> {
            let rows = self.rows.lock().unwrap();
            Ok(rows.values().filter(|r| r.tenant_id == tenant_id).cloned().collect())
        }

        async fn update_encrypted_key(
            &self,
            tenant_id: &str,
            stream_type: &str,
            stream_id: &serde_json::Value,
            version: i32,
            encrypted_dek: &[u8],
        ) -> DekStoreResult<()> {
            let mut rows = self.rows.lock().unwrap();
            let key = (tenant_id.to_string(), stream_type.to_string(), stream_id.to_string(), version);
            if let Some(row) = rows.get_mut(&key) {
                row.encrypted_dek = encrypted_dek.to_vec();
            }
            Ok(())
        }

        async fn delete(&self, stream: &StreamId) -> DekStoreResult<u64> {
            let mut rows = self.rows.lock().unwrap();
            let before = rows.len();
            rows.retain(|(t, st, si, _), _| {
                !(t == &stream.tenant_id && st == &stream.stream_type && si == &stream.stream_id.to_string())
            });
            Ok((before - rows.len()) as u64)
        }
    }

    /// A fake KMS that wraps DEKs with a fixed XOR key per tenant, letting
    /// tests exercise rewrap without a real KEK hierarchy.
    struct FakeKms {
        tenant_key_version: Mutex<HashMap<String, u8>>,
    }

    impl FakeKms {
        fn new() -> Self {
            Self {
                tenant_key_version: Mutex::new(HashMap::new()),
            }
        }

        fn key_byte(&self, tenant_id: &str) -> u8 {
            *self
                .tenant_key_version
                .lock()
                .unwrap()
                .entry(tenant_id.to_string())
                .or_insert(1)
        }

        fn wrap(&self, tenant_id: &str, plaintext: &[u8]) -> Vec<u8> {
            let key = self.key_byte(tenant_id);
            let mut out = vec![key];
            out.extend(plaintext.iter().map(|b| b ^ key));
            out
        }

        fn unwrap(&self, ciphertext: &[u8]) -> Vec<u8> {
            let key = ciphertext[0];
            ciphertext[1..].iter().map(|b| b ^ key).collect()
        }

        fn rotate(&self, tenant_id: &str) {
            let mut versions = self.tenant_key_version.lock().unwrap();
            let entry = versions.entry(tenant_id.to_string()).or_insert(1);
            *entry = entry.wrapping_add(1);
        }
    }

    #[async_trait]
    impl KeyManagementService for FakeKms {
        async fn encrypt_dek(&self, tenant_id: &str, dek_bytes: &[u8]) -> KmsResult<Vec<u8>> {
            Ok(self.wrap(tenant_id, dek_bytes))
        }

        async fn decrypt_dek(&self, _tenant_id: &str, ciphertext: &[u8]) -> KmsResult<Vec<u8>> {
            Ok(self.unwrap(ciphertext))
        }

        async fn generate_dek(&self, tenant_id: &str) -> KmsResult<(Vec<u8>, Vec<u8>)> {
            let plaintext = crypto_core::generate_key();
            let wrapped = self.wrap(tenant_id, &plaintext);
            Ok((plaintext.to_vec(), wrapped))
        }

        async fn rotate_kek(&self, tenant_id: &str) -> KmsResult<i32> {
            self.rotate(tenant_id);
            Ok(self.key_byte(tenant_id) as i32)
        }

        async fn rewrap_dek(&self, tenant_id: &str, wrapped_dek: &[u8]) -> KmsResult<Vec<u8>> {
            let plaintext = self.unwrap(wrapped_dek);
            Ok(self.wrap(tenant_id, &plaintext))
        }

        async fn delete_kek(&self, _tenant_id: &str) -> KmsResult<()> {
            Ok(())
        }
    }

    fn stream(tenant: &str, stream_id: &str) -> StreamId {
        StreamId {
            tenant_id: tenant.to_string(),
            stream_type: "order".to_string(),
            stream_id: json!(stream_id),
        }
    }

    fn build_store() -> DekStore {
        DekStore::new(
            std::sync::Arc::new(InMemoryDekRepository::new()),
            std::sync::Arc::new(FakeKms::new()),
            DekStoreConfig::default(),
        )
    }

    #[tokio::test]
    async fn first_access_creates_version_one() {
        let store = build_store();
        let s = stream("tenant-a", "stream-1");
        let cipher = store.get_or_create(&s).await.unwrap();
        let aad = s.display_form().into_bytes();
        let ct = cipher.encrypt(b"payload", &aad).unwrap();
        assert_eq!(cipher.decrypt(&ct, &aad).unwrap(), b"payload");
    }

    #[tokio::test]
    async fn concurrent_creation_race_converges_to_one_row() {
        let repo = std::sync::Arc::new(InMemoryDekRepository::new());
        let kms: std::sync::Arc<dyn KeyManagementService> = std::sync::Arc::new(FakeKms::new());
        let store = DekStore::new(repo.clone(), kms, DekStoreConfig::default());
        let s = stream("tenant-b", "stream-1");

        let first = store.get_or_create(&s).await.unwrap();
        let second = store.get_or_create(&s).await.unwrap();

        let aad = s.display_form().into_bytes();
        let ct = first.encrypt(b"x", &aad).unwrap();
        assert_eq!(second.decrypt(&ct, &aad).unwrap(), b"x");
        assert_eq!(repo.get_all(&s).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn rewrap_survives_kek_rotation() {
        let repo = std::sync::Arc::new(InMemoryDekRepository::new());
        let kms = std::sync::Arc::new(FakeKms::new());
        let store = DekStore::new(repo, kms.clone(), DekStoreConfig::default());
        let s = stream("tenant-c", "stream-1");

        let before = store.get_or_create(&s).await.unwrap();
        let aad = s.display_form().into_bytes();
        let ct = before.encrypt(b"hello", &aad).unwrap();

        kms.rotate("tenant-c");
        let updated = store.rewrap("tenant-c").await.unwrap();
        assert_eq!(updated, 1);

        let after = store.get(&s, 1).await.unwrap();
        assert_eq!(after.decrypt(&ct, &aad).unwrap(), b"hello");
    }

    #[tokio::test]
    async fn get_all_builds_composite_over_every_version() {
        let repo = std::sync::Arc::new(InMemoryDekRepository::new());
        let kms: std::sync::Arc<dyn KeyManagementService> = std::sync::Arc::new(FakeKms::new());
        let store = DekStore::new(repo, kms, DekStoreConfig::default());
        let s = stream("tenant-d", "stream-1");

        let v1 = store.get_or_create(&s).await.unwrap();
        let aad = s.display_form().into_bytes();
        let old_ct = v1.encrypt(b"old", &aad).unwrap();

        let composite = store.get_all(&s).await.unwrap();
        assert_eq!(composite.decrypt(&old_ct, &aad).unwrap(), b"old");
    }

    #[tokio::test]
    async fn delete_removes_all_versions() {
        let store = build_store();
        let s = stream("tenant-e", "stream-1");
        store.get_or_create(&s).await.unwrap();
        store.delete(&s).await.unwrap();
        assert!(store.get(&s, 1).await.is_err());
    }
}
