//! Vault-backed KMS variant: identical `KeyManagementService` interface,
//! but no local state — encrypt/decrypt/rewrap are remote calls to a Vault
//! Transit-engine-shaped API, wrapped in retry + circuit breaker.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use resilience::{with_retry, CircuitBreaker, CircuitBreakerConfig, RetryConfig};
use serde::Deserialize;
use tracing::warn;

use crate::error::{KmsError, KmsResult};
use crate::service::KeyManagementService;

/// Configuration for talking to Vault's Transit secrets engine.
#[derive(Debug, Clone)]
pub struct VaultKmsConfig {
    /// Base URL of the Vault server, e.g. `https://vault.internal:8200`.
    pub address: String,
    /// Vault token used for `X-Vault-Token`.
    pub token: String,
    pub retry: RetryConfig,
    pub circuit_breaker: CircuitBreakerConfig,
}

impl VaultKmsConfig {
    pub fn from_env() -> KmsResult<Self> {
        let preset = resilience::vault_kms_config();
        Ok(Self {
            address: std::env::var("VAULT_ADDR")
                .map_err(|_| KmsError::Other(anyhow::anyhow!("VAULT_ADDR not set")))?,
            token: std::env::var("VAULT_TOKEN")
                .map_err(|_| KmsError::Other(anyhow::anyhow!("VAULT_TOKEN not set")))?,
            retry: preset.retry.unwrap_or_default(),
            circuit_breaker: preset.circuit_breaker,
        })
    }

    fn key_name(&self, tenant_id: &str) -> String {
        format!("tenant-{tenant_id}")
    }
}

pub struct VaultKms {
    http: reqwest::Client,
    config: VaultKmsConfig,
    circuit_breaker: CircuitBreaker,
}

impl VaultKms {
    pub fn new(config: VaultKmsConfig) -> Self {
        let circuit_breaker = CircuitBreaker::new(config.circuit_breaker.clone());
        Self {
            http: reqwest::Client::new(),
            config,
            circuit_breaker,
        }
    }

    async fn call<F, Fut, T>(&self, f: F) -> KmsResult<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = KmsResult<T>>,
    {
        let retry_config = self.config.retry.clone();
        self.circuit_breaker
            .call(|| with_retry(retry_config.clone(), &f))
            .await
            .map_err(|e| match e {
                resilience::CircuitBreakerError::Open => KmsError::CircuitOpen,
                resilience::CircuitBreakerError::CallFailed(msg) => {
                    KmsError::Other(anyhow::anyhow!(msg))
                }
            })
    }
}

#[derive(Deserialize)]
struct TransitDataResponse {
    data: TransitData,
}

#[derive(Deserialize)]
struct TransitData {
    ciphertext: Option<String>,
    plaintext: Option<String>,
}

#[async_trait]
impl KeyManagementService for VaultKms {
    async fn encrypt_dek(&self, tenant_id: &str, dek_bytes: &[u8]) -> KmsResult<Vec<u8>> {
        let key_name = self.config.key_name(tenant_id);
        let plaintext_b64 = BASE64.encode(dek_bytes);

        let body = self
            .call(|| {
                let http = self.http.clone();
                let url = format!("{}/v1/transit/encrypt/{}", self.config.address, key_name);
                let token = self.config.token.clone();
                let plaintext_b64 = plaintext_b64.clone();
                async move {
                    let resp = http
                        .post(url)
                        .header("X-Vault-Token", token)
                        .json(&serde_json::json!({ "plaintext": plaintext_b64 }))
                        .send()
                        .await?
                        .error_for_status()?
                        .json::<TransitDataResponse>()
                        .await?;
                    Ok(resp)
                }
            })
            .await?;

        let ciphertext = body
            .data
            .ciphertext
            .ok_or_else(|| KmsError::Other(anyhow::anyhow!("Vault response missing ciphertext")))?;
        Ok(ciphertext.into_bytes())
    }

    async fn decrypt_dek(&self, tenant_id: &str, ciphertext: &[u8]) -> KmsResult<Vec<u8>> {
        let key_name = self.config.key_name(tenant_id);
        let ciphertext = String::from_utf8_lossy(ciphertext).into_owned();

        let body = self
            .call(|| {
                let http = self.http.clone();
                let url = format!("{}/v1/transit/decrypt/{}", self.config.address, key_name);
                let token = self.config.token.clone();
                let ciphertext = ciphertext.clone();
                async move {
                    let resp = http
                        .post(url)
                        .header("X-Vault-Token", token)
                        .json(&serde_json::json!({ "ciphertext": ciphertext }))
                        .send()
                        .await?
                        .error_for_status()?
                        .json::<TransitDataResponse>()
                        .await?;
                    Ok(resp)
                }
            })
            .await?;

        let plaintext_b64 = body
            .data
            .plaintext
            .ok_or_else(|| KmsError::Other(anyhow::anyhow!("Vault response missing plaintext")))?;
        BASE64
            .decode(plaintext_b64)
            .map_err(|e| KmsError::Other(anyhow::anyhow!(e)))
    }

    async fn generate_dek(&self, tenant_id: &str) -> KmsResult<(Vec<u8>, Vec<u8>)> {
        let plaintext = crypto_core::generate_key().to_vec();
        let wrapped = self.encrypt_dek(tenant_id, &plaintext).await?;
        Ok((plaintext, wrapped))
    }

    async fn rotate_kek(&self, tenant_id: &str) -> KmsResult<i32> {
        let key_name = self.config.key_name(tenant_id);
        self.call(|| {
            let http = self.http.clone();
            let url = format!("{}/v1/transit/keys/{}/rotate", self.config.address, key_name);
            let token = self.config.token.clone();
            async move {
                http.post(url)
                    .header("X-Vault-Token", token)
                    .send()
                    .await?
                    .error_for_status()?;
                Ok(())
            }
        })
        .await?;
        // Vault does not return the new version number from rotate; callers
        // that need it fetch key metadata separately.
        Ok(0)
    }

    async fn rewrap_dek(&self, tenant_id: &str, wrapped_dek: &[u8]) -> KmsResult<Vec<u8>> {
        let key_name = self.config.key_name(tenant_id);
        let ciphertext = String::from_utf8_lossy(wrapped_dek).into_owned();

        let body = self
            .call(|| {
                let http = self.http.clone();
                let url = format!("{}/v1/transit/rewrap/{}", self.config.address, key_name);
                let token = self.config.token.clone();
                let ciphertext = ciphertext.clone();
                async move {
                    let resp = http
                        .post(url)
                        .header("X-Vault-Token", token)
                        .json(&serde_json::json!({ "ciphertext": ciphertext }))
                        .send()
                        .await?
                        .error_for_status()?
                        .json::<TransitDataResponse>()
                        .await?;
                    Ok(resp)
                }
            })
            .await?;

        let ciphertext = body
            .data
            .ciphertext
            .ok_or_else(|| KmsError::Other(anyhow::anyhow!("Vault response missing ciphertext")))?;
        Ok(ciphertext.into_bytes())
    }

    async fn delete_kek(&self, tenant_id: &str) -> KmsResult<()> {
        let key_name = self.config.key_name(tenant_id);
        // Vault requires `deletion_allowed` to be enabled on the key before
        // a delete succeeds; callers are responsible for enabling it
        // out-of-band ahead of this call.
        self.call(|| {
            let http = self.http.clone();
            let config_url = format!(
                "{}/v1/transit/keys/{}/config",
                self.config.address, key_name
            );
            let delete_url = format!("{}/v1/transit/keys/{}", self.config.address, key_name);
            let token = self.config.token.clone();
            async move {
                http.post(&config_url)
                    .header("X-Vault-Token", &token)
                    .json(&serde_json::json!({ "deletion_allowed": true }))
                    .send()
                    .await?
                    .error_for_status()?;

                http.delete(&delete_url)
                    .header("X-Vault-Token", &token)
                    .send()
                    .await?
                    .error_for_status()?;
                Ok(())
            }
        })
        .await?;
        warn!(tenant_id, "deleted Vault transit key (crypto-shredding)");
        Ok(())
    }
}
