//! Persistence for wrapped KEK rows.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::config::KmsConfig;
use crate::error::KmsResult;

/// A wrapped KEK row: `encrypted_key` is KEK bytes encrypted under the
/// master key with AAD bound to the tenant.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct KekRow {
    pub tenant_id: String,
    pub key_version: i32,
    pub encrypted_key: Vec<u8>,
    pub master_algorithm: String,
    pub key_algorithm: String,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait KmsRepository: Send + Sync {
    /// Highest existing `key_version` for the tenant, or `None` if the
    /// tenant has no KEK yet.
    async fn current_version(&self, tenant_id: &str) -> KmsResult<Option<i32>>;

    async fn get(&self, tenant_id: &str, version: i32) -> KmsResult<Option<KekRow>>;

    async fn insert(&self, row: &KekRow) -> KmsResult<()>;

    /// Crypto-shredding primitive: remove every KEK row for the tenant.
    async fn delete_all(&self, tenant_id: &str) -> KmsResult<u64>;
}

pub struct SqlxKmsRepository {
    pool: PgPool,
    config: KmsConfig,
}

impl SqlxKmsRepository {
    pub fn new(pool: PgPool, config: KmsConfig) -> Self {
        Self { pool, config }
    }
}

#[async_trait]
impl KmsRepository for SqlxKmsRepository {
    async fn current_version(&self, tenant_id: &str) -> KmsResult<Option<i32>> {
        let query = format!(
            "SELECT MAX(key_version) FROM {} WHERE tenant_id = $1",
            self.config.table
        );
        let version: Option<i32> = sqlx::query_scalar(&query)
            .bind(tenant_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(version)
    }

    async fn get(&self, tenant_id: &str, version: i32) -> KmsResult<Option<KekRow>> {
        let query = format!(
            "SELECT tenant_id, key_version, encrypted_key, master_algorithm, key_algorithm, created_at
             FROM {} WHERE tenant_id = $1 AND key_version = $2",
            self.config.table
        );
        let row = sqlx::query_as::<_, KekRow>(&query)
            .bind(tenant_id)
            .bind(version)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn insert(&self, row: &KekRow) -> KmsResult<()> {
        let query = format!(
            "INSERT INTO {} (tenant_id, key_version, encrypted_key, master_algorithm, key_algorithm, created_at)
             VALUES ($1, $2, $3, $4, $5, $6)",
            self.config.table
        );
        sqlx::query(&query)
            .bind(&row.tenant_id)
            .bind(row.key_version)
            .bind(&row.encrypted_key)
            .bind(&row.master_algorithm)
            .bind(&row.key_algorithm)
            .bind(row.created_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_all(&self, tenant_id: &str) -> KmsResult<u64> {
        let query = format!("DELETE FROM {} WHERE tenant_id = $1", self.config.table);
        let result = sqlx::query(&query).bind(tenant_id).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}
