//! Persistence for per-stream DEK rows.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use messaging_contracts::StreamId;
use serde_json::Value;
use sqlx::PgPool;

use crate::config::DekStoreConfig;
use crate::error::DekStoreResult;

/// A wrapped DEK row. `encrypted_dek` is produced by the KMS: the tenant's
/// current KEK version prefix followed by the AEAD-sealed DEK bytes.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct DekRow {
    pub tenant_id: String,
    pub stream_type: String,
    pub stream_id: Value,
    pub version: i32,
    pub encrypted_dek: Vec<u8>,
    pub algorithm: String,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait DekRepository: Send + Sync {
    async fn current_version(&self, stream: &StreamId) -> DekStoreResult<Option<i32>>;

    async fn get(&self, stream: &StreamId, version: i32) -> DekStoreResult<Option<DekRow>>;

    /// Every persisted version for the stream, oldest first.
    async fn get_all(&self, stream: &StreamId) -> DekStoreResult<Vec<DekRow>>;

    /// Inserts a new DEK version. Returns a unique-violation error (see
    /// `DekStoreError::is_duplicate_key`) if a concurrent `GetOrCreate`
    /// already inserted this exact `(stream, version)`.
    async fn insert(&self, row: &DekRow) -> DekStoreResult<()>;

    /// Every DEK row belonging to the tenant, across all streams — used by
    /// `Rewrap`.
    async fn all_for_tenant(&self, tenant_id: &str) -> DekStoreResult<Vec<DekRow>>;

    async fn update_encrypted_key(
        &self,
        tenant_id: &str,
        stream_type: &str,
        stream_id: &Value,
        version: i32,
        encrypted_dek: &[u8],
    ) -> DekStoreResult<()>;

    async fn delete(&self, stream: &StreamId) -> DekStoreResult<u64>;
}

pub struct SqlxDekRepository {
    pool: PgPool,
    config: DekStoreConfig,
}

impl SqlxDekRepository {
    pub fn new(pool: PgPool, config: DekStoreConfig) -> Self {
        Self { pool, config }
    }
}

#[async_trait]
impl DekRepository for SqlxDekRepository {
    async fn current_version(&self, stream: &StreamId) -> DekStoreResult<Option<i32>> {
        let query = format!(
            "SELECT MAX(version) FROM {} WHERE tenant_id = $1 AND stream_type = $2 AND stream_id = $3",
            self.config.table
        );
        let version: Option<i32> = sqlx::query_scalar(&query)
            .bind(&stream.tenant_id)
            .bind(&stream.stream_type)
            .bind(&stream.stream_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(version)
    }

    async fn get(&self, stream: &StreamId, version: i32) -> DekStoreResult<Option<DekRow>> {
        let query = format!(
            "SELECT tenant_id, stream_type, stream_id, version, encrypted_dek, algorithm, created_at
             FROM {} WHERE tenant_id = $1 AND stream_type = $2 AND stream_id = $3 AND version = $4",
            self.config.table
        );
        let row = sqlx::query_as::<_, DekRow>(&query)
            .bind(&stream.tenant_id)
            .bind(&stream.stream_type)
            .bind(&stream.stream_id)
            .bind(version)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn get_all(&self, stream: &StreamId) -> DekStoreResult<Vec<DekRow>> {
        let query = format!(
            "SELECT tenant_id, stream_type, stream_id, version, encrypted_dek, algorithm, created_at
             FROM {} WHERE tenant_id = $1 AND stream_type = $2 AND stream_id = $3 ORDER BY version ASC",
            self.config.table
        );
        let rows = sqlx::query_as::<_, DekRow>(&query)
            .bind(&stream.tenant_id)
            .bind(&stream.stream_type)
            .bind(&stream.stream_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn insert(&self, row: &DekRow) -> DekStoreResult<()> {
        let query = format!(
            "INSERT INTO {} (tenant_id, stream_type, stream_id, version, encrypted_dek, algorithm, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
            self.config.table
        );
        sqlx::query(&query)
            .bind(&row.tenant_id)
            .bind(&row.stream_type)
            .bind(&row.stream_id)
            .bind(row.version)
            .bind(&row.encrypted_dek)
            .bind(&row.algorithm)
            .bind(row.created_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn all_for_tenant(&self, tenant_id: &str) -> DekStoreResult<Vec<DekRow>> {
        let query = format!(
            "SELECT tenant_id, stream_type, stream_id, version, encrypted_dek, algorithm, created_at
             FROM {} WHERE tenant_id = $1",
            self.config.table
        );
        let rows = sqlx::query_as::<_, DekRow>(&query)
            .bind(tenant_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn update_encrypted_key(
        &self,
        tenant_id: &str,
        stream_type: &str,
        stream_id: &Value,
        version: i32,
        encrypted_dek: &[u8],
    ) -> DekStoreResult<()> {
        let query = format!(
            "UPDATE {} SET encrypted_dek = $1
             WHERE tenant_id = $2 AND stream_type = $3 AND stream_id = $4 AND version = $5",
            self.config.table
        );
        sqlx::query(&query)
            .bind(encrypted_dek)
            .bind(tenant_id)
            .bind(stream_type)
            .bind(stream_id)
            .bind(version)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete(&self, stream: &StreamId) -> DekStoreResult<u64> {
        let query = format!(
            "DELETE FROM {} WHERE tenant_id = $1 AND stream_type = $2 AND stream_id = $3",
            self.config.table
        );
        let result = sqlx::query(&query)
            .bind(&stream.tenant_id)
            .bind(&stream.stream_type)
            .bind(&stream.stream_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
