//! Persistence for inbox rows: idempotent ingestion, `SKIP LOCKED` candidate
//! scan, causal-dependency checks, and the processed-position sequence bump.

use async_trait::async_trait;
use messaging_contracts::{CausalDependency, InboxMessage, InboxRecord};
use sqlx::PgConnection;

use crate::config::InboxConfig;
use crate::error::InboxResult;

#[async_trait]
pub trait InboxRepository: Send + Sync {
    /// Inserts a row under its composite natural key. Returns `false`
    /// (no-op) if the key already exists.
    async fn publish(&self, conn: &mut PgConnection, message: &InboxMessage) -> InboxResult<bool>;

    /// Fetches the unprocessed row at `offset` within the partition owned
    /// by `worker_id`, locking it with `FOR UPDATE SKIP LOCKED` so other
    /// dispatchers skip past it rather than block.
    async fn fetch_candidate(
        &self,
        conn: &mut PgConnection,
        worker_id: i64,
        num_workers: i64,
        offset: i64,
    ) -> InboxResult<Option<InboxRecord>>;

    /// `true` iff every dependency descriptor names a row that exists and
    /// has already been processed.
    async fn dependencies_satisfied(&self, conn: &mut PgConnection, deps: &[CausalDependency]) -> InboxResult<bool>;

    /// Bumps `processed_position` from the configured sequence for the
    /// given natural key. Returns the assigned position.
    async fn mark_processed(&self, conn: &mut PgConnection, record: &InboxRecord) -> InboxResult<i64>;

    /// Count of rows with `processed_position IS NULL`, for the pending gauge.
    async fn pending_count(&self, conn: &mut PgConnection) -> InboxResult<i64>;

    /// Deletes processed rows with `received_position` below `before`.
    /// Operator-invoked retention; never called from the dispatch loop
    /// (the schema carries no timestamp column, so the cutoff is
    /// expressed in the same position space the dispatcher already
    /// orders by). Returns the number of rows removed.
    async fn delete_processed_before(&self, conn: &mut PgConnection, before: i64) -> InboxResult<u64>;
}

pub struct SqlxInboxRepository {
    config: InboxConfig,
}

impl SqlxInboxRepository {
    pub fn new(config: InboxConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl InboxRepository for SqlxInboxRepository {
    async fn publish(&self, conn: &mut PgConnection, message: &InboxMessage) -> InboxResult<bool> {
        let query = format!(
            "INSERT INTO {} (tenant_id, stream_type, stream_id, stream_position, uri, payload, metadata)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             ON CONFLICT (tenant_id, stream_type, stream_id, stream_position) DO NOTHING",
            self.config.table
        );
        let result = sqlx::query(&query)
            .bind(&message.tenant_id)
            .bind(&message.stream_type)
            .bind(&message.stream_id)
            .bind(message.stream_position)
            .bind(&message.uri)
            .bind(&message.payload)
            .bind(&message.metadata)
            .execute(conn)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn fetch_candidate(
        &self,
        conn: &mut PgConnection,
        worker_id: i64,
        num_workers: i64,
        offset: i64,
    ) -> InboxResult<Option<InboxRecord>> {
        let query = format!(
            "SELECT tenant_id, stream_type, stream_id, stream_position, uri, payload, metadata,
                    received_position, processed_position
             FROM {}
             WHERE processed_position IS NULL
               AND ($1 <= 1 OR hashtext({}) % $1 = $2)
             ORDER BY received_position ASC
             LIMIT 1 OFFSET $3
             FOR UPDATE SKIP LOCKED",
            self.config.table,
            self.config.partition.partition_expr()
        );
        let record = sqlx::query_as::<_, InboxRecord>(&query)
            .bind(num_workers)
            .bind(worker_id)
            .bind(offset)
            .fetch_optional(conn)
            .await?;
        Ok(record)
    }

    async fn dependencies_satisfied(&self, conn: &mut PgConnection, deps: &[CausalDependency]) -> InboxResult<bool> {
        if deps.is_empty() {
            return Ok(true);
        }
        let query = format!(
            "SELECT EXISTS(
                 SELECT 1 FROM {}
                 WHERE tenant_id = $1 AND stream_type = $2 AND stream_id = $3 AND stream_position = $4
                   AND processed_position IS NOT NULL
             )",
            self.config.table
        );
        for dep in deps {
            let satisfied: (bool,) = sqlx::query_as(&query)
                .bind(&dep.tenant_id)
                .bind(&dep.stream_type)
                .bind(&dep.stream_id)
                .bind(dep.stream_position)
                .fetch_one(&mut *conn)
                .await?;
            if !satisfied.0 {
                return Ok(false);
            }
        }
        Ok(true)
    }

    async fn mark_processed(&self, conn: &mut PgConnection, record: &InboxRecord) -> InboxResult<i64> {
        let query = format!(
            "UPDATE {} SET processed_position = nextval('{}')
             WHERE tenant_id = $1 AND stream_type = $2 AND stream_id = $3 AND stream_position = $4
             RETURNING processed_position",
            self.config.table, self.config.sequence
        );
        let (processed_position,): (Option<i64>,) = sqlx::query_as(&query)
            .bind(&record.tenant_id)
            .bind(&record.stream_type)
            .bind(&record.stream_id)
            .bind(record.stream_position)
            .fetch_one(conn)
            .await?;
        Ok(processed_position.expect("just assigned from the sequence"))
    }

    async fn pending_count(&self, conn: &mut PgConnection) -> InboxResult<i64> {
        let query = format!("SELECT COUNT(*) FROM {} WHERE processed_position IS NULL", self.config.table);
        let (count,): (i64,) = sqlx::query_as(&query).fetch_one(conn).await?;
        Ok(count)
    }

    async fn delete_processed_before(&self, conn: &mut PgConnection, before: i64) -> InboxResult<u64> {
        let query = format!(
            "DELETE FROM {} WHERE processed_position IS NOT NULL AND received_position < $1",
            self.config.table
        );
        let result = sqlx::query(&query).bind(before).execute(conn).await?;
        Ok(result.rows_affected())
    }
}
