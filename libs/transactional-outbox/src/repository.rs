//! Persistence for outbox rows and per-`(consumer_group, uri)` cursors.
//!
//! `transaction_id` is declared `xid8` in the schema (see `migrations/`), but
//! sqlx's Postgres driver has no native binder for that type, so every
//! comparison and bound value goes through a `::text::bigint` (write) /
//! `::text::xid8` (read back) cast pair. This preserves xid8's ordering and
//! equality semantics while keeping every parameter an ordinary `i64`.

use async_trait::async_trait;
use messaging_contracts::{OutboxCursor, OutboxMessage, OutboxRecord};
use sqlx::PgConnection;

use crate::config::OutboxConfig;
use crate::error::{OutboxError, OutboxResult};

/// Pending-depth snapshot for one `(consumer_group, uri)` cursor.
#[derive(Debug, Clone)]
pub struct OutboxLag {
    pub consumer_group: String,
    pub uri: String,
    pub pending: i64,
    pub oldest_pending_age_seconds: i64,
}

#[async_trait]
pub trait OutboxRepository: Send + Sync {
    /// Inserts a row, capturing `pg_current_xact_id()` as its transaction
    /// id. Must run on a connection already inside the caller's business
    /// transaction. Fails with `OutboxError::Conflict` if `metadata.event_id`
    /// collides with an existing row.
    async fn publish(&self, conn: &mut PgConnection, message: &OutboxMessage) -> OutboxResult<OutboxRecord>;

    /// Inserts the default `(0, '0')` cursor row if it doesn't exist yet.
    async fn ensure_cursor(&self, conn: &mut PgConnection, group: &str, uri: &str) -> OutboxResult<()>;

    /// Locks and returns the cursor row with `FOR UPDATE`.
    async fn lock_cursor(&self, conn: &mut PgConnection, group: &str, uri: &str) -> OutboxResult<OutboxCursor>;

    /// Fetches up to `batch_size` rows visible per the xmin rule, past the
    /// cursor, matching the optional URI filter and worker partition.
    async fn fetch_batch(
        &self,
        conn: &mut PgConnection,
        cursor: &OutboxCursor,
        uri_filter: &str,
        worker_id: i64,
        num_workers: i64,
        batch_size: i64,
    ) -> OutboxResult<Vec<OutboxRecord>>;

    async fn advance_cursor(
        &self,
        conn: &mut PgConnection,
        group: &str,
        uri: &str,
        transaction_id: i64,
        position: i64,
    ) -> OutboxResult<()>;

    /// Pending row count and oldest-pending age, per existing cursor.
    async fn lag(&self, conn: &mut PgConnection) -> OutboxResult<Vec<OutboxLag>>;
}

pub struct SqlxOutboxRepository {
    config: OutboxConfig,
}

impl SqlxOutboxRepository {
    pub fn new(config: OutboxConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl OutboxRepository for SqlxOutboxRepository {
    async fn publish(&self, conn: &mut PgConnection, message: &OutboxMessage) -> OutboxResult<OutboxRecord> {
        let query = format!(
            "INSERT INTO {} (uri, payload, metadata, transaction_id)
             VALUES ($1, $2, $3, pg_current_xact_id())
             RETURNING transaction_id::text::bigint AS transaction_id, position, uri, payload, metadata, created_at",
            self.config.outbox_table
        );
        let result = sqlx::query_as::<_, OutboxRecord>(&query)
            .bind(&message.uri)
            .bind(&message.payload)
            .bind(&message.metadata)
            .fetch_one(conn)
            .await;

        match result {
            Ok(record) => Ok(record),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => Err(OutboxError::Conflict(
                message.event_id().unwrap_or_default().to_string(),
            )),
            Err(err) => Err(OutboxError::Database(err)),
        }
    }

    async fn ensure_cursor(&self, conn: &mut PgConnection, group: &str, uri: &str) -> OutboxResult<()> {
        let query = format!(
            "INSERT INTO {} (consumer_group, uri, offset_acked, last_processed_transaction_id, updated_at)
             VALUES ($1, $2, 0, '0', NOW())
             ON CONFLICT (consumer_group, uri) DO NOTHING",
            self.config.offsets_table
        );
        sqlx::query(&query).bind(group).bind(uri).execute(conn).await?;
        Ok(())
    }

    async fn lock_cursor(&self, conn: &mut PgConnection, group: &str, uri: &str) -> OutboxResult<OutboxCursor> {
        let query = format!(
            "SELECT consumer_group, uri, offset_acked,
                    last_processed_transaction_id::text::bigint AS last_processed_transaction_id,
                    updated_at
             FROM {} WHERE consumer_group = $1 AND uri = $2 FOR UPDATE",
            self.config.offsets_table
        );
        let cursor = sqlx::query_as::<_, OutboxCursor>(&query)
            .bind(group)
            .bind(uri)
            .fetch_one(conn)
            .await?;
        Ok(cursor)
    }

    async fn fetch_batch(
        &self,
        conn: &mut PgConnection,
        cursor: &OutboxCursor,
        uri_filter: &str,
        worker_id: i64,
        num_workers: i64,
        batch_size: i64,
    ) -> OutboxResult<Vec<OutboxRecord>> {
        let query = format!(
            "SELECT transaction_id::text::bigint AS transaction_id, position, uri, payload, metadata, created_at
             FROM {}
             WHERE ((transaction_id::text::bigint = $1 AND position > $2) OR transaction_id::text::bigint > $1)
               AND transaction_id::text::bigint < pg_snapshot_xmin(pg_current_snapshot())::text::bigint
               AND ($3 = '' OR uri = $3 OR uri LIKE $3 || '/%')
               AND ($4 <= 1 OR hashtext(uri) % $4 = $5)
             ORDER BY transaction_id::text::bigint ASC, position ASC
             LIMIT $6",
            self.config.outbox_table
        );
        let rows = sqlx::query_as::<_, OutboxRecord>(&query)
            .bind(cursor.last_processed_transaction_id)
            .bind(cursor.offset_acked)
            .bind(uri_filter)
            .bind(num_workers)
            .bind(worker_id)
            .bind(batch_size)
            .fetch_all(conn)
            .await?;
        Ok(rows)
    }

    async fn advance_cursor(
        &self,
        conn: &mut PgConnection,
        group: &str,
        uri: &str,
        transaction_id: i64,
        position: i64,
    ) -> OutboxResult<()> {
        let query = format!(
            "UPDATE {} SET offset_acked = $1, last_processed_transaction_id = $2::text::xid8, updated_at = NOW()
             WHERE consumer_group = $3 AND uri = $4",
            self.config.offsets_table
        );
        sqlx::query(&query)
            .bind(position)
            .bind(transaction_id)
            .bind(group)
            .bind(uri)
            .execute(conn)
            .await?;
        Ok(())
    }

    async fn lag(&self, conn: &mut PgConnection) -> OutboxResult<Vec<OutboxLag>> {
        let query = format!(
            "SELECT c.consumer_group AS consumer_group, c.uri AS uri,
                    COUNT(o.position)::BIGINT AS pending,
                    COALESCE(EXTRACT(EPOCH FROM (NOW() - MIN(o.created_at)))::BIGINT, 0) AS oldest_pending_age_seconds
             FROM {offsets} c
             LEFT JOIN {outbox} o
               ON ((o.transaction_id::text::bigint = c.last_processed_transaction_id::text::bigint AND o.position > c.offset_acked)
                   OR o.transaction_id::text::bigint > c.last_processed_transaction_id::text::bigint)
              AND o.transaction_id::text::bigint < pg_snapshot_xmin(pg_current_snapshot())::text::bigint
              AND (c.uri = '' OR o.uri = c.uri OR o.uri LIKE c.uri || '/%')
             GROUP BY c.consumer_group, c.uri",
            offsets = self.config.offsets_table,
            outbox = self.config.outbox_table,
        );
        let rows: Vec<(String, String, i64, i64)> = sqlx::query_as(&query).fetch_all(conn).await?;
        Ok(rows
            .into_iter()
            .map(|(consumer_group, uri, pending, oldest_pending_age_seconds)| OutboxLag {
                consumer_group,
                uri,
                pending,
                oldest_pending_age_seconds,
            })
            .collect())
    }
}
