//! The Outbox dispatch engine: publish inside a business transaction,
//! visibility-safe ordered read, per-group cursor acknowledgement,
//! partitioned concurrent workers.

use std::sync::Arc;
use std::time::Duration;

use messaging_contracts::{OutboxMessage, OutboxRecord, Subscriber};
use sqlx::PgConnection;
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::OutboxConfig;
use crate::error::{OutboxError, OutboxResult};
use crate::metrics::OutboxMetrics;
use crate::repository::OutboxRepository;

pub struct Outbox {
    repo: Arc<dyn OutboxRepository>,
    pool: PgPool,
    config: OutboxConfig,
    metrics: Option<OutboxMetrics>,
}

impl Outbox {
    pub fn new(repo: Arc<dyn OutboxRepository>, pool: PgPool, config: OutboxConfig) -> Self {
        Self {
            repo,
            pool,
            config,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: OutboxMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Inserts `message` into the outbox. MUST be called with a connection
    /// already inside the caller's business atomic scope.
    pub async fn publish(&self, conn: &mut PgConnection, message: &OutboxMessage) -> OutboxResult<OutboxRecord> {
        self.repo.publish(conn, message).await
    }

    /// One at-most-once dispatch attempt: opens an atomic scope, ensures the
    /// cursor, fetches a batch, delivers it in order, acknowledges, commits.
    /// Returns `true` iff at least one message was delivered.
    pub async fn dispatch(
        &self,
        subscriber: &(dyn Subscriber<OutboxRecord>),
        consumer_group: &str,
        uri_filter: &str,
        worker_id: i64,
        num_workers: i64,
    ) -> OutboxResult<bool> {
        let effective_group = if num_workers > 1 {
            format!("{}:{}", consumer_group, worker_id)
        } else {
            consumer_group.to_string()
        };

        let mut tx = self.pool.begin().await?;

        self.repo.ensure_cursor(&mut tx, &effective_group, uri_filter).await?;
        let cursor = self.repo.lock_cursor(&mut tx, &effective_group, uri_filter).await?;
        let batch = self
            .repo
            .fetch_batch(&mut tx, &cursor, uri_filter, worker_id, num_workers, self.config.batch_size)
            .await?;

        if batch.is_empty() {
            tx.commit().await?;
            debug!(group = %effective_group, uri_filter, "no outbox messages to dispatch");
            return Ok(false);
        }

        for record in &batch {
            if let Err(err) = subscriber.handle(&mut tx, record).await {
                warn!(
                    transaction_id = record.transaction_id,
                    position = record.position,
                    error = %err,
                    "subscriber rejected outbox message, rolling back batch"
                );
                let _ = tx.rollback().await;
                return Err(OutboxError::Subscriber(err));
            }
        }

        let last = batch.last().expect("checked non-empty above");
        self.repo
            .advance_cursor(&mut tx, &effective_group, uri_filter, last.transaction_id, last.position)
            .await?;
        tx.commit().await?;

        if let Some(metrics) = &self.metrics {
            metrics.delivered.inc_by(batch.len() as u64);
        }

        info!(
            group = %effective_group,
            uri_filter,
            delivered = batch.len(),
            "dispatched outbox batch"
        );

        Ok(true)
    }

    /// Snapshot of pending depth per `(consumer_group, uri)`, also updating
    /// the pending-depth gauges if metrics are configured.
    pub async fn refresh_lag(&self) -> OutboxResult<()> {
        let Some(metrics) = &self.metrics else {
            return Ok(());
        };
        let mut conn = self.pool.acquire().await?;
        let lag = self.repo.lag(&mut conn).await?;
        for entry in lag {
            metrics
                .pending
                .with_label_values(&[&entry.consumer_group, &entry.uri])
                .set(entry.pending);
            metrics
                .oldest_pending_age_seconds
                .with_label_values(&[&entry.consumer_group, &entry.uri])
                .set(entry.oldest_pending_age_seconds);
        }
        Ok(())
    }

    /// Long-running driver: loops `dispatch` over `concurrency` logical
    /// workers (`num_processes * concurrency` globally), sleeping
    /// `poll_interval` when the queue is empty, exiting on cancellation.
    pub async fn run(
        self: Arc<Self>,
        ctx: CancellationToken,
        subscriber: Arc<dyn Subscriber<OutboxRecord>>,
        group: String,
        uri_filter: String,
        process_id: i64,
        num_processes: i64,
        concurrency: i64,
        poll_interval: Duration,
    ) {
        let num_workers = num_processes * concurrency;
        info!(group, uri_filter, num_workers, "outbox processor starting");

        let mut workers = Vec::with_capacity(concurrency as usize);
        for local_id in 0..concurrency {
            let worker_id = process_id * concurrency + local_id;
            let outbox = self.clone();
            let subscriber = subscriber.clone();
            let ctx = ctx.clone();
            let group = group.clone();
            let uri_filter = uri_filter.clone();

            workers.push(tokio::spawn(async move {
                loop {
                    if ctx.is_cancelled() {
                        break;
                    }
                    match outbox.dispatch(subscriber.as_ref(), &group, &uri_filter, worker_id, num_workers).await {
                        Ok(true) => continue,
                        Ok(false) => {
                            tokio::select! {
                                _ = ctx.cancelled() => break,
                                _ = tokio::time::sleep(poll_interval) => {}
                            }
                        }
                        Err(err) => {
                            error!(worker_id, error = %err, "outbox dispatch failed");
                            tokio::select! {
                                _ = ctx.cancelled() => break,
                                _ = tokio::time::sleep(poll_interval) => {}
                            }
                        }
                    }
                }
            }));
        }

        for worker in workers {
            let _ = worker.await;
        }

        info!(group, "outbox processor stopped");
    }

    /// Cooperative stream interface: spawns a background dispatch loop that
    /// forwards delivered messages to the returned channel. The sequence
    /// ends when `ctx` is cancelled.
    pub fn messages(
        self: Arc<Self>,
        ctx: CancellationToken,
        group: String,
        uri_filter: String,
        worker_id: i64,
        num_workers: i64,
        poll_interval: Duration,
    ) -> tokio::sync::mpsc::Receiver<OutboxRecord> {
        let (sender, receiver) = tokio::sync::mpsc::channel(self.config.batch_size as usize);

        tokio::spawn(async move {
            loop {
                if ctx.is_cancelled() {
                    break;
                }

                let forward = ChannelSubscriber {
                    sender: sender.clone(),
                };

                match self.dispatch(&forward, &group, &uri_filter, worker_id, num_workers).await {
                    Ok(true) => continue,
                    Ok(false) => {
                        tokio::select! {
                            _ = ctx.cancelled() => break,
                            _ = tokio::time::sleep(poll_interval) => {}
                        }
                    }
                    Err(err) => {
                        error!(worker_id, error = %err, "outbox messages dispatch failed");
                        tokio::select! {
                            _ = ctx.cancelled() => break,
                            _ = tokio::time::sleep(poll_interval) => {}
                        }
                    }
                }
            }
        });

        receiver
    }
}

struct ChannelSubscriber {
    sender: tokio::sync::mpsc::Sender<OutboxRecord>,
}

#[async_trait::async_trait]
impl Subscriber<OutboxRecord> for ChannelSubscriber {
    async fn handle(&self, _conn: &mut PgConnection, message: &OutboxRecord) -> Result<(), messaging_contracts::SubscriberError> {
        self.sender
            .send(message.clone())
            .await
            .map_err(|_| anyhow::anyhow!("messages() receiver dropped"))
    }
}
