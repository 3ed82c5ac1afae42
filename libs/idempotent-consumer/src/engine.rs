//! The Inbox dispatch engine: idempotent ingestion, `SKIP LOCKED` candidate
//! scan with causal-dependency gating, partitioned concurrent workers.

use std::sync::Arc;
use std::time::Duration;

use messaging_contracts::{CausalDependency, InboxMessage, InboxRecord, Subscriber};
use sqlx::PgConnection;
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::InboxConfig;
use crate::error::{InboxError, InboxResult};
use crate::metrics::InboxMetrics;
use crate::repository::InboxRepository;

/// Re-parses `record.metadata.causal_dependencies`, surfacing a malformed
/// entry as an error rather than silently dropping it the way
/// `InboxMessage::causal_dependencies` does for a message not yet accepted.
fn causal_dependencies_strict(record: &InboxRecord) -> InboxResult<Vec<CausalDependency>> {
    let Some(metadata) = &record.metadata else {
        return Ok(Vec::new());
    };
    let Some(raw) = metadata.get("causal_dependencies") else {
        return Ok(Vec::new());
    };
    serde_json::from_value::<Vec<CausalDependency>>(raw.clone())
        .map_err(|err| InboxError::MalformedDependency(err.to_string()))
}

pub struct Inbox {
    repo: Arc<dyn InboxRepository>,
    pool: PgPool,
    metrics: Option<InboxMetrics>,
}

impl Inbox {
    pub fn new(repo: Arc<dyn InboxRepository>, pool: PgPool, _config: InboxConfig) -> Self {
        Self {
            repo,
            pool,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: InboxMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Idempotent ingestion: a duplicate natural key is a silent no-op.
    pub async fn publish(&self, conn: &mut PgConnection, message: &InboxMessage) -> InboxResult<bool> {
        self.repo.publish(conn, message).await
    }

    /// One at-most-once dispatch attempt: scans unprocessed rows in
    /// `received_position` order within the worker's partition, skipping
    /// any whose causal dependencies are unmet, and processes the first
    /// eligible one.
    pub async fn dispatch(
        &self,
        subscriber: &(dyn Subscriber<InboxRecord>),
        worker_id: i64,
        num_workers: i64,
    ) -> InboxResult<bool> {
        let mut tx = self.pool.begin().await?;
        let mut offset: i64 = 0;

        loop {
            let candidate = self.repo.fetch_candidate(&mut tx, worker_id, num_workers, offset).await?;
            let Some(record) = candidate else {
                tx.commit().await?;
                debug!(worker_id, "no eligible inbox candidates");
                return Ok(false);
            };

            let deps = causal_dependencies_strict(&record)?;
            if !self.repo.dependencies_satisfied(&mut tx, &deps).await? {
                if let Some(metrics) = &self.metrics {
                    metrics.skipped_unmet_dependency.inc();
                }
                offset += 1;
                continue;
            }

            if let Err(err) = subscriber.handle(&mut tx, &record).await {
                warn!(
                    tenant_id = %record.tenant_id,
                    stream_type = %record.stream_type,
                    stream_position = record.stream_position,
                    error = %err,
                    "subscriber rejected inbox message, rolling back"
                );
                let _ = tx.rollback().await;
                return Err(InboxError::Subscriber(err));
            }

            self.repo.mark_processed(&mut tx, &record).await?;
            tx.commit().await?;

            if let Some(metrics) = &self.metrics {
                metrics.delivered.inc();
            }
            info!(
                tenant_id = %record.tenant_id,
                stream_type = %record.stream_type,
                stream_position = record.stream_position,
                "dispatched inbox message"
            );
            return Ok(true);
        }
    }

    /// Operator-invoked retention sweep. Not part of the dispatch loop;
    /// removes processed rows with `received_position` below `before`.
    pub async fn delete_processed_before(&self, before: i64) -> InboxResult<u64> {
        let mut conn = self.pool.acquire().await?;
        self.repo.delete_processed_before(&mut conn, before).await
    }

    pub async fn refresh_pending_gauge(&self) -> InboxResult<()> {
        let Some(metrics) = &self.metrics else {
            return Ok(());
        };
        let mut conn = self.pool.acquire().await?;
        let pending = self.repo.pending_count(&mut conn).await?;
        metrics.pending.set(pending);
        Ok(())
    }

    /// Long-running driver mirroring the Outbox's: `processId*concurrency +
    /// localId` is the effective worker id, `numProcesses*concurrency` the
    /// effective total.
    pub async fn run(
        self: Arc<Self>,
        ctx: CancellationToken,
        subscriber: Arc<dyn Subscriber<InboxRecord>>,
        process_id: i64,
        num_processes: i64,
        concurrency: i64,
        poll_interval: Duration,
    ) {
        let num_workers = num_processes * concurrency;
        info!(num_workers, "inbox processor starting");

        let mut workers = Vec::with_capacity(concurrency as usize);
        for local_id in 0..concurrency {
            let worker_id = process_id * concurrency + local_id;
            let inbox = self.clone();
            let subscriber = subscriber.clone();
            let ctx = ctx.clone();

            workers.push(tokio::spawn(async move {
                loop {
                    if ctx.is_cancelled() {
                        break;
                    }
                    match inbox.dispatch(subscriber.as_ref(), worker_id, num_workers).await {
                        Ok(true) => continue,
                        Ok(false) => {
                            tokio::select! {
                                _ = ctx.cancelled() => break,
                                _ = tokio::time::sleep(poll_interval) => {}
                            }
                        }
                        Err(err) => {
                            error!(worker_id, error = %err, "inbox dispatch failed");
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

        info!("inbox processor stopped");
    }

    /// Cooperative stream interface. Exposing the dispatcher's live
    /// transaction across a channel to arbitrary caller code isn't a safe
    /// pattern in Rust (the transaction's lifetime would have to outlive an
    /// unbounded consumer), so — like `Outbox::messages` — this forwards
    /// each delivered record through the same in-transaction subscriber
    /// callback the channel then publishes from. The record is only handed
    /// to the caller after the underlying dispatch has durably committed.
    pub fn messages(
        self: Arc<Self>,
        ctx: CancellationToken,
        worker_id: i64,
        num_workers: i64,
        poll_interval: Duration,
    ) -> tokio::sync::mpsc::Receiver<InboxRecord> {
        let (sender, receiver) = tokio::sync::mpsc::channel(64);

        tokio::spawn(async move {
            loop {
                if ctx.is_cancelled() {
                    break;
                }

                let forward = ChannelSubscriber { sender: sender.clone() };

                match self.dispatch(&forward, worker_id, num_workers).await {
                    Ok(true) => continue,
                    Ok(false) => {
                        tokio::select! {
                            _ = ctx.cancelled() => break,
                            _ = tokio::time::sleep(poll_interval) => {}
                        }
                    }
                    Err(err) => {
                        error!(worker_id, error = %err, "inbox messages dispatch failed");
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
    sender: tokio::sync::mpsc::Sender<InboxRecord>,
}

#[async_trait::async_trait]
impl Subscriber<InboxRecord> for ChannelSubscriber {
    async fn handle(&self, _conn: &mut PgConnection, message: &InboxRecord) -> Result<(), messaging_contracts::SubscriberError> {
        self.sender
            .send(message.clone())
            .await
            .map_err(|_| anyhow::anyhow!("messages() receiver dropped"))
    }
}
