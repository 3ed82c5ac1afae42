//! Error types for the transactional outbox library.

use thiserror::Error;

pub type OutboxResult<T> = Result<T, OutboxError>;

#[derive(Error, Debug)]
pub enum OutboxError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Publish collided with an existing `event_id`. Callers that treat the
    /// outbox as an idempotency store may choose to suppress this.
    #[error("duplicate event_id: {0}")]
    Conflict(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A subscriber aborted the batch; the enclosing transaction is rolled
    /// back and nothing in the batch is acknowledged.
    #[error("subscriber error: {0}")]
    Subscriber(#[source] anyhow::Error),

    #[error("outbox error: {0}")]
    Other(#[from] anyhow::Error),
}

impl OutboxError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, OutboxError::Conflict(_))
    }
}
