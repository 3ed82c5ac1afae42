//! Error types for the inbox library.

use thiserror::Error;

pub type InboxResult<T> = Result<T, InboxError>;

#[derive(Error, Debug)]
pub enum InboxError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A `causal_dependencies` entry didn't deserialize into a valid
    /// 4-tuple descriptor.
    #[error("malformed causal dependency descriptor: {0}")]
    MalformedDependency(String),

    /// A subscriber aborted processing; the enclosing transaction is rolled
    /// back and `processed_position` stays NULL.
    #[error("subscriber error: {0}")]
    Subscriber(#[source] anyhow::Error),

    #[error("inbox error: {0}")]
    Other(#[from] anyhow::Error),
}
