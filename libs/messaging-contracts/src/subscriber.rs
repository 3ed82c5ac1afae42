//! The subscriber callback contract. The spec does not prescribe how
//! downstream transports are implemented — only this contract.

use async_trait::async_trait;
use futures::future::BoxFuture;
use sqlx::PgConnection;

/// Errors returned from a subscriber are opaque to the dispatch engines:
/// any error rolls back the enclosing atomic scope and is surfaced to the
/// driver loop.
pub type SubscriberError = anyhow::Error;

/// Receives `(connection, message)` inside the dispatcher's open
/// transaction and returns an error to abort/roll back. Subscribers must be
/// idempotent at the application level — the engines guarantee
/// at-least-once delivery, not exactly-once.
#[async_trait]
pub trait Subscriber<M>: Send + Sync {
    async fn handle(&self, conn: &mut PgConnection, message: &M) -> Result<(), SubscriberError>;
}

/// Adapts a plain async closure into a [`Subscriber`], for callers who don't
/// need a full `impl` block.
pub struct FnSubscriber<F>(pub F);

#[async_trait]
impl<M, F> Subscriber<M> for FnSubscriber<F>
where
    M: Send + Sync,
    F: for<'c> Fn(&'c mut PgConnection, &'c M) -> BoxFuture<'c, Result<(), SubscriberError>>
        + Send
        + Sync,
{
    async fn handle(&self, conn: &mut PgConnection, message: &M) -> Result<(), SubscriberError> {
        (self.0)(conn, message).await
    }
}
