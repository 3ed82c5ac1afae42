//! Session / atomic-scope abstraction.
//!
//! A `Session` is a scoped acquisition of a database connection with
//! guaranteed release on all exit paths. `atomic` begins a transaction, runs
//! the callback, and commits iff the callback returns `Ok`, else rolls back.
//! Nested atomic scopes are ordinary sqlx transactions-within-transactions,
//! which Postgres implements as savepoints: calling `begin()` again on an
//! already-open `Transaction` opens a savepoint, and its `commit`/`rollback`
//! release or roll back to that savepoint without touching the outer one.

use futures::future::BoxFuture;
use sqlx::{Connection, PgConnection, PgPool, Postgres, Transaction};

/// A scoped database session. All Outbox/Inbox operations that mutate state
/// run inside one of its atomic scopes.
#[derive(Clone)]
pub struct Session {
    pool: PgPool,
}

impl Session {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Begin a top-level transaction, run `f` against the open connection,
    /// and commit iff `f` returns `Ok`.
    pub async fn atomic<'a, F, T, E>(&'a self, f: F) -> Result<T, E>
    where
        F: for<'c> FnOnce(&'c mut PgConnection) -> BoxFuture<'c, Result<T, E>>,
        E: From<sqlx::Error>,
    {
        let mut tx: Transaction<'_, Postgres> = self.pool.begin().await?;
        match f(&mut tx).await {
            Ok(value) => {
                tx.commit().await?;
                Ok(value)
            }
            Err(err) => {
                let _ = tx.rollback().await;
                Err(err)
            }
        }
    }
}

/// Begin a nested atomic scope (a savepoint) inside an already-open
/// transaction, running `f` and committing the savepoint iff `f` succeeds.
/// Requires an open `Transaction`, not a bare connection, so sqlx can track
/// nesting depth and emit `SAVEPOINT`/`RELEASE SAVEPOINT` instead of
/// `BEGIN`/`COMMIT`.
pub async fn nested_atomic<'c, F, T, E>(
    tx: &'c mut Transaction<'_, Postgres>,
    f: F,
) -> Result<T, E>
where
    F: for<'s> FnOnce(&'s mut PgConnection) -> BoxFuture<'s, Result<T, E>>,
    E: From<sqlx::Error>,
{
    let mut savepoint = tx.begin().await?;
    match f(&mut savepoint).await {
        Ok(value) => {
            savepoint.commit().await?;
            Ok(value)
        }
        Err(err) => {
            let _ = savepoint.rollback().await;
            Err(err)
        }
    }
}
