//! The guarded transaction wrapper (spec.md §4.3).
//!
//! Owns one database connection pool and one asynchronous mutex. SQLite
//! only allows a single writer at a time, so every `GuardedConnection`
//! treats its dialect as "not thread safe" and serializes transactions
//! behind `write_lock`, the same shape `hook-common::pgqueue`'s
//! `PgTransactionJob` gives a batch of jobs sharing one open transaction
//! (`Arc<Mutex<Option<Transaction>>>`), generalized here into a reusable
//! "run this closure inside a transaction" helper instead of a one-shot
//! batch.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, OnceLock};

use futures::future::BoxFuture;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{SqliteConnection, SqlitePool};
use tokio::sync::Mutex as AsyncMutex;

use crate::error::{ConfigError, StoreError};

tokio::task_local! {
    /// Set for the lifetime of the closure passed to `run_in_transaction`.
    /// A marker only — Rust's borrow checker rules out a genuinely
    /// implicit ambient connection, so callers that need to run queries
    /// still take the `&mut SqliteConnection` handed to them explicitly;
    /// this flag exists for code (logging, metrics) that only needs to
    /// know "am I inside a guarded transaction right now".
    static IN_GUARDED_TRANSACTION: ();
}

/// True if the caller is running inside a `GuardedConnection::run_in_transaction` closure.
pub fn in_guarded_transaction() -> bool {
    IN_GUARDED_TRANSACTION.try_with(|_| ()).is_ok()
}

pub struct GuardedConnection {
    pool: SqlitePool,
    write_lock: AsyncMutex<()>,
    serialized: bool,
}

impl GuardedConnection {
    async fn open(url: &str) -> Result<Self, ConfigError> {
        let options: SqliteConnectOptions = url
            .parse::<SqliteConnectOptions>()
            .map_err(ConfigError::Connection)?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(ConfigError::Connection)?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(ConfigError::Migration)?;

        Ok(Self {
            pool,
            write_lock: AsyncMutex::new(()),
            // SQLite serializes writers at the file level; treat every
            // connection string as "dialect not thread safe" per spec.md §4.3.
            serialized: true,
        })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Begin a transaction, run `f` with a handle to it, and commit on
    /// normal return. On error the transaction is rolled back and the
    /// mutex is released on every exit path (the `AsyncMutex` guard drops
    /// at the end of this function regardless of which branch returns).
    pub async fn run_in_transaction<F, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: for<'c> FnOnce(&'c mut SqliteConnection) -> BoxFuture<'c, Result<T, StoreError>>,
    {
        let _permit = if self.serialized {
            Some(self.write_lock.lock().await)
        } else {
            None
        };

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|error| StoreError::query("BEGIN", error))?;

        let result = IN_GUARDED_TRANSACTION.scope((), f(&mut tx)).await;

        match result {
            Ok(value) => {
                tx.commit()
                    .await
                    .map_err(|error| StoreError::query("COMMIT", error))?;
                Ok(value)
            }
            Err(err) => {
                let _unused = tx.rollback().await;
                Err(err)
            }
        }
    }
}

/// Process-wide registry of `GuardedConnection`s keyed by connection
/// string, so that two queues configured against the same database share
/// one pool and one write lock instead of contending through separate
/// connections. Mirrors the shape of `hook-common::health::HealthRegistry`'s
/// guarded map, but keyed by connection string rather than component name.
static CONNECTIONS: OnceLock<StdMutex<HashMap<String, Arc<GuardedConnection>>>> = OnceLock::new();

/// Fetch the shared `GuardedConnection` for `url`, opening and migrating
/// it the first time any queue asks for it.
pub async fn shared_connection(url: &str) -> Result<Arc<GuardedConnection>, ConfigError> {
    if let Some(existing) = CONNECTIONS
        .get_or_init(Default::default)
        .lock()
        .expect("connection registry mutex poisoned")
        .get(url)
        .cloned()
    {
        return Ok(existing);
    }

    let connection = Arc::new(GuardedConnection::open(url).await?);

    let mut registry = CONNECTIONS
        .get_or_init(Default::default)
        .lock()
        .expect("connection registry mutex poisoned");
    // Another task may have raced us to open the same url; keep whichever was inserted first.
    let connection = registry.entry(url.to_owned()).or_insert(connection).clone();
    Ok(connection)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn same_url_shares_one_connection() {
        let a = shared_connection("sqlite::memory:?cache=shared&txguard_a").await;
        let b = shared_connection("sqlite::memory:?cache=shared&txguard_a").await;
        assert!(a.is_ok() && b.is_ok());
        assert!(Arc::ptr_eq(&a.unwrap(), &b.unwrap()));
    }

    #[tokio::test]
    async fn run_in_transaction_commits() {
        let conn = GuardedConnection::open("sqlite::memory:").await.unwrap();
        assert!(!in_guarded_transaction());

        let result = conn
            .run_in_transaction(|c| {
                Box::pin(async move {
                    assert!(in_guarded_transaction());
                    sqlx::query("SELECT 1")
                        .execute(&mut *c)
                        .await
                        .map_err(|e| StoreError::query("SELECT", e))?;
                    Ok(42)
                })
            })
            .await
            .unwrap();

        assert_eq!(result, 42);
        assert!(!in_guarded_transaction());
    }
}
