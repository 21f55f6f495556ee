//! Error categories for the job queue core.
//!
//! Mirrors the split `hook-common::pgqueue` draws between connection,
//! query and parse errors, but organized around the categories spec'd
//! for this queue: configuration errors are fatal at startup, submission
//! errors are reported synchronously to callers, store errors wrap the
//! underlying database driver, and dispatch errors describe why a single
//! HTTP attempt failed.

use thiserror::Error;

/// Errors that prevent a queue from starting at all. Fatal: callers should
/// panic or exit on these, never retry.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("queue name must not be empty")]
    EmptyName,
    #[error("invalid rate limit spec {0:?}: {1}")]
    InvalidRateLimit(String, String),
    #[error("invalid backoff spec {0:?}: {1}")]
    InvalidBackoff(String, String),
    #[error("invalid duration {0:?}: {1}")]
    InvalidDuration(String, String),
    #[error("SelfUrl is required but was not configured and no CEEN_SELF_*_URL fallback was set")]
    MissingSelfUrl,
    #[error("database connection failed: {0}")]
    Connection(#[source] sqlx::Error),
    #[error("failed to run migrations: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
}

/// Errors reported synchronously to a caller of `SubmitJob`. No row is
/// inserted when one of these is returned.
#[derive(Error, Debug)]
pub enum SubmitError {
    #[error("method must not be empty")]
    EmptyMethod,
    #[error("url must not be empty")]
    EmptyUrl,
    #[error("{0:?} is not a known content type")]
    UnknownContentType(String),
    #[error("payload is not valid bytes for application/octet-stream")]
    PayloadNotBytes,
    #[error("payload exceeds the maximum size of {0} bytes")]
    PayloadTooLarge(usize),
    #[error("failed to encode payload: {0}")]
    Encode(#[source] serde_json::Error),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors originating from the persistence layer.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("{command} query failed: {error}")]
    Query {
        command: &'static str,
        #[source]
        error: sqlx::Error,
    },
    #[error("transaction was already closed")]
    TransactionClosed,
}

impl StoreError {
    pub fn query(command: &'static str, error: sqlx::Error) -> Self {
        StoreError::Query { command, error }
    }
}

/// Errors for a single dispatch attempt that never got a response at all.
/// A non-2xx response is not one of these: it is a successful attempt as
/// far as the HTTP client is concerned, and is classified by status code
/// in `Dispatcher::run` instead. Never surfaced to `SubmitJob` callers:
/// these only ever show up in a `QueueRunLog` row or a log line.
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("unknown method {0:?}")]
    UnknownMethod(String),
    #[error(transparent)]
    Encode(#[from] SubmitError),
    #[error("bad stored payload: {0}")]
    BadPayload(#[source] serde_json::Error),
    #[error("bad stored headers: {0}")]
    BadHeaders(#[source] serde_json::Error),
    #[error("failed to build request: {0}")]
    Build(#[source] reqwest::Error),
    #[error("request timed out")]
    Timeout,
    #[error("request failed: {0}")]
    Network(#[source] reqwest::Error),
}
