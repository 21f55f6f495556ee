//! Shared types and persistence for the HTTP job queue: configuration,
//! the duration/rate/backoff grammar, the sliding-window rate limiter, the
//! guarded transaction wrapper, the `queue_entries`/`queue_run_logs` DAO,
//! the request encoder, and the ambient health/metrics plumbing every
//! queue process wires up at startup.

pub mod config;
pub mod duration;
pub mod encode;
pub mod error;
pub mod health;
pub mod metrics;
pub mod ratelimit;
pub mod retry;
pub mod store;
pub mod submit;
pub mod txguard;

pub use config::{Config, ResolvedConfig};
pub use duration::{BackoffMode, BackoffSpec, ParsedDuration, RateSpec};
pub use encode::{build_request, canonicalize_content_type, ContentType, EncodeRequest, HttpMethod};
pub use error::{ConfigError, DispatchError, StoreError, SubmitError};
pub use ratelimit::RateLimiter;
pub use retry::compute_next_try;
pub use store::{
    EntryPatch, JobStatus, NewQueueEntry, Page, QueueEntry, QueueRunLog, QueueSnapshot,
    QueueStatusUpdate, Store,
};
pub use submit::{submit_job, SubmitRequest, MAX_PAYLOAD_BYTES};
pub use txguard::{shared_connection, GuardedConnection};
