//! Persistence schema & DAO (spec.md §3, §4.5 steps 1-2).
//!
//! `QueueEntry`/`QueueRunLog` mirror the row shapes `hook-common::pgqueue`
//! builds with its `Job<J, M>`/`NewJob`/`RetryableJob` structs, adapted from
//! Postgres's native enum + `JSONB` columns to SQLite `TEXT`: `JobStatus`
//! gets a manual `sqlx::Type` so it round-trips through a `TEXT` column the
//! same way a hand-rolled Postgres enum type would, and headers/payload are
//! stored as JSON text rather than `JSONB`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Sqlite, SqlitePool};

use crate::error::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Waiting,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    fn as_str(self) -> &'static str {
        match self {
            JobStatus::Waiting => "waiting",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "waiting" => Ok(JobStatus::Waiting),
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(format!("{other:?} is not a known job status")),
        }
    }
}

impl sqlx::Type<Sqlite> for JobStatus {
    fn type_info() -> <Sqlite as sqlx::Database>::TypeInfo {
        <String as sqlx::Type<Sqlite>>::type_info()
    }
}

impl<'q> sqlx::Encode<'q, Sqlite> for JobStatus {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
    ) -> sqlx::encode::IsNull {
        <&str as sqlx::Encode<'q, Sqlite>>::encode_by_ref(&self.as_str(), buf)
    }
}

impl<'r> sqlx::Decode<'r, Sqlite> for JobStatus {
    fn decode(value: sqlx::sqlite::SqliteValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let text = <&str as sqlx::Decode<Sqlite>>::decode(value)?;
        text.parse::<JobStatus>().map_err(Into::into)
    }
}

/// A queued HTTP request plus its retry bookkeeping. Column-for-column
/// match of `queue_entries`.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct QueueEntry {
    pub id: i64,
    pub queue_name: String,
    pub method: String,
    pub url: String,
    pub payload: String,
    pub headers: String,
    pub content_type: String,
    pub eta: DateTime<Utc>,
    pub next_try: DateTime<Utc>,
    pub last_tried: Option<DateTime<Utc>>,
    pub retries: i64,
    pub status: JobStatus,
}

/// The fields needed to submit a new job; `Store::submit` fills in the rest.
pub struct NewQueueEntry {
    pub queue_name: String,
    pub method: String,
    pub url: String,
    pub payload: String,
    pub headers: String,
    pub content_type: String,
    pub eta: DateTime<Utc>,
}

/// One row of dispatch history for a `QueueEntry`.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct QueueRunLog {
    pub id: i64,
    pub task_id: i64,
    pub queue_name: String,
    pub method: String,
    pub url: String,
    pub content_type: String,
    pub started: DateTime<Utc>,
    pub finished: Option<DateTime<Utc>>,
    pub result: Option<String>,
    pub status_code: Option<i64>,
    pub status_message: Option<String>,
}

/// A page of admin-surface results, matching spec.md §6's
/// `{offset, total, result}` envelope.
pub struct Page<T> {
    pub offset: i64,
    pub total: i64,
    pub result: Vec<T>,
}

/// The declared config half of a queue's `GET /queues` snapshot, reported
/// by the owning `queue-scheduler` process via `upsert_queue_status`.
pub struct QueueStatusUpdate {
    pub queue_name: String,
    pub description: Option<String>,
    pub rate_limit: String,
    pub backoff: String,
    pub concurrency: i64,
    pub max_retries: i64,
    pub current_rate: f64,
    pub running_count: i64,
    pub runner_active: bool,
    pub crash_message: Option<String>,
}

#[derive(Debug, Clone, FromRow)]
struct QueueStatusRow {
    queue_name: String,
    description: Option<String>,
    rate_limit: String,
    backoff: String,
    concurrency: i64,
    max_retries: i64,
    current_rate: f64,
    running_count: i64,
    runner_active: i64,
    crash_message: Option<String>,
    pending_size: i64,
}

/// Declared config plus live readings for one queue, spec.md §4.7's
/// `GET /queues` snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct QueueSnapshot {
    pub name: String,
    pub description: Option<String>,
    pub rate_limit: String,
    pub backoff: String,
    pub concurrency: i64,
    pub max_retries: i64,
    pub current_rate: f64,
    pub running_count: i64,
    pub runner_active: bool,
    pub crash_message: Option<String>,
    pub pending_size: i64,
}

impl From<QueueStatusRow> for QueueSnapshot {
    fn from(row: QueueStatusRow) -> Self {
        QueueSnapshot {
            name: row.queue_name,
            description: row.description,
            rate_limit: row.rate_limit,
            backoff: row.backoff,
            concurrency: row.concurrency,
            max_retries: row.max_retries,
            current_rate: row.current_rate,
            running_count: row.running_count,
            runner_active: row.runner_active != 0,
            crash_message: row.crash_message,
            pending_size: row.pending_size,
        }
    }
}

/// The fields an admin `POST`/`PUT` may set; `QueueName` is always forced
/// to the path segment per spec.md §4.7.
pub struct EntryPatch {
    pub method: Option<String>,
    pub url: Option<String>,
    pub payload: Option<String>,
    pub headers: Option<String>,
    pub content_type: Option<String>,
}

/// The DAO: every query the scheduler, dispatcher and admin surface issue
/// against `queue_entries`/`queue_run_logs`.
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Insert a new entry in `Waiting` status with zero retries.
    pub async fn submit(&self, entry: NewQueueEntry) -> Result<i64, StoreError> {
        let row: (i64,) = sqlx::query_as(
            r#"
            INSERT INTO queue_entries
                (queue_name, method, url, payload, headers, content_type, eta, next_try, retries, status)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, 0, ?)
            RETURNING id
            "#,
        )
        .bind(&entry.queue_name)
        .bind(&entry.method)
        .bind(&entry.url)
        .bind(&entry.payload)
        .bind(&entry.headers)
        .bind(&entry.content_type)
        .bind(entry.eta)
        .bind(entry.eta)
        .bind(JobStatus::Waiting.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|error| StoreError::query("INSERT queue_entries", error))?;

        Ok(row.0)
    }

    /// Claim up to `limit` `Waiting` entries whose `next_try` has elapsed,
    /// marking them `Running`. Ordered oldest-`next_try`-first so the
    /// scheduler drains the backlog fairly, matching the `ORDER BY` in
    /// `hook-common::pgqueue`'s dequeue CTE.
    pub async fn claim_ready(
        &self,
        queue_name: &str,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<QueueEntry>, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|error| StoreError::query("BEGIN", error))?;

        let candidates: Vec<QueueEntry> = sqlx::query_as(
            r#"
            SELECT id, queue_name, method, url, payload, headers, content_type,
                   eta, next_try, last_tried, retries, status
            FROM queue_entries
            WHERE queue_name = ? AND status = ? AND next_try <= ?
            ORDER BY next_try ASC
            LIMIT ?
            "#,
        )
        .bind(queue_name)
        .bind(JobStatus::Waiting.as_str())
        .bind(now)
        .bind(limit)
        .fetch_all(&mut *tx)
        .await
        .map_err(|error| StoreError::query("SELECT ready", error))?;

        for candidate in &candidates {
            sqlx::query("UPDATE queue_entries SET status = ?, last_tried = ? WHERE id = ?")
                .bind(JobStatus::Running.as_str())
                .bind(now)
                .bind(candidate.id)
                .execute(&mut *tx)
                .await
                .map_err(|error| StoreError::query("UPDATE claim", error))?;
        }

        tx.commit()
            .await
            .map_err(|error| StoreError::query("COMMIT", error))?;

        Ok(candidates)
    }

    /// Mark an entry `Completed` and append the closing run-log row.
    pub async fn complete(
        &self,
        entry_id: i64,
        run_log_id: i64,
        finished: DateTime<Utc>,
        status_code: u16,
        status_message: &str,
    ) -> Result<(), StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|error| StoreError::query("BEGIN", error))?;

        sqlx::query("UPDATE queue_entries SET status = ? WHERE id = ?")
            .bind(JobStatus::Completed.as_str())
            .bind(entry_id)
            .execute(&mut *tx)
            .await
            .map_err(|error| StoreError::query("UPDATE complete", error))?;

        sqlx::query(
            "UPDATE queue_run_logs SET finished = ?, status_code = ?, status_message = ? WHERE id = ?",
        )
        .bind(finished)
        .bind(status_code as i64)
        .bind(status_message)
        .bind(run_log_id)
        .execute(&mut *tx)
        .await
        .map_err(|error| StoreError::query("UPDATE run_log", error))?;

        tx.commit()
            .await
            .map_err(|error| StoreError::query("COMMIT", error))
    }

    /// Re-queue an entry for another attempt at `next_try`, or mark it
    /// `Failed` if `next_try` is `None` (retries exhausted).
    pub async fn retry_or_fail(
        &self,
        entry_id: i64,
        run_log_id: i64,
        finished: DateTime<Utc>,
        next_try: Option<DateTime<Utc>>,
        status_code: Option<u16>,
        status_message: &str,
    ) -> Result<(), StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|error| StoreError::query("BEGIN", error))?;

        match next_try {
            Some(next_try) => {
                sqlx::query(
                    "UPDATE queue_entries SET status = ?, next_try = ?, retries = retries + 1 WHERE id = ?",
                )
                .bind(JobStatus::Waiting.as_str())
                .bind(next_try)
                .bind(entry_id)
                .execute(&mut *tx)
                .await
                .map_err(|error| StoreError::query("UPDATE retry", error))?;
            }
            None => {
                sqlx::query(
                    "UPDATE queue_entries SET status = ?, retries = retries + 1 WHERE id = ?",
                )
                .bind(JobStatus::Failed.as_str())
                .bind(entry_id)
                .execute(&mut *tx)
                .await
                .map_err(|error| StoreError::query("UPDATE fail", error))?;
            }
        }

        sqlx::query(
            "UPDATE queue_run_logs SET finished = ?, status_code = ?, status_message = ? WHERE id = ?",
        )
        .bind(finished)
        .bind(status_code.map(|c| c as i64))
        .bind(status_message)
        .bind(run_log_id)
        .execute(&mut *tx)
        .await
        .map_err(|error| StoreError::query("UPDATE run_log", error))?;

        tx.commit()
            .await
            .map_err(|error| StoreError::query("COMMIT", error))
    }

    /// Open a run-log row for a dispatch attempt about to start, returning
    /// its id for the later `complete`/`retry_or_fail` call.
    pub async fn start_run_log(
        &self,
        entry: &QueueEntry,
        started: DateTime<Utc>,
    ) -> Result<i64, StoreError> {
        let row: (i64,) = sqlx::query_as(
            r#"
            INSERT INTO queue_run_logs (task_id, queue_name, method, url, content_type, started)
            VALUES (?, ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(entry.id)
        .bind(&entry.queue_name)
        .bind(&entry.method)
        .bind(&entry.url)
        .bind(&entry.content_type)
        .bind(started)
        .fetch_one(&self.pool)
        .await
        .map_err(|error| StoreError::query("INSERT run_log", error))?;

        Ok(row.0)
    }

    /// Reclaim `Running` entries whose `last_tried` predates `cutoff` back
    /// to `Waiting`, so a process that died mid-dispatch doesn't leave rows
    /// stuck forever (spec.md §9's completion-update-failure open question).
    pub async fn reap_stale_running(
        &self,
        queue_name: &str,
        cutoff: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "UPDATE queue_entries SET status = ?, next_try = ? WHERE queue_name = ? AND status = ? AND last_tried < ?",
        )
        .bind(JobStatus::Waiting.as_str())
        .bind(now)
        .bind(queue_name)
        .bind(JobStatus::Running.as_str())
        .bind(cutoff)
        .execute(&self.pool)
        .await
        .map_err(|error| StoreError::query("UPDATE reap", error))?;

        Ok(result.rows_affected())
    }

    /// Delete terminal (`Completed`/`Failed`) entries older than `cutoff`,
    /// the pruning step folded into the scheduler loop.
    pub async fn prune_terminal(
        &self,
        queue_name: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"
            DELETE FROM queue_entries
            WHERE queue_name = ?
              AND status IN (?, ?)
              AND last_tried IS NOT NULL
              AND last_tried < ?
            "#,
        )
        .bind(queue_name)
        .bind(JobStatus::Completed.as_str())
        .bind(JobStatus::Failed.as_str())
        .bind(cutoff)
        .execute(&self.pool)
        .await
        .map_err(|error| StoreError::query("DELETE terminal", error))?;

        Ok(result.rows_affected())
    }

    /// A page of entries for the admin surface, most recent first.
    pub async fn list_entries(
        &self,
        queue_name: &str,
        status: Option<JobStatus>,
        offset: i64,
        limit: i64,
    ) -> Result<Page<QueueEntry>, StoreError> {
        let total: i64 = match status {
            Some(status) => {
                sqlx::query_scalar("SELECT COUNT(*) FROM queue_entries WHERE queue_name = ? AND status = ?")
                    .bind(queue_name)
                    .bind(status.as_str())
                    .fetch_one(&self.pool)
                    .await
            }
            None => {
                sqlx::query_scalar("SELECT COUNT(*) FROM queue_entries WHERE queue_name = ?")
                    .bind(queue_name)
                    .fetch_one(&self.pool)
                    .await
            }
        }
        .map_err(|error| StoreError::query("COUNT entries", error))?;

        let result: Vec<QueueEntry> = match status {
            Some(status) => {
                sqlx::query_as(
                    r#"
                    SELECT id, queue_name, method, url, payload, headers, content_type,
                           eta, next_try, last_tried, retries, status
                    FROM queue_entries
                    WHERE queue_name = ? AND status = ?
                    ORDER BY id DESC
                    LIMIT ? OFFSET ?
                    "#,
                )
                .bind(queue_name)
                .bind(status.as_str())
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query_as(
                    r#"
                    SELECT id, queue_name, method, url, payload, headers, content_type,
                           eta, next_try, last_tried, retries, status
                    FROM queue_entries
                    WHERE queue_name = ?
                    ORDER BY id DESC
                    LIMIT ? OFFSET ?
                    "#,
                )
                .bind(queue_name)
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.pool)
                .await
            }
        }
        .map_err(|error| StoreError::query("SELECT entries", error))?;

        Ok(Page {
            offset,
            total,
            result,
        })
    }

    pub async fn get_entry(&self, entry_id: i64) -> Result<Option<QueueEntry>, StoreError> {
        sqlx::query_as(
            r#"
            SELECT id, queue_name, method, url, payload, headers, content_type,
                   eta, next_try, last_tried, retries, status
            FROM queue_entries
            WHERE id = ?
            "#,
        )
        .bind(entry_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| StoreError::query("SELECT entry", error))
    }

    pub async fn list_run_logs(
        &self,
        task_id: i64,
        offset: i64,
        limit: i64,
    ) -> Result<Page<QueueRunLog>, StoreError> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM queue_run_logs WHERE task_id = ?")
            .bind(task_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|error| StoreError::query("COUNT run_logs", error))?;

        let result: Vec<QueueRunLog> = sqlx::query_as(
            r#"
            SELECT id, task_id, queue_name, method, url, content_type,
                   started, finished, result, status_code, status_message
            FROM queue_run_logs
            WHERE task_id = ?
            ORDER BY id DESC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(task_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|error| StoreError::query("SELECT run_logs", error))?;

        Ok(Page {
            offset,
            total,
            result,
        })
    }

    /// Force an entry to be retried immediately regardless of its current
    /// `next_try`, the admin-surface counterpart of a scheduler force-start.
    pub async fn force_retry_now(&self, entry_id: i64, now: DateTime<Utc>) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE queue_entries SET next_try = ? WHERE id = ? AND status = ?",
        )
        .bind(now)
        .bind(entry_id)
        .bind(JobStatus::Waiting.as_str())
        .execute(&self.pool)
        .await
        .map_err(|error| StoreError::query("UPDATE force_retry", error))?;

        Ok(result.rows_affected() > 0)
    }

    /// Claim a specific `Waiting` entry straight to `Running`, bypassing the
    /// ordering `claim_ready` applies: the scheduler's force-run path uses
    /// this to dispatch an entry immediately without waiting for capacity
    /// or rate-limiter headroom, per spec.md §4.5's force-start step.
    pub async fn claim_forced(
        &self,
        entry_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Option<QueueEntry>, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|error| StoreError::query("BEGIN", error))?;

        let candidate: Option<QueueEntry> = sqlx::query_as(
            r#"
            SELECT id, queue_name, method, url, payload, headers, content_type,
                   eta, next_try, last_tried, retries, status
            FROM queue_entries
            WHERE id = ? AND status = ?
            "#,
        )
        .bind(entry_id)
        .bind(JobStatus::Waiting.as_str())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|error| StoreError::query("SELECT forced", error))?;

        if candidate.is_some() {
            sqlx::query("UPDATE queue_entries SET status = ?, last_tried = ? WHERE id = ?")
                .bind(JobStatus::Running.as_str())
                .bind(now)
                .bind(entry_id)
                .execute(&mut *tx)
                .await
                .map_err(|error| StoreError::query("UPDATE claim_forced", error))?;
        }

        tx.commit()
            .await
            .map_err(|error| StoreError::query("COMMIT", error))?;

        Ok(candidate)
    }

    /// Record this queue's declared config and live readings for the
    /// `GET /queues` admin snapshot. Called once per scheduler poll tick;
    /// an `UPSERT` since the row is created by the first tick after startup.
    pub async fn upsert_queue_status(&self, status: &QueueStatusUpdate, now: DateTime<Utc>) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO queue_status
                (queue_name, description, rate_limit, backoff, concurrency, max_retries,
                 current_rate, running_count, runner_active, crash_message, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(queue_name) DO UPDATE SET
                description = excluded.description,
                rate_limit = excluded.rate_limit,
                backoff = excluded.backoff,
                concurrency = excluded.concurrency,
                max_retries = excluded.max_retries,
                current_rate = excluded.current_rate,
                running_count = excluded.running_count,
                runner_active = excluded.runner_active,
                crash_message = excluded.crash_message,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&status.queue_name)
        .bind(&status.description)
        .bind(&status.rate_limit)
        .bind(&status.backoff)
        .bind(status.concurrency)
        .bind(status.max_retries)
        .bind(status.current_rate)
        .bind(status.running_count)
        .bind(status.runner_active as i64)
        .bind(&status.crash_message)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|error| StoreError::query("UPSERT queue_status", error))?;

        Ok(())
    }

    /// Every queue's snapshot for `GET /queues`, pending size computed live
    /// against `queue_entries` rather than cached on the status row.
    pub async fn list_queue_snapshots(&self) -> Result<Vec<QueueSnapshot>, StoreError> {
        let rows: Vec<QueueStatusRow> = sqlx::query_as(
            r#"
            SELECT
                qs.queue_name, qs.description, qs.rate_limit, qs.backoff, qs.concurrency,
                qs.max_retries, qs.current_rate, qs.running_count, qs.runner_active,
                qs.crash_message,
                (SELECT COUNT(*) FROM queue_entries qe
                 WHERE qe.queue_name = qs.queue_name AND qe.status = 'waiting') AS pending_size
            FROM queue_status qs
            ORDER BY qs.queue_name
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|error| StoreError::query("SELECT queue_status", error))?;

        Ok(rows.into_iter().map(QueueSnapshot::from).collect())
    }

    /// Patch an entry for the admin `PUT /queue/{name}/{id}` route.
    /// `QueueName` can never change: only the fields in `EntryPatch` are
    /// writable. Returns `false` if no row with this id exists in this queue.
    pub async fn update_entry(
        &self,
        queue_name: &str,
        entry_id: i64,
        patch: EntryPatch,
    ) -> Result<bool, StoreError> {
        let existing = match self.get_entry(entry_id).await? {
            Some(entry) if entry.queue_name == queue_name => entry,
            _ => return Ok(false),
        };

        let result = sqlx::query(
            "UPDATE queue_entries SET method = ?, url = ?, payload = ?, headers = ?, content_type = ? WHERE id = ?",
        )
        .bind(patch.method.unwrap_or(existing.method))
        .bind(patch.url.unwrap_or(existing.url))
        .bind(patch.payload.unwrap_or(existing.payload))
        .bind(patch.headers.unwrap_or(existing.headers))
        .bind(patch.content_type.unwrap_or(existing.content_type))
        .bind(entry_id)
        .execute(&self.pool)
        .await
        .map_err(|error| StoreError::query("UPDATE entry", error))?;

        Ok(result.rows_affected() > 0)
    }

    /// Delete an entry for the admin `DELETE /queue/{name}/{id}` route.
    /// Also deletes its run-log rows, the same cascade `prune_terminal`
    /// relies on the caller to have already done for time-based pruning.
    pub async fn delete_entry(&self, queue_name: &str, entry_id: i64) -> Result<bool, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|error| StoreError::query("BEGIN", error))?;

        let result = sqlx::query("DELETE FROM queue_entries WHERE id = ? AND queue_name = ?")
            .bind(entry_id)
            .bind(queue_name)
            .execute(&mut *tx)
            .await
            .map_err(|error| StoreError::query("DELETE entry", error))?;

        if result.rows_affected() > 0 {
            sqlx::query("DELETE FROM queue_run_logs WHERE task_id = ?")
                .bind(entry_id)
                .execute(&mut *tx)
                .await
                .map_err(|error| StoreError::query("DELETE run_logs", error))?;
        }

        tx.commit()
            .await
            .map_err(|error| StoreError::query("COMMIT", error))?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    async fn test_store() -> Store {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        Store::new(pool)
    }

    #[tokio::test]
    async fn submit_then_claim_ready() {
        let store = test_store().await;
        let now = Utc::now();

        let id = store
            .submit(NewQueueEntry {
                queue_name: "webhooks".into(),
                method: "POST".into(),
                url: "https://example.test/hook".into(),
                payload: "{}".into(),
                headers: "{}".into(),
                content_type: "application/json".into(),
                eta: now,
            })
            .await
            .unwrap();

        let claimed = store.claim_ready("webhooks", now, 10).await.unwrap();
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].id, id);
        assert_eq!(claimed[0].status, JobStatus::Running);

        let again = store.claim_ready("webhooks", now, 10).await.unwrap();
        assert!(again.is_empty());
    }

    #[tokio::test]
    async fn complete_marks_entry_and_run_log() {
        let store = test_store().await;
        let now = Utc::now();

        let id = store
            .submit(NewQueueEntry {
                queue_name: "webhooks".into(),
                method: "POST".into(),
                url: "https://example.test/hook".into(),
                payload: "{}".into(),
                headers: "{}".into(),
                content_type: "application/json".into(),
                eta: now,
            })
            .await
            .unwrap();
        let entry = store.claim_ready("webhooks", now, 10).await.unwrap().remove(0);
        let run_log_id = store.start_run_log(&entry, now).await.unwrap();

        store
            .complete(id, run_log_id, now, 200, "OK")
            .await
            .unwrap();

        let entry = store.get_entry(id).await.unwrap().unwrap();
        assert_eq!(entry.status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn retry_requeues_until_exhausted_then_fails() {
        let store = test_store().await;
        let now = Utc::now();

        let id = store
            .submit(NewQueueEntry {
                queue_name: "webhooks".into(),
                method: "POST".into(),
                url: "https://example.test/hook".into(),
                payload: "{}".into(),
                headers: "{}".into(),
                content_type: "application/json".into(),
                eta: now,
            })
            .await
            .unwrap();
        let entry = store.claim_ready("webhooks", now, 10).await.unwrap().remove(0);
        let run_log_id = store.start_run_log(&entry, now).await.unwrap();

        let later = now + ChronoDuration::seconds(30);
        store
            .retry_or_fail(id, run_log_id, now, Some(later), Some(500), "server error")
            .await
            .unwrap();
        let entry = store.get_entry(id).await.unwrap().unwrap();
        assert_eq!(entry.status, JobStatus::Waiting);
        assert_eq!(entry.retries, 1);

        let run_log_id = store.start_run_log(&entry, later).await.unwrap();
        store
            .retry_or_fail(id, run_log_id, later, None, Some(500), "server error")
            .await
            .unwrap();
        let entry = store.get_entry(id).await.unwrap().unwrap();
        assert_eq!(entry.status, JobStatus::Failed);
        assert_eq!(entry.retries, 2);
    }

    #[tokio::test]
    async fn reap_stale_running_returns_entries_to_waiting() {
        let store = test_store().await;
        let now = Utc::now();

        let id = store
            .submit(NewQueueEntry {
                queue_name: "webhooks".into(),
                method: "POST".into(),
                url: "https://example.test/hook".into(),
                payload: "{}".into(),
                headers: "{}".into(),
                content_type: "application/json".into(),
                eta: now,
            })
            .await
            .unwrap();
        store.claim_ready("webhooks", now, 10).await.unwrap();

        let much_later = now + ChronoDuration::hours(1);
        let reaped = store
            .reap_stale_running("webhooks", much_later - ChronoDuration::minutes(1), much_later)
            .await
            .unwrap();
        assert_eq!(reaped, 1);

        let entry = store.get_entry(id).await.unwrap().unwrap();
        assert_eq!(entry.status, JobStatus::Waiting);
    }

    #[tokio::test]
    async fn list_entries_paginates_and_filters_by_status() {
        let store = test_store().await;
        let now = Utc::now();

        for _ in 0..3 {
            store
                .submit(NewQueueEntry {
                    queue_name: "webhooks".into(),
                    method: "POST".into(),
                    url: "https://example.test/hook".into(),
                    payload: "{}".into(),
                    headers: "{}".into(),
                    content_type: "application/json".into(),
                    eta: now,
                })
                .await
                .unwrap();
        }

        let page = store
            .list_entries("webhooks", Some(JobStatus::Waiting), 0, 2)
            .await
            .unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.result.len(), 2);
    }
}
