//! The dispatcher (spec.md §4.6): turns one claimed `QueueEntry` into an
//! HTTP request, sends it, and resolves the attempt to `Completed`,
//! `Waiting` (retry scheduled) or `Failed`.
//!
//! Grounded on `hook-worker::worker::WebhookWorker::send_webhook` and
//! `process_webhook_job`, but simplified per spec.md §4.6: any non-2xx
//! response is treated as a retryable failure with no special-casing of
//! status codes (the teacher only retries 429/5xx and fails the rest
//! immediately — a deliberate behavior change, not an oversight).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use queue_core::{
    build_request, canonicalize_content_type, compute_next_try, BackoffSpec, DispatchError,
    EncodeRequest, HttpMethod, QueueEntry, Store,
};

pub struct Dispatcher {
    pub store: Arc<Store>,
    pub client: reqwest::Client,
    pub backoff: BackoffSpec,
    pub max_retries: u32,
    pub max_processing_time: Duration,
    pub self_url: String,
    pub self_callback_header: String,
    pub self_callback_secret: String,
}

impl Dispatcher {
    pub async fn run(&self, entry: QueueEntry) {
        let started = Utc::now();
        let run_log_id = match self.store.start_run_log(&entry, started).await {
            Ok(id) => id,
            Err(error) => {
                tracing::error!(queue = %entry.queue_name, entry_id = entry.id, %error, "failed to open run log");
                return;
            }
        };

        let outcome = self.attempt(&entry).await;
        let finished = Utc::now();

        let result = match outcome {
            Ok(status_code) if (200..300).contains(&status_code) => {
                self.store
                    .complete(entry.id, run_log_id, finished, status_code, "OK")
                    .await
            }
            Ok(status_code) => {
                self.retry_or_fail(&entry, run_log_id, finished, Some(status_code), "non-2xx response")
                    .await
            }
            Err(error) => {
                self.retry_or_fail(&entry, run_log_id, finished, None, &error.to_string()).await
            }
        };

        if let Err(error) = result {
            tracing::error!(queue = %entry.queue_name, entry_id = entry.id, %error, "failed to record dispatch outcome");
        }
    }

    async fn retry_or_fail(
        &self,
        entry: &QueueEntry,
        run_log_id: i64,
        finished: chrono::DateTime<Utc>,
        status_code: Option<u16>,
        message: &str,
    ) -> Result<(), queue_core::StoreError> {
        let next_try = compute_next_try(
            &self.backoff,
            entry.retries as u32,
            self.max_retries,
            finished,
        );

        if next_try.is_none() {
            tracing::warn!(queue = %entry.queue_name, entry_id = entry.id, "entry exhausted its retries");
        }

        self.store
            .retry_or_fail(entry.id, run_log_id, finished, next_try, status_code, message)
            .await
    }

    /// Returns `Ok(status_code)` for any response the server sent. A
    /// non-2xx status is still `Ok`: failure here means no response ever
    /// came back at all (bad stored data, a refused connection, a timeout).
    async fn attempt(&self, entry: &QueueEntry) -> Result<u16, DispatchError> {
        let method: HttpMethod = entry
            .method
            .parse()
            .map_err(|_| DispatchError::UnknownMethod(entry.method.clone()))?;
        let content_type = canonicalize_content_type(&entry.content_type)?;
        let payload: serde_json::Value =
            serde_json::from_str(&entry.payload).map_err(DispatchError::BadPayload)?;
        let headers: HashMap<String, String> =
            serde_json::from_str(&entry.headers).map_err(DispatchError::BadHeaders)?;

        let (url, secret) = self.resolve_self_callback(&entry.url);

        let request = build_request(
            &self.client,
            EncodeRequest {
                method,
                url: &url,
                content_type,
                payload: &payload,
                headers: &headers,
                self_callback_secret: secret.as_ref().map(|(name, value)| (name.as_str(), value.as_str())),
            },
        )?
        .build()
        .map_err(DispatchError::Build)?;

        let response = tokio::time::timeout(self.max_processing_time, self.client.execute(request))
            .await
            .map_err(|_| DispatchError::Timeout)?
            .map_err(DispatchError::Network)?;

        Ok(response.status().as_u16())
    }

    /// Relative URLs (`/admin/callback`) are resolved against the
    /// configured self-url and get the shared-secret header attached;
    /// absolute URLs are dispatched as-is with no secret.
    fn resolve_self_callback(&self, url: &str) -> (String, Option<(String, String)>) {
        if let Some(rest) = url.strip_prefix('/') {
            let resolved = format!("{}/{}", self.self_url.trim_end_matches('/'), rest);
            (
                resolved,
                Some((self.self_callback_header.clone(), self.self_callback_secret.clone())),
            )
        } else {
            (url.to_owned(), None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dispatcher() -> Dispatcher {
        Dispatcher {
            store: Arc::new(Store::new(sqlx::SqlitePool::connect_lazy("sqlite::memory:").unwrap())),
            client: reqwest::Client::new(),
            backoff: BackoffSpec {
                initial: Duration::from_secs(1),
                mode: queue_core::BackoffMode::Linear,
                step: Duration::from_secs(1),
                max: Duration::from_secs(60),
            },
            max_retries: 5,
            max_processing_time: Duration::from_secs(5),
            self_url: "https://self.example.test".into(),
            self_callback_header: "X-Queue-Self-Callback".into(),
            self_callback_secret: "s3cret".into(),
        }
    }

    #[test]
    fn relative_urls_resolve_against_self_url_and_get_a_secret() {
        let (url, secret) = dispatcher().resolve_self_callback("/admin/callback");
        assert_eq!(url, "https://self.example.test/admin/callback");
        assert_eq!(
            secret,
            Some(("X-Queue-Self-Callback".to_string(), "s3cret".to_string()))
        );
    }

    #[test]
    fn absolute_urls_pass_through_with_no_secret() {
        let (url, secret) = dispatcher().resolve_self_callback("https://elsewhere.test/hook");
        assert_eq!(url, "https://elsewhere.test/hook");
        assert!(secret.is_none());
    }
}
