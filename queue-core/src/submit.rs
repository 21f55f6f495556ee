//! `SubmitJob`: validates a caller-supplied request and inserts it as a
//! new `Waiting` `QueueEntry`.
//!
//! The out-of-scope HTTP server this queue sits behind is expected to
//! deserialize its own request body and call this function directly — the
//! admin/query surface is the only REST surface this crate itself owns.
//! Validation is grounded on `hook-producer::handlers::webhook`'s
//! `MAX_BODY_SIZE` check and its `url::Url::parse` based hostname
//! extraction, adapted into a library call instead of an axum handler.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::encode::canonicalize_content_type;
use crate::error::SubmitError;
use crate::store::{NewQueueEntry, Store};

/// Payload cap, grounded on `hook-producer`'s `MAX_BODY_SIZE` constant.
pub const MAX_PAYLOAD_BYTES: usize = 1_000_000;

pub struct SubmitRequest {
    pub queue_name: String,
    pub method: String,
    pub url: String,
    pub content_type: String,
    pub payload: Value,
    pub headers: HashMap<String, String>,
    pub eta: Option<DateTime<Utc>>,
}

pub async fn submit_job(store: &Store, request: SubmitRequest) -> Result<i64, SubmitError> {
    if request.method.trim().is_empty() {
        return Err(SubmitError::EmptyMethod);
    }

    let url = request.url.trim();
    if url.is_empty() {
        return Err(SubmitError::EmptyUrl);
    }
    // Relative self-callback URLs (leading `/`) are resolved at dispatch
    // time against the queue's configured self-url; only absolute URLs
    // are validated here.
    if !url.starts_with('/') {
        url::Url::parse(url).map_err(|_| SubmitError::EmptyUrl)?;
    }

    let content_type = canonicalize_content_type(&request.content_type)?;

    if content_type == crate::encode::ContentType::Bytes && !request.payload.is_string() {
        return Err(SubmitError::PayloadNotBytes);
    }

    let payload_text = serde_json::to_string(&request.payload).map_err(SubmitError::Encode)?;
    if payload_text.len() > MAX_PAYLOAD_BYTES {
        return Err(SubmitError::PayloadTooLarge(MAX_PAYLOAD_BYTES));
    }

    let headers_text = serde_json::to_string(&request.headers).map_err(SubmitError::Encode)?;

    let entry_id = store
        .submit(NewQueueEntry {
            queue_name: request.queue_name,
            method: request.method.trim().to_ascii_uppercase(),
            url: url.to_owned(),
            payload: payload_text,
            headers: headers_text,
            content_type: content_type.header_value().to_owned(),
            eta: request.eta.unwrap_or_else(Utc::now),
        })
        .await?;

    Ok(entry_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn test_store() -> Store {
        let pool = sqlx::SqlitePool::connect("sqlite::memory:").await.unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        Store::new(pool)
    }

    fn base_request() -> SubmitRequest {
        SubmitRequest {
            queue_name: "webhooks".into(),
            method: "POST".into(),
            url: "https://example.test/hook".into(),
            content_type: "json".into(),
            payload: json!({"hello": "world"}),
            headers: HashMap::new(),
            eta: None,
        }
    }

    #[tokio::test]
    async fn accepts_a_valid_submission() {
        let store = test_store().await;
        let id = submit_job(&store, base_request()).await.unwrap();
        let entry = store.get_entry(id).await.unwrap().unwrap();
        assert_eq!(entry.method, "POST");
        assert_eq!(entry.content_type, "application/json");
    }

    #[tokio::test]
    async fn rejects_empty_method() {
        let store = test_store().await;
        let mut request = base_request();
        request.method = "  ".into();
        assert!(matches!(
            submit_job(&store, request).await,
            Err(SubmitError::EmptyMethod)
        ));
    }

    #[tokio::test]
    async fn rejects_malformed_absolute_url() {
        let store = test_store().await;
        let mut request = base_request();
        request.url = "not a url".into();
        assert!(matches!(
            submit_job(&store, request).await,
            Err(SubmitError::EmptyUrl)
        ));
    }

    #[tokio::test]
    async fn accepts_relative_self_callback_url() {
        let store = test_store().await;
        let mut request = base_request();
        request.url = "/internal/callback".into();
        let id = submit_job(&store, request).await.unwrap();
        assert!(store.get_entry(id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn rejects_oversized_payload() {
        let store = test_store().await;
        let mut request = base_request();
        request.payload = json!({"data": "x".repeat(MAX_PAYLOAD_BYTES)});
        assert!(matches!(
            submit_job(&store, request).await,
            Err(SubmitError::PayloadTooLarge(_))
        ));
    }
}
