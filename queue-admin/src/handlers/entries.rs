//! Admin/query surface handlers (spec.md §4.7, §6). Grounded on
//! `hook-producer::handlers::webhook`'s shape: small `Deserialize` request
//! structs, a `Serialize` response envelope, and an `internal_error`-style
//! helper for turning a `StoreError` into a response.

use std::collections::HashMap;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use queue_core::{
    submit_job, EntryPatch, JobStatus, Page, QueueEntry, QueueRunLog, QueueSnapshot, StoreError,
    SubmitError, SubmitRequest,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::state::AppState;

const DEFAULT_LIMIT: i64 = 50;
const MAX_LIMIT: i64 = 500;

#[derive(Debug, Deserialize, Default)]
pub struct PageQuery {
    pub status: Option<String>,
    pub offset: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct PageResponse<T: Serialize> {
    pub offset: i64,
    pub total: i64,
    pub result: Vec<T>,
}

impl<T: Serialize> From<Page<T>> for PageResponse<T> {
    fn from(page: Page<T>) -> Self {
        PageResponse {
            offset: page.offset,
            total: page.total,
            result: page.result,
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

fn bad_request(message: impl Into<String>) -> Response {
    (StatusCode::BAD_REQUEST, Json(ErrorBody { error: message.into() })).into_response()
}

fn store_error(error: StoreError) -> Response {
    tracing::error!(%error, "admin surface store error");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorBody { error: "internal error".into() }),
    )
        .into_response()
}

fn submit_error(error: SubmitError) -> Response {
    match error {
        SubmitError::Store(error) => store_error(error),
        other => bad_request(other.to_string()),
    }
}

fn parse_page(query: &PageQuery) -> Result<(Option<JobStatus>, i64, i64), Response> {
    let status = match &query.status {
        Some(raw) => Some(
            raw.parse::<JobStatus>()
                .map_err(|_| bad_request(format!("{raw:?} is not a known status")))?,
        ),
        None => None,
    };

    let offset = query.offset.unwrap_or(0);
    if offset < 0 {
        return Err(bad_request("offset must not be negative"));
    }

    let limit = query.limit.unwrap_or(DEFAULT_LIMIT);
    if limit <= 0 || limit > MAX_LIMIT {
        return Err(bad_request(format!("limit must be between 1 and {MAX_LIMIT}")));
    }

    Ok((status, offset, limit))
}

pub async fn list_entries(
    State(state): State<AppState>,
    Path(queue): Path<String>,
    Query(query): Query<PageQuery>,
) -> Response {
    let (status, offset, limit) = match parse_page(&query) {
        Ok(parsed) => parsed,
        Err(response) => return response,
    };

    match state.store.list_entries(&queue, status, offset, limit).await {
        Ok(page) => Json(PageResponse::<QueueEntry>::from(page)).into_response(),
        Err(error) => store_error(error),
    }
}

pub async fn get_entry(State(state): State<AppState>, Path((queue, id)): Path<(String, i64)>) -> Response {
    match state.store.get_entry(id).await {
        Ok(Some(entry)) if entry.queue_name == queue => Json(entry).into_response(),
        Ok(_) => (StatusCode::NOT_FOUND, Json(ErrorBody { error: "not found".into() })).into_response(),
        Err(error) => store_error(error),
    }
}

/// `POST /queue/{name}/{id}/lines`: every `QueueRunLog` row for this entry,
/// paginated the same way as `GET /queue/{name}`.
pub async fn lines(
    State(state): State<AppState>,
    Path((queue, id)): Path<(String, i64)>,
    body: Option<Json<PageQuery>>,
) -> Response {
    match state.store.get_entry(id).await {
        Ok(Some(entry)) if entry.queue_name == queue => {}
        Ok(_) => return (StatusCode::NOT_FOUND, Json(ErrorBody { error: "not found".into() })).into_response(),
        Err(error) => return store_error(error),
    }

    let query = body.map(|Json(query)| query).unwrap_or_default();
    let (_, offset, limit) = match parse_page(&query) {
        Ok(parsed) => parsed,
        Err(response) => return response,
    };

    match state.store.list_run_logs(id, offset, limit).await {
        Ok(page) => Json(PageResponse::<QueueRunLog>::from(page)).into_response(),
        Err(error) => store_error(error),
    }
}

/// `POST /queue/{name}/{id}/run`: force an entry to run on the scheduler's
/// next poll, regardless of its `next_try`. Only meaningful for entries
/// currently `Waiting`: an entry mid-dispatch (`Running`) or already
/// terminal is refused with `403` rather than silently ignored.
pub async fn run(State(state): State<AppState>, Path((queue, id)): Path<(String, i64)>) -> Response {
    let entry = match state.store.get_entry(id).await {
        Ok(Some(entry)) if entry.queue_name == queue => entry,
        Ok(_) => return (StatusCode::NOT_FOUND, Json(ErrorBody { error: "not found".into() })).into_response(),
        Err(error) => return store_error(error),
    };

    if entry.status != JobStatus::Waiting {
        return (
            StatusCode::FORBIDDEN,
            Json(ErrorBody {
                error: format!("entry is {:?}, not waiting", entry.status),
            }),
        )
            .into_response();
    }

    match state.store.force_retry_now(id, Utc::now()).await {
        Ok(true) => StatusCode::OK.into_response(),
        Ok(false) => (StatusCode::NOT_FOUND, Json(ErrorBody { error: "not found".into() })).into_response(),
        Err(error) => store_error(error),
    }
}

/// `GET /queues`: every running queue's declared config plus live readings.
pub async fn list_queues(State(state): State<AppState>) -> Response {
    match state.store.list_queue_snapshots().await {
        Ok(snapshots) => Json(snapshots).into_response(),
        Err(error) => store_error(error),
    }
}

#[derive(Debug, Deserialize)]
pub struct EntryBody {
    pub method: String,
    pub url: String,
    #[serde(default = "default_content_type")]
    pub content_type: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

fn default_content_type() -> String {
    "json".into()
}

/// `POST /queue/{name}`: insert, overriding whatever `queue_name` the body
/// might claim with the path segment.
pub async fn insert_entry(
    State(state): State<AppState>,
    Path(queue): Path<String>,
    body: Result<Json<EntryBody>, axum::extract::rejection::JsonRejection>,
) -> Response {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => return bad_request(rejection.to_string()),
    };

    let request = SubmitRequest {
        queue_name: queue,
        method: body.method,
        url: body.url,
        content_type: body.content_type,
        payload: body.payload,
        headers: body.headers,
        eta: None,
    };

    match submit_job(&state.store, request).await {
        Ok(id) => (StatusCode::OK, Json(serde_json::json!({ "id": id }))).into_response(),
        Err(error) => submit_error(error),
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct EntryPatchBody {
    pub method: Option<String>,
    pub url: Option<String>,
    pub content_type: Option<String>,
    pub payload: Option<Value>,
    pub headers: Option<HashMap<String, String>>,
}

/// `PUT /queue/{name}/{id}`: patch, stripping `QueueName` from the writable
/// set entirely (the path segment is the only source of truth for it).
pub async fn update_entry(
    State(state): State<AppState>,
    Path((queue, id)): Path<(String, i64)>,
    body: Result<Json<EntryPatchBody>, axum::extract::rejection::JsonRejection>,
) -> Response {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => return bad_request(rejection.to_string()),
    };

    let payload = match body.payload {
        Some(payload) => match serde_json::to_string(&payload) {
            Ok(text) => Some(text),
            Err(error) => return bad_request(format!("invalid payload: {error}")),
        },
        None => None,
    };
    let headers = match body.headers {
        Some(headers) => match serde_json::to_string(&headers) {
            Ok(text) => Some(text),
            Err(error) => return bad_request(format!("invalid headers: {error}")),
        },
        None => None,
    };
    let content_type = match body.content_type {
        Some(raw) => match queue_core::canonicalize_content_type(&raw) {
            Ok(content_type) => Some(content_type.header_value().to_owned()),
            Err(error) => return bad_request(error.to_string()),
        },
        None => None,
    };

    let patch = EntryPatch {
        method: body.method.map(|m| m.to_ascii_uppercase()),
        url: body.url,
        payload,
        headers,
        content_type,
    };

    match state.store.update_entry(&queue, id, patch).await {
        Ok(true) => StatusCode::OK.into_response(),
        Ok(false) => (StatusCode::NOT_FOUND, Json(ErrorBody { error: "not found".into() })).into_response(),
        Err(error) => store_error(error),
    }
}

/// `DELETE /queue/{name}/{id}`.
pub async fn delete_entry(State(state): State<AppState>, Path((queue, id)): Path<(String, i64)>) -> Response {
    match state.store.delete_entry(&queue, id).await {
        Ok(true) => StatusCode::OK.into_response(),
        Ok(false) => (StatusCode::NOT_FOUND, Json(ErrorBody { error: "not found".into() })).into_response(),
        Err(error) => store_error(error),
    }
}

/// `POST /queue/{name}/search`: same listing as `GET /queue/{name}`, with
/// the filter carried in the body instead of the query string.
pub async fn search_entries(
    State(state): State<AppState>,
    Path(queue): Path<String>,
    body: Option<Json<PageQuery>>,
) -> Response {
    let query = body.map(|Json(query)| query).unwrap_or_default();
    let (status, offset, limit) = match parse_page(&query) {
        Ok(parsed) => parsed,
        Err(response) => return response,
    };

    match state.store.list_entries(&queue, status, offset, limit).await {
        Ok(page) => Json(PageResponse::<QueueEntry>::from(page)).into_response(),
        Err(error) => store_error(error),
    }
}
