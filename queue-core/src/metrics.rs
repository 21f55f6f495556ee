//! Prometheus metrics plumbing, carried over from the shared webhook-worker
//! library's `metrics` module and generalized with the gauges/counters a
//! job queue needs: queue depth, dispatch latency, and attempt outcomes.

use std::future::ready;

use axum::extract::{MatchedPath, Request};
use axum::middleware::Next;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};

const LATENCY_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

fn setup_metrics_recorder() -> PrometheusHandle {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full("queue_dispatch_duration_seconds".to_string()),
            LATENCY_BUCKETS,
        )
        .unwrap()
        .install_recorder()
        .expect("failed to install Prometheus recorder")
}

pub fn router() -> Router {
    let handle = setup_metrics_recorder();
    Router::new().route(
        "/metrics",
        get(move || ready(handle.render().into_response())),
    )
}

/// Axum middleware that records request count and latency for every HTTP
/// handler it wraps, tagged by matched route and status code.
pub async fn track_metrics(req: Request, next: Next) -> impl IntoResponse {
    let path = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_owned())
        .unwrap_or_else(|| req.uri().path().to_owned());
    let method = req.method().clone();

    let start = tokio::time::Instant::now();
    let response = next.run(req).await;
    let latency = start.elapsed().as_secs_f64();
    let status = response.status().as_u16().to_string();

    let labels = [
        ("method", method.to_string()),
        ("path", path),
        ("status", status),
    ];

    metrics::counter!("http_requests_total", &labels).increment(1);
    metrics::histogram!("http_requests_duration_seconds", &labels).record(latency);

    response
}

/// Called once per dispatch attempt from the scheduler/dispatcher.
pub fn record_dispatch(queue_name: &str, outcome: &'static str, duration_seconds: f64) {
    let labels = [("queue", queue_name.to_owned()), ("outcome", outcome.to_owned())];
    metrics::histogram!("queue_dispatch_duration_seconds", &labels).record(duration_seconds);
    metrics::counter!("queue_dispatch_total", &labels).increment(1);
}

/// Called after every `claim_ready` poll with the queue's current depth.
pub fn record_queue_depth(queue_name: &str, waiting: u64) {
    let labels = [("queue", queue_name.to_owned())];
    metrics::gauge!("queue_depth", &labels).set(waiting as f64);
}
