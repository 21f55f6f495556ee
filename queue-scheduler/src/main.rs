//! `queue-scheduler` binary: runs one queue's scheduler loop plus a tiny
//! health/metrics HTTP surface, following the wiring order
//! `hook-worker::main` uses (init tracing, load config, build health
//! registry, build the worker, spawn the HTTP surface, run the worker).

mod dispatcher;
mod registry;
mod scheduler;

use std::sync::Arc;
use std::time::Duration;

use axum::routing::get;
use axum::{Json, Router};
use envconfig::Envconfig;
use queue_core::health::HealthRegistry;
use queue_core::{Config, Store};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let config = Config::init_from_env()
        .expect("failed to load configuration from the environment")
        .resolve()
        .expect("invalid configuration");

    let connection = queue_core::shared_connection(&config.database_url)
        .await
        .expect("failed to connect to the queue database");
    let store = Arc::new(Store::new(connection.pool().clone()));

    let health = HealthRegistry::new();
    let liveness = health.handle_for(format!("{}-scheduler", config.queue_name));

    let client = reqwest::Client::builder()
        .timeout(config.max_processing_time)
        .user_agent(concat!("queue-scheduler/", env!("CARGO_PKG_VERSION")))
        .build()
        .expect("failed to build HTTP client");

    let dispatcher = Arc::new(dispatcher::Dispatcher {
        store: store.clone(),
        client,
        backoff: config.backoff,
        max_retries: config.max_retries,
        max_processing_time: config.max_processing_time,
        self_url: config.self_url.clone(),
        self_callback_header: config.self_callback_header.clone(),
        self_callback_secret: config.self_callback_secret.clone(),
    });

    let handle = registry::register(config.queue_name.clone());
    let admin_bind_addr = config.admin_bind_addr.clone();

    let scheduler = scheduler::Scheduler::new(store, config, dispatcher, liveness, handle);

    let app = Router::new()
        .route("/_liveness", get(move || async move { "ok" }))
        .route(
            "/_readiness",
            get({
                let health = Arc::new(health);
                move || {
                    let health = health.clone();
                    async move { Json(health.snapshot().await) }
                }
            }),
        )
        .merge(queue_core::metrics::router());

    let listener = tokio::net::TcpListener::bind(&admin_bind_addr)
        .await
        .expect("failed to bind health/metrics listener");

    tokio::spawn(async move {
        axum::serve(listener, app)
            .await
            .expect("health/metrics server crashed");
    });

    // A process that dies before its first successful poll still needs a
    // moment for the listener above to come up before the loop takes over.
    tokio::time::sleep(Duration::from_millis(1)).await;

    scheduler.run().await;
}
