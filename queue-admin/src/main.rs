//! `queue-admin` binary: the admin/query REST surface (spec.md §4.7, §6)
//! for whatever queues share this process's database. Wiring mirrors
//! `hook-api::main` — load config, connect, build the router, serve.

mod handlers;
mod state;

use envconfig::Envconfig;
use queue_core::Store;
use tower_http::trace::TraceLayer;

use state::AppState;

#[derive(Envconfig, Debug)]
struct AdminConfig {
    #[envconfig(from = "QUEUE_DATABASE_URL", default = "sqlite://queue.db")]
    database_url: String,

    #[envconfig(from = "QUEUE_ADMIN_BIND_ADDR", default = "0.0.0.0:8081")]
    bind_addr: String,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let config = AdminConfig::init_from_env().expect("failed to load admin configuration");

    let connection = queue_core::shared_connection(&config.database_url)
        .await
        .expect("failed to connect to the queue database");
    let store = std::sync::Arc::new(Store::new(connection.pool().clone()));

    let app = handlers::router(AppState { store }).layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("failed to bind admin listener");

    tracing::info!(addr = %config.bind_addr, "queue-admin listening");

    axum::serve(listener, app)
        .await
        .expect("admin server crashed");
}
