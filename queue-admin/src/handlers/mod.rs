pub mod entries;

use axum::routing::{get, post};
use axum::Router;

use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/queues", get(entries::list_queues))
        .route(
            "/queue/:queue",
            get(entries::list_entries).post(entries::insert_entry),
        )
        .route(
            "/queue/:queue/:id",
            get(entries::get_entry)
                .put(entries::update_entry)
                .delete(entries::delete_entry),
        )
        .route("/queue/:queue/search", post(entries::search_entries))
        .route("/queue/:queue/:id/run", post(entries::run))
        .route("/queue/:queue/:id/lines", post(entries::lines))
        .with_state(state)
}
