use std::sync::Arc;

use queue_core::Store;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Store>,
}
