use std::sync::Arc;

use crate::db::JobStore;
use crate::services::queue::QueueManager;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: JobStore,
    pub queue: Arc<QueueManager>,
}

impl AppState {
    pub fn new(store: JobStore, queue: QueueManager) -> Self {
        Self {
            store,
            queue: Arc::new(queue),
        }
    }
}
