use std::sync::Arc;

use crate::{bridge::EventBridge, search::SearchHandle};

/// Shared application state injected into every Axum handler.
#[derive(Debug, Clone)]
pub struct AppState {
    pub search: SearchHandle,
    /// Keeps the coordinator's listener alive and feeds the WebSocket.
    pub bridge: Arc<EventBridge>,
}
