use tokio::sync::broadcast;
use uuid::Uuid;

use crate::{
    models::{Movie, SearchEvent},
    search::SearchListener,
};

/// Relays coordinator callbacks to WebSocket subscribers.
///
/// The coordinator only holds a weak reference to this; once the last
/// `AppState` is gone its events are silently dropped.
#[derive(Debug)]
pub struct EventBridge {
    events: broadcast::Sender<SearchEvent>,
}

impl EventBridge {
    pub fn new(capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity);
        Self { events }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SearchEvent> {
        self.events.subscribe()
    }

    fn send(&self, event: SearchEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

impl SearchListener for EventBridge {
    fn on_search_started(&self, session_id: Uuid, query: &str) {
        self.send(SearchEvent::SearchStarted {
            session_id,
            query: query.to_string(),
        });
    }

    fn on_results_ready(&self, session_id: Uuid, results: &[Movie]) {
        self.send(SearchEvent::ResultsReady {
            session_id,
            results: results.to_vec(),
        });
    }

    fn on_not_found(&self, session_id: Uuid) {
        self.send(SearchEvent::NotFound { session_id });
    }

    fn on_error(&self, session_id: Uuid, message: &str) {
        self.send(SearchEvent::Error {
            session_id,
            message: message.to_string(),
        });
    }

    fn on_search_ended(&self, session_id: Uuid) {
        self.send(SearchEvent::SearchEnded { session_id });
    }
}
