//! Event sink that records every login for later inspection.

use async_trait::async_trait;
use tokio::sync::Mutex;

use lychgate_oidc::events::{EventSink, LoginEvent};

/// Captures login events in memory.
#[derive(Debug, Default)]
pub struct RecordingEventSink {
    events: Mutex<Vec<LoginEvent>>,
}

impl RecordingEventSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A snapshot of the recorded events, oldest first.
    pub async fn events(&self) -> Vec<LoginEvent> {
        self.events.lock().await.clone()
    }

    /// Number of recorded events.
    pub async fn len(&self) -> usize {
        self.events.lock().await.len()
    }

    /// Whether any event has been recorded.
    pub async fn is_empty(&self) -> bool {
        self.events.lock().await.is_empty()
    }
}

#[async_trait]
impl EventSink for RecordingEventSink {
    async fn user_logged_in(&self, event: &LoginEvent) {
        self.events.lock().await.push(event.clone());
    }
}
