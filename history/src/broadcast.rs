//! Fan-out collaborator: the core publishes file-change events through
//! this trait and never depends on the eventual HTTP/WebSocket layer.

use chrono::DateTime;
use chrono::Utc;
use std::path::PathBuf;

use crate::watcher::WatchEventKind;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastEvent {
    pub event: WatchEventKind,
    pub file_path: PathBuf,
    pub project_id: String,
    pub timestamp: DateTime<Utc>,
}

#[async_trait::async_trait]
pub trait Broadcaster: Send + Sync {
    async fn publish(&self, event: BroadcastEvent);
}

/// In-memory broadcaster used by tests and by callers wiring up their own
/// fan-out later; records every published event in order.
#[derive(Default)]
pub struct RecordingBroadcaster {
    events: tokio::sync::Mutex<Vec<BroadcastEvent>>,
}

#[async_trait::async_trait]
impl Broadcaster for RecordingBroadcaster {
    async fn publish(&self, event: BroadcastEvent) {
        self.events.lock().await.push(event);
    }
}

impl RecordingBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn events(&self) -> Vec<BroadcastEvent> {
        self.events.lock().await.clone()
    }
}
