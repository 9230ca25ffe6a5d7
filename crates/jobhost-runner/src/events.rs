use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

const BROADCAST_CAPACITY: usize = 256;

/// One line of a run's console output, as shown to live viewers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobConsoleLogEvent {
    pub job_run_id: String,
    pub content: String,
    pub is_error: bool,
}

/// Fire-and-forget publication of live console events.
pub trait LiveEventBus: Send + Sync {
    fn publish(&self, event: JobConsoleLogEvent);
}

/// Fan-out of console events to every subscriber via a tokio broadcast channel.
pub struct BroadcastEventBus {
    tx: broadcast::Sender<JobConsoleLogEvent>,
}

impl BroadcastEventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobConsoleLogEvent> {
        self.tx.subscribe()
    }
}

impl Default for BroadcastEventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl LiveEventBus for BroadcastEventBus {
    /// Silently drops the event when nobody is subscribed.
    fn publish(&self, event: JobConsoleLogEvent) {
        let _ = self.tx.send(event);
    }
}
