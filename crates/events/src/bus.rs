//! In-process event bus backed by a `tokio::sync::broadcast` channel.

use gridsweep_manifest::{Cell, Meta};
use serde::Serialize;
use tokio::sync::broadcast;

/// Name under which the host message bus delivers dashboard updates.
pub const DASHBOARD_UPDATE_EVENT: &str = "gridsweep.update";

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 256;

/// Incremental dashboard payload, emitted exactly once per flush.
#[derive(Debug, Clone, Serialize)]
pub struct DashboardUpdate {
    /// Node instance identifier assigned by the host.
    pub node: String,
    pub session_name: String,
    /// Only the cells appended by this flush, newest first.
    pub new_items: Vec<Cell>,
    /// Current session meta (model/prompts/updated/seed map).
    pub meta: Meta,
}

/// Fan-out hub for [`DashboardUpdate`]s.
///
/// Any number of subscribers can independently receive every published
/// update. Publishing with zero subscribers silently drops the event;
/// the manifest on disk remains the durable record.
pub struct EventBus {
    sender: broadcast::Sender<DashboardUpdate>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DashboardUpdate> {
        self.sender.subscribe()
    }

    pub fn publish(&self, update: DashboardUpdate) {
        // SendError only means there are zero receivers.
        let _ = self.sender.send(update);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn update(n: usize) -> DashboardUpdate {
        DashboardUpdate {
            node: "7".into(),
            session_name: format!("s{n}"),
            new_items: Vec::new(),
            meta: Meta::default(),
        }
    }

    #[tokio::test]
    async fn subscribers_receive_in_order() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();
        bus.publish(update(1));
        bus.publish(update(2));
        assert_eq!(rx.recv().await.unwrap().session_name, "s1");
        assert_eq!(rx.recv().await.unwrap().session_name, "s2");
    }

    #[test]
    fn publish_without_subscribers_is_silent() {
        let bus = EventBus::default();
        bus.publish(update(1));
    }

    #[test]
    fn payload_serializes_without_items_wrapper() {
        let json = serde_json::to_value(update(1)).unwrap();
        assert!(json.get("new_items").is_some());
        assert!(json.get("items").is_none());
    }
}
