//! Capture event types and the event bus used to notify open views.
//!
//! The capture pipeline emits a [`CaptureEvent`] for every decision that is
//! interesting outside of it. Consumers (an open settings view, the CLI,
//! tests) subscribe independently; with no subscribers, events are dropped.

use serde::Serialize;
use tokio::sync::broadcast;

/// Event emitted by the capture pipeline.
///
/// Serialized as JSON with a `type` tag field, e.g.
/// `{"type":"MessageSaved","key":"..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum CaptureEvent {
    /// The settle delay elapsed and mutations are being processed.
    ObserverStarted { seeded_keys: usize },
    /// A new record was appended to the store.
    MessageSaved { key: String },
    /// A record was suppressed by the filter rules.
    MessageFiltered { key: String },
    /// A record equal to a stored one was dropped.
    MessageDuplicate { key: String },
    /// A candidate failed record validation and was not stored.
    MessageRejected { key: String, reason: String },
    /// Writing an accepted record failed; it stays in memory.
    SaveFailed { key: String, error: String },
    /// Compaction discarded the oldest records.
    MessagesCompacted { removed: usize, remaining: usize },
    /// An import merged new messages and rules.
    ImportCompleted {
        messages_added: usize,
        rules_added: usize,
    },
    /// The observer stopped after a shutdown signal.
    ObserverStopped,
}

impl CaptureEvent {
    /// Dot-namespaced event name (e.g. `"message.saved"`).
    pub fn event_type(&self) -> &'static str {
        match self {
            CaptureEvent::ObserverStarted { .. } => "observer.started",
            CaptureEvent::MessageSaved { .. } => "message.saved",
            CaptureEvent::MessageFiltered { .. } => "message.filtered",
            CaptureEvent::MessageDuplicate { .. } => "message.duplicate",
            CaptureEvent::MessageRejected { .. } => "message.rejected",
            CaptureEvent::SaveFailed { .. } => "message.save_failed",
            CaptureEvent::MessagesCompacted { .. } => "store.compacted",
            CaptureEvent::ImportCompleted { .. } => "store.imported",
            CaptureEvent::ObserverStopped => "observer.stopped",
        }
    }
}

/// Broadcast bus for capture events.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<CaptureEvent>,
}

impl EventBus {
    /// Create a new event bus with the given buffer capacity.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Emit an event to all subscribers.
    pub fn emit(&self, event: CaptureEvent) {
        tracing::trace!(
            event_type = event.event_type(),
            subscriber_count = self.tx.receiver_count(),
            "EventBus emit"
        );
        let _ = self.tx.send(event);
    }

    /// Subscribe to receive events. Each subscriber gets its own stream.
    pub fn subscribe(&self) -> broadcast::Receiver<CaptureEvent> {
        self.tx.subscribe()
    }

    /// Returns the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(crate::defaults::EVENT_BUS_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_event_bus_emit_subscribe() {
        let bus = EventBus::new(32);
        let mut rx = bus.subscribe();

        bus.emit(CaptureEvent::MessageSaved { key: "k".into() });

        let event = rx.recv().await.unwrap();
        assert_eq!(event, CaptureEvent::MessageSaved { key: "k".into() });
    }

    #[tokio::test]
    async fn test_event_bus_multiple_subscribers() {
        let bus = EventBus::new(32);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        bus.emit(CaptureEvent::ObserverStopped);

        assert_eq!(rx1.recv().await.unwrap(), CaptureEvent::ObserverStopped);
        assert_eq!(rx2.recv().await.unwrap(), CaptureEvent::ObserverStopped);
    }

    #[test]
    fn test_emit_without_subscribers_does_not_panic() {
        let bus = EventBus::default();
        bus.emit(CaptureEvent::ObserverStopped);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_rejection_is_distinct_from_save_failure() {
        let rejected = CaptureEvent::MessageRejected {
            key: "k".into(),
            reason: "time '昨天' is not a time of day".into(),
        };
        assert_eq!(rejected.event_type(), "message.rejected");
        assert_ne!(
            rejected.event_type(),
            CaptureEvent::SaveFailed {
                key: "k".into(),
                error: "disk full".into(),
            }
            .event_type()
        );
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = CaptureEvent::MessagesCompacted {
            removed: 5001,
            remaining: 5000,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "MessagesCompacted");
        assert_eq!(json["removed"], 5001);
        assert_eq!(event.event_type(), "store.compacted");
    }
}
