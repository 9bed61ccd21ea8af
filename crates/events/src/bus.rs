//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`EventBus`] is shared via `Arc<EventBus>` across the service. Domain
//! notifications and operational alerts both travel over it.

use beacon_core::models::Notification;
use beacon_core::types::DbId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Event type used for operational alerts.
pub const OPS_ALERT: &str = "ops.alert";

// ---------------------------------------------------------------------------
// PlatformEvent
// ---------------------------------------------------------------------------

/// A domain event that occurred in the service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformEvent {
    /// Dot-separated event name, e.g. `"order.paid"`.
    pub event_type: String,

    /// Optional source entity kind (e.g. `"order"`, `"beacon"`).
    pub source_entity_type: Option<String>,

    pub source_entity_id: Option<DbId>,

    /// User that triggered the event.
    pub actor_user_id: Option<DbId>,

    /// User the event should be delivered to, if any.
    pub recipient_user_id: Option<DbId>,

    pub payload: serde_json::Value,

    pub timestamp: DateTime<Utc>,
}

impl PlatformEvent {
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            source_entity_type: None,
            source_entity_id: None,
            actor_user_id: None,
            recipient_user_id: None,
            payload: serde_json::Value::Object(Default::default()),
            timestamp: Utc::now(),
        }
    }

    /// An `ops.alert` event with the given alert name and detail.
    pub fn alert(alert: &str, detail: serde_json::Value) -> Self {
        Self::new(OPS_ALERT).with_payload(serde_json::json!({ "alert": alert, "detail": detail }))
    }

    pub fn with_source(mut self, entity_type: impl Into<String>, entity_id: DbId) -> Self {
        self.source_entity_type = Some(entity_type.into());
        self.source_entity_id = Some(entity_id);
        self
    }

    pub fn with_actor(mut self, user_id: DbId) -> Self {
        self.actor_user_id = Some(user_id);
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn is_alert(&self) -> bool {
        self.event_type == OPS_ALERT
    }
}

impl From<Notification> for PlatformEvent {
    fn from(n: Notification) -> Self {
        let mut event = PlatformEvent::new(n.kind).with_payload(n.payload);
        if let (Some(kind), Some(id)) = (n.source_entity_type, n.source_entity_id) {
            event = event.with_source(kind, id);
        }
        event.recipient_user_id = n.recipient_id;
        event
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

const DEFAULT_CAPACITY: usize = 1024;

/// In-process fan-out event bus.
///
/// ```rust
/// use beacon_events::bus::{EventBus, PlatformEvent};
///
/// let bus = EventBus::default();
/// let mut rx = bus.subscribe();
///
/// bus.publish(PlatformEvent::new("order.paid"));
/// ```
pub struct EventBus {
    sender: broadcast::Sender<PlatformEvent>,
}

impl EventBus {
    /// When the buffer is full the oldest un-consumed events are dropped and
    /// slow receivers observe `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish to all current subscribers. Dropped silently when nobody
    /// is subscribed.
    pub fn publish(&self, event: PlatformEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PlatformEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_and_receive_single_subscriber() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();

        bus.publish(
            PlatformEvent::new("order.paid")
                .with_source("order", 42)
                .with_actor(7)
                .with_payload(serde_json::json!({"total_cents": 2500})),
        );

        let received = rx.recv().await.expect("should receive the event");
        assert_eq!(received.event_type, "order.paid");
        assert_eq!(received.source_entity_type.as_deref(), Some("order"));
        assert_eq!(received.source_entity_id, Some(42));
        assert_eq!(received.actor_user_id, Some(7));
        assert_eq!(received.payload["total_cents"], 2500);
    }

    #[tokio::test]
    async fn multiple_subscribers_receive_same_event() {
        let bus = EventBus::default();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.publish(PlatformEvent::new("ticket.transferred"));

        assert_eq!(rx1.recv().await.unwrap().event_type, "ticket.transferred");
        assert_eq!(rx2.recv().await.unwrap().event_type, "ticket.transferred");
    }

    #[test]
    fn publish_with_no_subscribers_does_not_panic() {
        EventBus::default().publish(PlatformEvent::new("orphan.event"));
    }

    #[test]
    fn notification_converts_with_recipient_and_source() {
        let n = Notification::new("connection.requested")
            .to(9)
            .about("connection_request", 3)
            .with_payload(serde_json::json!({"from_user_id": 4}));

        let event = PlatformEvent::from(n);
        assert_eq!(event.event_type, "connection.requested");
        assert_eq!(event.recipient_user_id, Some(9));
        assert_eq!(event.source_entity_type.as_deref(), Some("connection_request"));
        assert_eq!(event.source_entity_id, Some(3));
        assert_eq!(event.payload["from_user_id"], 4);
        assert!(!event.is_alert());
    }

    #[test]
    fn alert_wraps_name_and_detail() {
        let event = PlatformEvent::alert("scan_event_write_failed", serde_json::json!("boom"));
        assert!(event.is_alert());
        assert_eq!(event.payload["alert"], "scan_event_write_failed");
        assert_eq!(event.payload["detail"], "boom");
    }
}
