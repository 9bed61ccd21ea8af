//! Asynchronous scan event log.
//!
//! [`ScanEventLog`] implements the core `ScanEventSink` port. `record`
//! hands the event to a bounded channel and returns immediately; a single
//! writer task inserts events through a `ScanEventStore`, retrying with
//! backoff. An event that still cannot be written is logged at `error`
//! and raised as an `ops.alert` on the bus, never dropped silently.

use std::sync::Arc;
use std::time::Duration;

use beacon_core::models::ScanEvent;
use beacon_core::ports::{ScanEventSink, ScanEventStore};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::bus::{EventBus, PlatformEvent};

const CHANNEL_CAPACITY: usize = 4096;

/// Backoff between write attempts; one attempt more than delays.
const RETRY_DELAYS: [Duration; 3] = [
    Duration::from_millis(100),
    Duration::from_millis(500),
    Duration::from_secs(2),
];

/// Sender half of the scan event log. Cheap to clone.
#[derive(Clone)]
pub struct ScanEventLog {
    sender: mpsc::Sender<ScanEvent>,
    bus: Arc<EventBus>,
}

impl ScanEventLog {
    /// Start the writer task with the default retry schedule.
    ///
    /// The task drains every queued event and exits once all senders are
    /// dropped, so awaiting the handle at shutdown flushes the log.
    pub fn spawn(store: Arc<dyn ScanEventStore>, bus: Arc<EventBus>) -> (Self, JoinHandle<()>) {
        Self::spawn_with_retry(store, bus, RETRY_DELAYS.to_vec())
    }

    pub fn spawn_with_retry(
        store: Arc<dyn ScanEventStore>,
        bus: Arc<EventBus>,
        retry_delays: Vec<Duration>,
    ) -> (Self, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(CHANNEL_CAPACITY);
        let writer = Writer { store, bus: bus.clone(), retry_delays };
        let handle = tokio::spawn(writer.run(receiver));
        (Self { sender, bus }, handle)
    }

    fn lost(&self, event: &ScanEvent, reason: &str) {
        tracing::error!(
            beacon_id = event.beacon_id,
            action = %event.action,
            reason,
            "Scan event could not be queued"
        );
        self.bus.publish(PlatformEvent::alert(
            "scan_event_lost",
            serde_json::json!({ "beacon_id": event.beacon_id, "reason": reason }),
        ));
    }
}

impl ScanEventSink for ScanEventLog {
    fn record(&self, event: ScanEvent) {
        match self.sender.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                // Queue saturated: hand off to a task so the caller never waits.
                tracing::warn!(beacon_id = event.beacon_id, "Scan event queue full, deferring");
                let log = self.clone();
                tokio::spawn(async move {
                    if let Err(mpsc::error::SendError(event)) = log.sender.send(event).await {
                        log.lost(&event, "writer stopped");
                    }
                });
            }
            Err(mpsc::error::TrySendError::Closed(event)) => self.lost(&event, "writer stopped"),
        }
    }
}

struct Writer {
    store: Arc<dyn ScanEventStore>,
    bus: Arc<EventBus>,
    retry_delays: Vec<Duration>,
}

impl Writer {
    async fn run(self, mut receiver: mpsc::Receiver<ScanEvent>) {
        while let Some(event) = receiver.recv().await {
            self.write(event).await;
        }
        tracing::info!("Scan event log closed");
    }

    async fn write(&self, event: ScanEvent) {
        let mut delays = self.retry_delays.iter();
        loop {
            match self.store.insert(&event).await {
                Ok(id) => {
                    tracing::trace!(scan_event_id = id, beacon_id = event.beacon_id, "Scan event stored");
                    return;
                }
                Err(e) => match delays.next() {
                    Some(delay) => {
                        tracing::warn!(
                            beacon_id = event.beacon_id,
                            error = %e,
                            "Scan event write failed, retrying"
                        );
                        tokio::time::sleep(*delay).await;
                    }
                    None => {
                        tracing::error!(
                            beacon_id = event.beacon_id,
                            action = %event.action,
                            error = %e,
                            "Scan event write failed after all retries"
                        );
                        self.bus.publish(PlatformEvent::alert(
                            "scan_event_write_failed",
                            serde_json::json!({
                                "beacon_id": event.beacon_id,
                                "action": event.action,
                                "scanned_at": event.scanned_at,
                                "error": e.to_string(),
                            }),
                        ));
                        return;
                    }
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use beacon_core::geo::GeoClass;
    use beacon_core::memory::MemoryScanEvents;
    use beacon_core::models::ScanSource;
    use chrono::Utc;

    use super::*;

    fn event(beacon_id: i64) -> ScanEvent {
        ScanEvent {
            beacon_id,
            user_id: Some(1),
            scanned_at: Utc::now(),
            geo: GeoClass::Unfenced,
            action: "checkin".into(),
            ok: true,
            xp_awarded: 10,
            source: ScanSource::Qr,
            signed_payload: None,
            anomaly: None,
        }
    }

    fn no_delay() -> Vec<Duration> {
        vec![Duration::ZERO; 3]
    }

    #[tokio::test]
    async fn events_are_written_in_order() {
        let store = Arc::new(MemoryScanEvents::default());
        let bus = Arc::new(EventBus::default());
        let (log, handle) = ScanEventLog::spawn_with_retry(store.clone(), bus, no_delay());

        log.record(event(1));
        log.record(event(2));
        drop(log);
        handle.await.unwrap();

        let ids: Vec<i64> = store.events().iter().map(|e| e.beacon_id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let store = Arc::new(MemoryScanEvents::default());
        store.fail_next(2);
        let bus = Arc::new(EventBus::default());
        let mut alerts = bus.subscribe();
        let (log, handle) = ScanEventLog::spawn_with_retry(store.clone(), bus, no_delay());

        log.record(event(7));
        drop(log);
        handle.await.unwrap();

        assert_eq!(store.events().len(), 1);
        assert!(alerts.try_recv().is_err());
    }

    #[tokio::test]
    async fn permanent_failure_raises_alert() {
        let store = Arc::new(MemoryScanEvents::default());
        store.fail_next(10);
        let bus = Arc::new(EventBus::default());
        let mut alerts = bus.subscribe();
        let (log, handle) = ScanEventLog::spawn_with_retry(store.clone(), bus, no_delay());

        log.record(event(7));
        drop(log);
        handle.await.unwrap();

        assert!(store.events().is_empty());
        let alert = alerts.recv().await.unwrap();
        assert!(alert.is_alert());
        assert_eq!(alert.payload["alert"], "scan_event_write_failed");
        assert_eq!(alert.payload["detail"]["beacon_id"], 7);
    }
}
