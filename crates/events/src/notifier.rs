//! The core [`Notifier`] port, implemented by publishing onto the bus.

use std::sync::Arc;

use beacon_core::models::Notification;
use beacon_core::ports::Notifier;

use crate::bus::{EventBus, PlatformEvent};

/// Turns every notification into a [`PlatformEvent`] on the bus. Delivery
/// and audit persistence happen in the bus subscribers, so `notify` never
/// waits on I/O.
#[derive(Clone)]
pub struct BusNotifier {
    bus: Arc<EventBus>,
}

impl BusNotifier {
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self { bus }
    }
}

impl Notifier for BusNotifier {
    fn notify(&self, notification: Notification) {
        tracing::debug!(kind = %notification.kind, "Publishing notification");
        self.bus.publish(PlatformEvent::from(notification));
    }
}
