//! Beacon event bus, scan event log and notification delivery.
//!
//! - [`EventBus`]: in-process publish/subscribe hub backed by
//!   `tokio::sync::broadcast`.
//! - [`PlatformEvent`]: the canonical domain event envelope.
//! - [`ScanEventLog`]: non-blocking, retrying writer for scan events.
//! - [`BusNotifier`]: the core `Notifier` port, publishing onto the bus.
//! - [`EventPersistence`]: stores every bus event in `platform_events`.
//! - [`delivery`]: outbound webhook delivery of notifications.

pub mod bus;
pub mod delivery;
pub mod notifier;
pub mod persistence;
pub mod scan_log;

pub use bus::{EventBus, PlatformEvent};
pub use delivery::dispatcher::NotificationDispatcher;
pub use delivery::webhook::WebhookDelivery;
pub use notifier::BusNotifier;
pub use persistence::EventPersistence;
pub use scan_log::ScanEventLog;
