use std::sync::Arc;
use std::time::Duration;

use beacon_core::ledger::XpLedger;
use beacon_core::ports::{Notifier, PaymentVerifier, ScanEventSink, Stores};
use beacon_core::reconciliation::Reconciler;
use beacon_core::scan::ScanEngine;
use beacon_events::{BusNotifier, EventBus};

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc` or is already `Clone`).
#[derive(Clone)]
pub struct AppState {
    /// Server configuration (accessed by middleware and handlers).
    pub config: Arc<ServerConfig>,
    /// Storage ports, Postgres-backed in production.
    pub stores: Stores,
    pub ledger: Arc<XpLedger>,
    pub engine: Arc<ScanEngine>,
    pub reconciler: Arc<Reconciler>,
    /// Centralized event bus for publishing platform events.
    pub event_bus: Arc<EventBus>,
}

impl AppState {
    /// Wire the scan engine and reconciler over `stores`.
    ///
    /// Notifications from both go onto `event_bus`.
    pub fn new(
        config: Arc<ServerConfig>,
        stores: Stores,
        verifier: Arc<dyn PaymentVerifier>,
        sink: Arc<dyn ScanEventSink>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        let ledger = Arc::new(XpLedger::new(
            stores.ledger.clone(),
            config.xp_daily_cap,
            Duration::from_millis(config.ledger_timeout_ms),
        ));
        let notifier: Arc<dyn Notifier> = Arc::new(BusNotifier::new(event_bus.clone()));

        let mut engine =
            ScanEngine::new(stores.clone(), ledger.clone(), verifier, sink, notifier.clone());
        if let Some(secret) = &config.signed_link_secret {
            engine = engine.with_link_secret(secret.clone());
        }

        let reconciler = Reconciler::new(
            stores.orders.clone(),
            stores.inbox.clone(),
            ledger.clone(),
            notifier,
        );

        Self {
            config,
            stores,
            ledger,
            engine: Arc::new(engine),
            reconciler: Arc::new(reconciler),
            event_bus,
        }
    }
}
