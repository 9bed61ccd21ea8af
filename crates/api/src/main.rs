use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use beacon_core::ports::PaymentVerifier;
use beacon_events::{EventBus, EventPersistence, NotificationDispatcher, ScanEventLog, WebhookDelivery};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use beacon_api::background;
use beacon_api::config::{LogFormat, ServerConfig};
use beacon_api::payments::{StripePaymentVerifier, UnconfiguredVerifier};
use beacon_api::router::build_app_router;
use beacon_api::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // --- Configuration ---
    let config = ServerConfig::from_env().context("Invalid configuration")?;

    // --- Tracing ---
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "beacon_api=debug,tower_http=debug".into());
    match config.log_format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Text => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init(),
    }
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    // --- Database ---
    let pool = beacon_db::create_pool(&config.database_url)
        .await
        .context("Failed to connect to database")?;
    tracing::info!("Database connection pool created");

    beacon_db::health_check(&pool)
        .await
        .context("Database health check failed")?;
    tracing::info!("Database health check passed");

    beacon_db::run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;
    tracing::info!("Database migrations applied");

    let store = Arc::new(beacon_db::PgStore::new(pool.clone()));
    let stores = store.stores();

    // --- Event bus ---
    let event_bus = Arc::new(EventBus::default());
    let cancel = CancellationToken::new();

    // Spawn event persistence (writes all events to the database).
    let persistence_handle = tokio::spawn(EventPersistence::run(
        pool.clone(),
        event_bus.subscribe(),
        cancel.clone(),
    ));

    // Scan event writer.
    let (scan_log, scan_log_handle) = ScanEventLog::spawn(store.clone(), event_bus.clone());

    // Outbound notification delivery, when a target is configured.
    let dispatcher_handle = match &config.notify_webhook_url {
        Some(url) => {
            let delivery = WebhookDelivery::new().context("Failed to build webhook client")?;
            let dispatcher = NotificationDispatcher::new(delivery, url.clone());
            Some(tokio::spawn(dispatcher.run(event_bus.subscribe(), cancel.clone())))
        }
        None => {
            tracing::info!("NOTIFY_WEBHOOK_URL not set; notifications are persisted only");
            None
        }
    };

    tracing::info!("Event services started (persistence, scan log, dispatcher)");

    // --- Payment verification ---
    let verifier: Arc<dyn PaymentVerifier> = match &config.stripe_api_key {
        Some(key) => Arc::new(
            StripePaymentVerifier::new(key.clone()).context("Failed to build Stripe client")?,
        ),
        None => {
            tracing::warn!("STRIPE_API_KEY not set; purchase scans will ask clients to retry");
            Arc::new(UnconfiguredVerifier)
        }
    };

    // --- App state ---
    let config = Arc::new(config);
    let state = AppState::new(
        config.clone(),
        stores,
        verifier,
        Arc::new(scan_log),
        event_bus.clone(),
    );

    // --- Background tasks ---
    let inbox_handle = tokio::spawn(background::webhook_inbox::run(
        state.reconciler.clone(),
        cancel.clone(),
    ));
    let expiry_handle = tokio::spawn(background::beacon_expiry::run(
        state.stores.beacons.clone(),
        cancel.clone(),
    ));

    // --- Router ---
    let app = build_app_router(state, &config);

    // --- Start server ---
    let host: IpAddr = config
        .host
        .parse()
        .with_context(|| format!("Invalid HOST address '{}'", config.host))?;
    let addr = SocketAddr::new(host, config.port);
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");
    let grace = Duration::from_secs(config.shutdown_timeout_secs);

    // The router (and every scan log sender in it) is gone; once the last
    // sender drops the writer drains its queue and exits.
    if tokio::time::timeout(grace, scan_log_handle).await.is_err() {
        tracing::warn!("Scan event log did not drain before the shutdown deadline");
    }
    tracing::info!("Scan event log flushed");

    cancel.cancel();
    let _ = tokio::time::timeout(Duration::from_secs(5), inbox_handle).await;
    let _ = tokio::time::timeout(Duration::from_secs(5), expiry_handle).await;
    tracing::info!("Background tasks stopped");

    let _ = tokio::time::timeout(Duration::from_secs(5), persistence_handle).await;
    if let Some(handle) = dispatcher_handle {
        let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;
    }
    tracing::info!("Event services shut down");

    pool.close().await;
    tracing::info!("Graceful shutdown complete");
    Ok(())
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix) so the server
/// shuts down cleanly whether stopped interactively or by a process
/// manager (e.g. systemd, Docker, Kubernetes).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
