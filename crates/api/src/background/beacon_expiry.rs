//! Periodic expiry of beacons whose `active_until` has passed.
//!
//! Scans already refuse such beacons on their own; the sweep keeps the
//! stored status honest for dashboards and for the lifecycle endpoints.

use std::sync::Arc;
use std::time::Duration;

use beacon_core::error::StoreResult;
use beacon_core::ports::BeaconStore;
use chrono::Utc;
use tokio_util::sync::CancellationToken;

/// How often the sweep runs.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Run the expiry sweep loop until `cancel` is triggered.
pub async fn run(beacons: Arc<dyn BeaconStore>, cancel: CancellationToken) {
    tracing::info!(interval_secs = SWEEP_INTERVAL.as_secs(), "Beacon expiry sweep started");

    let mut interval = tokio::time::interval(SWEEP_INTERVAL);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Beacon expiry sweep stopping");
                break;
            }
            _ = interval.tick() => {
                if let Err(e) = sweep_once(beacons.as_ref()).await {
                    tracing::error!(error = %e, "Beacon expiry sweep failed");
                }
            }
        }
    }
}

/// Expire everything due now. Returns the number of beacons expired.
pub async fn sweep_once(beacons: &dyn BeaconStore) -> StoreResult<u64> {
    let expired = beacons.expire_due(Utc::now()).await?;
    if expired > 0 {
        tracing::info!(expired, "Beacon expiry sweep: expired beacons");
    } else {
        tracing::debug!("Beacon expiry sweep: nothing due");
    }
    Ok(expired)
}
