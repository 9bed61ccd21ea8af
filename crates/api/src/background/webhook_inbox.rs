//! Retry loop for webhook inbox rows left unprocessed.
//!
//! Webhook handlers process fresh events on a spawned task. Rows survive
//! that task failing or the process dying mid-flight; this poller picks up
//! anything older than a grace period and runs it through the reconciler
//! again. Reconciliation is idempotent, so reprocessing is safe.

use std::sync::Arc;
use std::time::Duration;

use beacon_core::error::StoreResult;
use beacon_core::reconciliation::Reconciler;
use chrono::Utc;
use tokio_util::sync::CancellationToken;

/// How often the poller runs.
const POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Rows younger than this are still owned by their request's task.
const GRACE_PERIOD_SECS: i64 = 60;

const BATCH_SIZE: i64 = 50;

/// Run the inbox poller until `cancel` is triggered.
pub async fn run(reconciler: Arc<Reconciler>, cancel: CancellationToken) {
    tracing::info!(interval_secs = POLL_INTERVAL.as_secs(), "Webhook inbox poller started");

    let mut interval = tokio::time::interval(POLL_INTERVAL);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Webhook inbox poller stopping");
                break;
            }
            _ = interval.tick() => {
                if let Err(e) = drain_once(&reconciler).await {
                    tracing::error!(error = %e, "Webhook inbox poll failed");
                }
            }
        }
    }
}

/// Reprocess one batch of stale rows. Returns how many were attempted.
pub async fn drain_once(reconciler: &Reconciler) -> StoreResult<usize> {
    let cutoff = Utc::now() - chrono::Duration::seconds(GRACE_PERIOD_SECS);
    let pending = reconciler.inbox().pending(cutoff, BATCH_SIZE).await?;
    if pending.is_empty() {
        tracing::debug!("Webhook inbox: nothing pending");
        return Ok(0);
    }

    tracing::info!(count = pending.len(), "Webhook inbox: reprocessing stale events");
    for event in &pending {
        // Failures are logged and recorded on the row by the reconciler.
        if let Ok(outcome) = reconciler.process_inbox_event(event).await {
            tracing::info!(inbox_id = event.id, outcome = outcome.label(), "Stale webhook processed");
        }
    }
    Ok(pending.len())
}
