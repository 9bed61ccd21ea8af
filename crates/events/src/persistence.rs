//! Durable audit trail of bus events.
//!
//! [`EventPersistence`] subscribes to the [`EventBus`](crate::bus::EventBus)
//! and writes every event to `platform_events`. It stops when the bus is
//! dropped or the cancellation token fires.

use beacon_core::types::DbId;
use beacon_db::repositories::PlatformEventRepo;
use beacon_db::DbPool;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::bus::PlatformEvent;

pub struct EventPersistence;

impl EventPersistence {
    pub async fn run(
        pool: DbPool,
        mut receiver: broadcast::Receiver<PlatformEvent>,
        cancel: CancellationToken,
    ) {
        loop {
            let received = tokio::select! {
                () = cancel.cancelled() => break,
                received = receiver.recv() => received,
            };
            match received {
                Ok(event) => {
                    if let Err(e) = Self::persist(&pool, &event).await {
                        tracing::error!(
                            error = %e,
                            event_type = %event.event_type,
                            "Failed to persist event"
                        );
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "Event persistence lagged, some events were not persisted");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::info!("Event bus closed, persistence shutting down");
                    break;
                }
            }
        }
    }

    async fn persist(pool: &DbPool, event: &PlatformEvent) -> Result<DbId, sqlx::Error> {
        PlatformEventRepo::insert(
            pool,
            &event.event_type,
            event.source_entity_type.as_deref(),
            event.source_entity_id,
            event.actor_user_id,
            event.recipient_user_id,
            &event.payload,
        )
        .await
    }
}
