//! Payment webhook inbox row model.

use beacon_core::error::StoreError;
use beacon_core::models::{InboxEvent, Provider};
use beacon_core::types::{DbId, Timestamp};
use sqlx::FromRow;

/// A row from the `payment_webhook_events` table.
#[derive(Debug, Clone, FromRow)]
pub struct WebhookEventRow {
    pub id: DbId,
    pub provider: String,
    pub event_id: String,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub attempts: i32,
    pub received_at: Timestamp,
}

impl TryFrom<WebhookEventRow> for InboxEvent {
    type Error = StoreError;

    fn try_from(row: WebhookEventRow) -> Result<Self, Self::Error> {
        let provider = Provider::parse(&row.provider).ok_or_else(|| {
            StoreError::Integrity(format!("unknown payment provider '{}'", row.provider))
        })?;
        Ok(InboxEvent {
            id: row.id,
            provider,
            event_id: row.event_id,
            event_type: row.event_type,
            payload: row.payload,
            attempts: row.attempts,
            received_at: row.received_at,
        })
    }
}
