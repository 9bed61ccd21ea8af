//! Ticket row model.

use beacon_core::error::StoreError;
use beacon_core::models::Ticket;
use beacon_core::types::{DbId, Timestamp};
use sqlx::FromRow;

/// A row from the `tickets` table.
#[derive(Debug, Clone, FromRow)]
pub struct TicketRow {
    pub id: DbId,
    pub event_id: DbId,
    pub owner_id: DbId,
    pub status: String,
    pub issued_at: Timestamp,
}

impl TryFrom<TicketRow> for Ticket {
    type Error = StoreError;

    fn try_from(row: TicketRow) -> Result<Self, Self::Error> {
        Ok(Ticket {
            id: row.id,
            event_id: row.event_id,
            owner_id: row.owner_id,
            status: row.status.parse()?,
            issued_at: row.issued_at,
        })
    }
}
