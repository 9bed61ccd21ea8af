//! Ticket resale row model.

use beacon_core::error::StoreError;
use beacon_core::models::Resale;
use beacon_core::types::DbId;
use sqlx::FromRow;

/// A row from the `ticket_resales` table.
#[derive(Debug, Clone, FromRow)]
pub struct ResaleRow {
    pub id: DbId,
    pub ticket_id: DbId,
    pub seller_id: DbId,
    pub price_cents: i64,
    pub currency: String,
    pub status: String,
    pub buyer_id: Option<DbId>,
}

impl TryFrom<ResaleRow> for Resale {
    type Error = StoreError;

    fn try_from(row: ResaleRow) -> Result<Self, Self::Error> {
        Ok(Resale {
            id: row.id,
            ticket_id: row.ticket_id,
            seller_id: row.seller_id,
            price_cents: row.price_cents,
            currency: row.currency,
            status: row.status.parse()?,
            buyer_id: row.buyer_id,
        })
    }
}
