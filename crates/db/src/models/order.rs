//! Order row model.

use beacon_core::error::StoreError;
use beacon_core::models::Order;
use beacon_core::types::{DbId, Timestamp};
use sqlx::FromRow;

/// A row from the `orders` table.
#[derive(Debug, Clone, FromRow)]
pub struct OrderRow {
    pub id: DbId,
    pub buyer_id: DbId,
    pub seller_id: Option<DbId>,
    pub listing_id: Option<DbId>,
    pub beacon_id: Option<DbId>,
    pub quantity: i32,
    pub status: String,
    pub total_cents: i64,
    pub currency: String,
    pub provider_session_id: Option<String>,
    pub provider_intent_id: Option<String>,
    pub stock_released: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl TryFrom<OrderRow> for Order {
    type Error = StoreError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        Ok(Order {
            id: row.id,
            buyer_id: row.buyer_id,
            seller_id: row.seller_id,
            listing_id: row.listing_id,
            beacon_id: row.beacon_id,
            quantity: row.quantity,
            status: row.status.parse()?,
            total_cents: row.total_cents,
            currency: row.currency,
            provider_session_id: row.provider_session_id,
            provider_intent_id: row.provider_intent_id,
            stock_released: row.stock_released,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}
