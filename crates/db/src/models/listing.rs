//! Marketplace listing row model.

use beacon_core::error::StoreError;
use beacon_core::models::Listing;
use beacon_core::types::DbId;
use sqlx::FromRow;

/// A row from the `listings` table.
#[derive(Debug, Clone, FromRow)]
pub struct ListingRow {
    pub id: DbId,
    pub vendor_id: DbId,
    pub title: String,
    pub price_cents: i64,
    pub currency: String,
    pub stock: i32,
    pub status: String,
}

impl TryFrom<ListingRow> for Listing {
    type Error = StoreError;

    fn try_from(row: ListingRow) -> Result<Self, Self::Error> {
        Ok(Listing {
            id: row.id,
            vendor_id: row.vendor_id,
            title: row.title,
            price_cents: row.price_cents,
            currency: row.currency,
            stock: row.stock,
            status: row.status.parse()?,
        })
    }
}
