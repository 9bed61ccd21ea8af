//! Repository for the `listings` table and order creation on reserve.

use beacon_core::types::DbId;
use sqlx::{PgConnection, PgPool};

use crate::models::listing::ListingRow;
use crate::models::order::OrderRow;
use crate::repositories::order_repo::COLUMNS as ORDER_COLUMNS;
use crate::repositories::payment_claim_repo::{ClaimPurpose, PaymentClaimRepo};

const COLUMNS: &str = "id, vendor_id, title, price_cents, currency, stock, status";

/// Outcome of [`ListingRepo::reserve`].
#[derive(Debug)]
pub enum ReserveOutcome {
    Reserved(OrderRow),
    SoldOut,
    NotActive,
    /// The intent already paid for a different purchase.
    PaymentUsed,
}

pub struct ListingRepo;

impl ListingRepo {
    pub async fn find(pool: &PgPool, id: DbId) -> Result<Option<ListingRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM listings WHERE id = $1");
        sqlx::query_as::<_, ListingRow>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Take one unit of stock and open a `created` order for it.
    ///
    /// Idempotent per payment intent: replaying the same intent for the same
    /// listing and buyer returns the order created by the first call without
    /// touching stock. Any other use of a spent intent is refused.
    pub async fn reserve(
        pool: &PgPool,
        listing_id: DbId,
        buyer_id: DbId,
        beacon_id: Option<DbId>,
        payment_intent_id: &str,
    ) -> Result<ReserveOutcome, sqlx::Error> {
        let mut tx = pool.begin().await?;

        if let Some(order) = order_for_intent(&mut *tx, payment_intent_id).await? {
            return Ok(replay(order, listing_id, buyer_id));
        }
        if !PaymentClaimRepo::claim(&mut *tx, payment_intent_id, ClaimPurpose::Order, buyer_id)
            .await?
        {
            // A concurrent replay may have committed its order meanwhile.
            return Ok(match order_for_intent(&mut *tx, payment_intent_id).await? {
                Some(order) => replay(order, listing_id, buyer_id),
                None => ReserveOutcome::PaymentUsed,
            });
        }

        let taken: Option<(DbId, i64, String)> = sqlx::query_as(
            "UPDATE listings SET \
                stock = stock - 1, \
                status = CASE WHEN stock - 1 = 0 THEN 'sold_out' ELSE status END, \
                updated_at = NOW() \
             WHERE id = $1 AND status = 'active' AND stock > 0 \
             RETURNING vendor_id, price_cents, currency",
        )
        .bind(listing_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((vendor_id, price_cents, currency)) = taken else {
            let status: Option<String> =
                sqlx::query_scalar("SELECT status FROM listings WHERE id = $1")
                    .bind(listing_id)
                    .fetch_optional(&mut *tx)
                    .await?;
            return Ok(match status.as_deref() {
                Some("active") | Some("sold_out") => ReserveOutcome::SoldOut,
                _ => ReserveOutcome::NotActive,
            });
        };

        let insert = format!(
            "INSERT INTO orders \
                (buyer_id, seller_id, listing_id, beacon_id, quantity, status, \
                 total_cents, currency, provider_intent_id) \
             VALUES ($1, $2, $3, $4, 1, 'created', $5, $6, $7) \
             RETURNING {ORDER_COLUMNS}"
        );
        let order = sqlx::query_as::<_, OrderRow>(&insert)
            .bind(buyer_id)
            .bind(vendor_id)
            .bind(listing_id)
            .bind(beacon_id)
            .bind(price_cents)
            .bind(&currency)
            .bind(payment_intent_id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(ReserveOutcome::Reserved(order))
    }
}

async fn order_for_intent(
    conn: &mut PgConnection,
    payment_intent_id: &str,
) -> Result<Option<OrderRow>, sqlx::Error> {
    let query = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE provider_intent_id = $1");
    sqlx::query_as::<_, OrderRow>(&query)
        .bind(payment_intent_id)
        .fetch_optional(conn)
        .await
}

fn replay(order: OrderRow, listing_id: DbId, buyer_id: DbId) -> ReserveOutcome {
    if order.listing_id == Some(listing_id) && order.buyer_id == buyer_id {
        ReserveOutcome::Reserved(order)
    } else {
        ReserveOutcome::PaymentUsed
    }
}
