//! Repository for the `orders` table.

use beacon_core::status::OrderStatus;
use beacon_core::types::DbId;
use sqlx::PgPool;

use crate::models::order::OrderRow;

pub(crate) const COLUMNS: &str = "id, buyer_id, seller_id, listing_id, beacon_id, quantity, \
    status, total_cents, currency, provider_session_id, provider_intent_id, stock_released, \
    created_at, updated_at";

pub struct OrderRepo;

impl OrderRepo {
    pub async fn find(pool: &PgPool, id: DbId) -> Result<Option<OrderRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM orders WHERE id = $1");
        sqlx::query_as::<_, OrderRow>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Look up by checkout session id or payment intent id.
    pub async fn find_by_provider_ref(
        pool: &PgPool,
        reference: &str,
    ) -> Result<Option<OrderRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM orders \
             WHERE provider_session_id = $1 OR provider_intent_id = $1 \
             LIMIT 1"
        );
        sqlx::query_as::<_, OrderRow>(&query)
            .bind(reference)
            .fetch_optional(pool)
            .await
    }

    /// Move `from -> to`. With `release_stock`, the order's quantity goes
    /// back to its listing in the same transaction; `stock_released` makes
    /// the release happen at most once per order.
    pub async fn transition(
        pool: &PgPool,
        id: DbId,
        from: OrderStatus,
        to: OrderStatus,
        release_stock: bool,
    ) -> Result<bool, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let moved = sqlx::query(
            "UPDATE orders SET status = $3, updated_at = NOW() WHERE id = $1 AND status = $2",
        )
        .bind(id)
        .bind(from.as_str())
        .bind(to.as_str())
        .execute(&mut *tx)
        .await?;
        if moved.rows_affected() != 1 {
            return Ok(false);
        }

        if release_stock {
            let released: Option<(Option<DbId>, i32)> = sqlx::query_as(
                "UPDATE orders SET stock_released = true \
                 WHERE id = $1 AND stock_released = false \
                 RETURNING listing_id, quantity",
            )
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;

            if let Some((Some(listing_id), quantity)) = released {
                sqlx::query(
                    "UPDATE listings SET \
                        stock = stock + $2, \
                        status = CASE WHEN status = 'sold_out' THEN 'active' ELSE status END, \
                        updated_at = NOW() \
                     WHERE id = $1",
                )
                .bind(listing_id)
                .bind(quantity)
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;
        Ok(true)
    }
}
