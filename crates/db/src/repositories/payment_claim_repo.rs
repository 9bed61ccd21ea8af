//! Repository for the `payment_claims` table.
//!
//! A claim binds a payment intent to the single purchase it pays for.
//! Claims are taken inside the caller's transaction so a purchase that
//! rolls back also gives its intent back.

use beacon_core::types::DbId;
use sqlx::PgConnection;

/// What an intent is being spent on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimPurpose {
    Order,
    Resale,
}

impl ClaimPurpose {
    fn as_str(self) -> &'static str {
        match self {
            ClaimPurpose::Order => "order",
            ClaimPurpose::Resale => "resale",
        }
    }
}

pub struct PaymentClaimRepo;

impl PaymentClaimRepo {
    /// Claim `payment_intent_id` for one purchase. `false` when the intent
    /// is already claimed or already recorded against an order. A concurrent
    /// claimer blocks on the primary key until the first transaction ends.
    pub async fn claim(
        conn: &mut PgConnection,
        payment_intent_id: &str,
        purpose: ClaimPurpose,
        buyer_id: DbId,
    ) -> Result<bool, sqlx::Error> {
        let claimed: Option<String> = sqlx::query_scalar(
            "INSERT INTO payment_claims (payment_intent_id, purpose, buyer_id) \
             SELECT $1, $2, $3 \
             WHERE NOT EXISTS (SELECT 1 FROM orders WHERE provider_intent_id = $1) \
             ON CONFLICT (payment_intent_id) DO NOTHING \
             RETURNING payment_intent_id",
        )
        .bind(payment_intent_id)
        .bind(purpose.as_str())
        .bind(buyer_id)
        .fetch_optional(conn)
        .await?;
        Ok(claimed.is_some())
    }
}
