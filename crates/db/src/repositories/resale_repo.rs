//! Repository for the `ticket_resales` table.

use beacon_core::types::{DbId, Timestamp};
use serde_json::json;
use sqlx::PgPool;

use crate::models::resale::ResaleRow;
use crate::repositories::payment_claim_repo::{ClaimPurpose, PaymentClaimRepo};

const COLUMNS: &str = "id, ticket_id, seller_id, price_cents, currency, status, buyer_id";

/// Ids touched by a completed resale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompletedResale {
    pub seller_id: DbId,
    pub old_ticket_id: DbId,
    pub new_ticket_id: DbId,
}

/// Outcome of [`ResaleRepo::complete`]. Only `Completed` writes anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompleteOutcome {
    Completed(CompletedResale),
    NotActive,
    TicketNotValid,
    PaymentUsed,
}

pub struct ResaleRepo;

impl ResaleRepo {
    pub async fn find(pool: &PgPool, id: DbId) -> Result<Option<ResaleRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM ticket_resales WHERE id = $1");
        sqlx::query_as::<_, ResaleRow>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Sell an active resale to `buyer_id` in one transaction: the resale is
    /// marked sold, the seller's ticket retired as `transferred`, and a fresh
    /// `valid` ticket issued to the buyer. The payment intent is claimed in
    /// the same transaction, so a refusal at any step leaves nothing behind.
    pub async fn complete(
        pool: &PgPool,
        resale_id: DbId,
        buyer_id: DbId,
        payment_intent_id: &str,
        at: Timestamp,
    ) -> Result<CompleteOutcome, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let sold: Option<(DbId, DbId)> = sqlx::query_as(
            "UPDATE ticket_resales \
             SET status = 'sold', buyer_id = $2, payment_intent_id = $3, sold_at = $4 \
             WHERE id = $1 AND status = 'active' \
             RETURNING ticket_id, seller_id",
        )
        .bind(resale_id)
        .bind(buyer_id)
        .bind(payment_intent_id)
        .bind(at)
        .fetch_optional(&mut *tx)
        .await?;
        let Some((old_ticket_id, seller_id)) = sold else {
            return Ok(CompleteOutcome::NotActive);
        };

        let event_id: Option<DbId> = sqlx::query_scalar(
            "UPDATE tickets SET status = 'transferred', updated_at = $2 \
             WHERE id = $1 AND status = 'valid' \
             RETURNING event_id",
        )
        .bind(old_ticket_id)
        .bind(at)
        .fetch_optional(&mut *tx)
        .await?;
        let Some(event_id) = event_id else {
            tracing::warn!(resale_id, old_ticket_id, "Resale ticket is no longer valid");
            return Ok(CompleteOutcome::TicketNotValid);
        };

        if !PaymentClaimRepo::claim(&mut *tx, payment_intent_id, ClaimPurpose::Resale, buyer_id)
            .await?
        {
            tracing::warn!(resale_id, buyer_id, "Payment intent already spent");
            return Ok(CompleteOutcome::PaymentUsed);
        }

        let new_ticket_id: DbId = sqlx::query_scalar(
            "INSERT INTO tickets (event_id, owner_id, status, issued_at) \
             VALUES ($1, $2, 'valid', $3) RETURNING id",
        )
        .bind(event_id)
        .bind(buyer_id)
        .bind(at)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO ticket_history (ticket_id, action, actor_id, metadata) VALUES \
                ($1, 'transferred', $3, $4), \
                ($2, 'issued', $3, $4)",
        )
        .bind(old_ticket_id)
        .bind(new_ticket_id)
        .bind(buyer_id)
        .bind(json!({ "resale_id": resale_id, "payment_intent_id": payment_intent_id }))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(CompleteOutcome::Completed(CompletedResale { seller_id, old_ticket_id, new_ticket_id }))
    }
}
