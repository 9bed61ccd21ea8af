//! Repository for the `tickets` and `ticket_history` tables.

use beacon_core::types::{DbId, Timestamp};
use serde_json::json;
use sqlx::PgPool;

use crate::models::ticket::TicketRow;

const COLUMNS: &str = "id, event_id, owner_id, status, issued_at";

pub struct TicketRepo;

impl TicketRepo {
    pub async fn find(pool: &PgPool, id: DbId) -> Result<Option<TicketRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM tickets WHERE id = $1");
        sqlx::query_as::<_, TicketRow>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// `valid -> scanned` plus a history row. Returns `false` (and writes
    /// nothing) when the ticket was not `valid`.
    pub async fn mark_scanned(
        pool: &PgPool,
        id: DbId,
        scanned_by: Option<DbId>,
        beacon_id: DbId,
        at: Timestamp,
    ) -> Result<bool, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE tickets SET status = 'scanned', updated_at = $2 \
             WHERE id = $1 AND status = 'valid'",
        )
        .bind(id)
        .bind(at)
        .execute(&mut *tx)
        .await?;
        if updated.rows_affected() != 1 {
            return Ok(false);
        }

        sqlx::query(
            "INSERT INTO ticket_history (ticket_id, action, actor_id, beacon_id, metadata) \
             VALUES ($1, 'scanned', $2, $3, $4)",
        )
        .bind(id)
        .bind(scanned_by)
        .bind(beacon_id)
        .bind(json!({ "scanned_at": at }))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    /// History actions for a ticket, oldest first.
    pub async fn history(pool: &PgPool, id: DbId) -> Result<Vec<String>, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT action FROM ticket_history WHERE ticket_id = $1 ORDER BY created_at, id",
        )
        .bind(id)
        .fetch_all(pool)
        .await
    }
}
