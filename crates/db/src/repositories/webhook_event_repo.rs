//! Repository for the `payment_webhook_events` inbox.

use beacon_core::types::{DbId, Timestamp};
use sqlx::PgPool;

use crate::models::webhook_event::WebhookEventRow;

const COLUMNS: &str = "id, provider, event_id, event_type, payload, attempts, received_at";

/// How long a claimed row stays invisible to other pollers.
const CLAIM_LEASE_SECS: i32 = 60;

pub struct WebhookEventRepo;

impl WebhookEventRepo {
    /// Store a verified event. `None` when `(provider, event_id)` exists.
    pub async fn enqueue(
        pool: &PgPool,
        provider: &str,
        event_id: &str,
        event_type: &str,
        payload: &serde_json::Value,
    ) -> Result<Option<DbId>, sqlx::Error> {
        sqlx::query_scalar(
            "INSERT INTO payment_webhook_events (provider, event_id, event_type, payload) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT (provider, event_id) DO NOTHING \
             RETURNING id",
        )
        .bind(provider)
        .bind(event_id)
        .bind(event_type)
        .bind(payload)
        .fetch_optional(pool)
        .await
    }

    pub async fn find(pool: &PgPool, id: DbId) -> Result<Option<WebhookEventRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM payment_webhook_events WHERE id = $1");
        sqlx::query_as::<_, WebhookEventRow>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Claim unprocessed rows received before `older_than`, oldest first.
    ///
    /// Claimed rows get a short lease so concurrent pollers on other
    /// replicas skip them; the lease is cleared when the row is marked.
    pub async fn claim_pending(
        pool: &PgPool,
        older_than: Timestamp,
        limit: i64,
        max_attempts: i32,
    ) -> Result<Vec<WebhookEventRow>, sqlx::Error> {
        let query = format!(
            "UPDATE payment_webhook_events \
             SET locked_until = NOW() + make_interval(secs => $4) \
             WHERE id IN ( \
                SELECT id FROM payment_webhook_events \
                WHERE processed_at IS NULL \
                  AND received_at < $1 \
                  AND attempts < $3 \
                  AND (locked_until IS NULL OR locked_until < NOW()) \
                ORDER BY received_at \
                LIMIT $2 \
                FOR UPDATE SKIP LOCKED) \
             RETURNING {COLUMNS}"
        );
        let mut rows = sqlx::query_as::<_, WebhookEventRow>(&query)
            .bind(older_than)
            .bind(limit)
            .bind(max_attempts)
            .bind(f64::from(CLAIM_LEASE_SECS))
            .fetch_all(pool)
            .await?;
        rows.sort_by_key(|r| r.received_at);
        Ok(rows)
    }

    pub async fn mark_processed(pool: &PgPool, id: DbId, outcome: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE payment_webhook_events \
             SET processed_at = NOW(), outcome = $2, locked_until = NULL \
             WHERE id = $1",
        )
        .bind(id)
        .bind(outcome)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn record_failure(pool: &PgPool, id: DbId, error: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE payment_webhook_events \
             SET attempts = attempts + 1, last_error = $2, locked_until = NULL \
             WHERE id = $1",
        )
        .bind(id)
        .bind(error)
        .execute(pool)
        .await?;
        Ok(())
    }
}
