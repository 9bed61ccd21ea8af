//! Repository for the `platform_events` audit table.

use beacon_core::types::DbId;
use sqlx::PgPool;

pub struct PlatformEventRepo;

impl PlatformEventRepo {
    /// Append one event and return its id.
    pub async fn insert(
        pool: &PgPool,
        event_type: &str,
        source_entity_type: Option<&str>,
        source_entity_id: Option<DbId>,
        actor_user_id: Option<DbId>,
        recipient_user_id: Option<DbId>,
        payload: &serde_json::Value,
    ) -> Result<DbId, sqlx::Error> {
        sqlx::query_scalar(
            "INSERT INTO platform_events \
                (event_type, source_entity_type, source_entity_id, actor_user_id, \
                 recipient_user_id, payload) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING id",
        )
        .bind(event_type)
        .bind(source_entity_type)
        .bind(source_entity_id)
        .bind(actor_user_id)
        .bind(recipient_user_id)
        .bind(payload)
        .fetch_one(pool)
        .await
    }
}
