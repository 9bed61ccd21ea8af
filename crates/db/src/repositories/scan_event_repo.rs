//! Repository for the append-only `scan_events` table.

use beacon_core::models::ScanEvent;
use beacon_core::types::DbId;
use sqlx::PgPool;

pub struct ScanEventRepo;

impl ScanEventRepo {
    pub async fn insert(pool: &PgPool, event: &ScanEvent) -> Result<DbId, sqlx::Error> {
        sqlx::query_scalar(
            "INSERT INTO scan_events \
                (beacon_id, user_id, scanned_at, geo, action, ok, xp_awarded, source, \
                 signed_payload, anomaly) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
             RETURNING id",
        )
        .bind(event.beacon_id)
        .bind(event.user_id)
        .bind(event.scanned_at)
        .bind(event.geo.as_str())
        .bind(&event.action)
        .bind(event.ok)
        .bind(event.xp_awarded)
        .bind(event.source.as_str())
        .bind(&event.signed_payload)
        .bind(&event.anomaly)
        .fetch_one(pool)
        .await
    }
}
