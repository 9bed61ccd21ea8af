//! Repository for the `beacons`, `beacon_daily_scans` and
//! `premium_memberships` tables.

use beacon_core::status::BeaconStatus;
use beacon_core::types::{DbId, Timestamp};
use chrono::NaiveDate;
use sqlx::PgPool;

use crate::models::beacon::BeaconRow;

/// Column list for `beacons` queries.
const COLUMNS: &str = "id, code, beacon_type, subtype, label, status, owner_id, target_ref, \
    vendor_id, city, xp_base, xp_multiplier, scan_count, scan_limit, per_user_daily_limit, \
    geofence_lat, geofence_lng, geofence_radius_m, active_from, active_until, created_at";

pub struct BeaconRepo;

impl BeaconRepo {
    pub async fn find_by_code(pool: &PgPool, code: &str) -> Result<Option<BeaconRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM beacons WHERE code = $1");
        sqlx::query_as::<_, BeaconRow>(&query)
            .bind(code)
            .fetch_optional(pool)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<BeaconRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM beacons WHERE id = $1");
        sqlx::query_as::<_, BeaconRow>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Bump `scan_count` unless the limit is already reached. The increment
    /// that reaches the limit also expires the beacon.
    pub async fn increment_scan_count(pool: &PgPool, id: DbId) -> Result<Option<i64>, sqlx::Error> {
        sqlx::query_scalar(
            "UPDATE beacons SET \
                scan_count = scan_count + 1, \
                status = CASE \
                    WHEN status = 'active' AND scan_limit IS NOT NULL AND scan_count + 1 >= scan_limit \
                    THEN 'expired' ELSE status END, \
                updated_at = NOW() \
             WHERE id = $1 AND (scan_limit IS NULL OR scan_count < scan_limit) \
             RETURNING scan_count",
        )
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    /// Take one unit of a per-user daily quota. The upsert only fires while
    /// the counter is below `limit`, so exhaustion yields no row.
    pub async fn consume_user_quota(
        pool: &PgPool,
        beacon_id: DbId,
        user_id: DbId,
        day: NaiveDate,
        limit: i32,
    ) -> Result<bool, sqlx::Error> {
        let scans: Option<i32> = sqlx::query_scalar(
            "INSERT INTO beacon_daily_scans (beacon_id, user_id, day, scans) \
             SELECT $1, $2, $3, 1 WHERE $4 > 0 \
             ON CONFLICT (beacon_id, user_id, day) DO UPDATE \
                SET scans = beacon_daily_scans.scans + 1 \
                WHERE beacon_daily_scans.scans < $4 \
             RETURNING scans",
        )
        .bind(beacon_id)
        .bind(user_id)
        .bind(day)
        .bind(limit)
        .fetch_optional(pool)
        .await?;
        Ok(scans.is_some())
    }

    /// Hand back one unit taken by [`consume_user_quota`](Self::consume_user_quota).
    /// The counter never drops below zero.
    pub async fn release_user_quota(
        pool: &PgPool,
        beacon_id: DbId,
        user_id: DbId,
        day: NaiveDate,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE beacon_daily_scans SET scans = scans - 1 \
             WHERE beacon_id = $1 AND user_id = $2 AND day = $3 AND scans > 0",
        )
        .bind(beacon_id)
        .bind(user_id)
        .bind(day)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn transition_status(
        pool: &PgPool,
        id: DbId,
        from: BeaconStatus,
        to: BeaconStatus,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE beacons SET status = $3, updated_at = NOW() WHERE id = $1 AND status = $2",
        )
        .bind(id)
        .bind(from.as_str())
        .bind(to.as_str())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Expire every live beacon whose window closed at or before `now`.
    pub async fn expire_due(pool: &PgPool, now: Timestamp) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE beacons SET status = 'expired', updated_at = NOW() \
             WHERE status IN ('active', 'paused') AND active_until IS NOT NULL AND active_until <= $1",
        )
        .bind(now)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn owner_is_premium(
        pool: &PgPool,
        owner_id: DbId,
        now: Timestamp,
    ) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT EXISTS ( \
                SELECT 1 FROM premium_memberships \
                WHERE user_id = $1 AND (expires_at IS NULL OR expires_at > $2))",
        )
        .bind(owner_id)
        .bind(now)
        .fetch_one(pool)
        .await
    }
}
