//! Repository for the `kill_switches` table.

use beacon_core::kill_switch::NewKillSwitch;
use beacon_core::types::{DbId, Timestamp};
use sqlx::PgPool;

use crate::models::kill_switch::KillSwitchRow;

const COLUMNS: &str = "id, scope, target, reason, is_active, created_by, created_at, expires_at";

pub struct KillSwitchRepo;

impl KillSwitchRepo {
    /// Active switches that have not expired at `now`.
    pub async fn list_live(pool: &PgPool, now: Timestamp) -> Result<Vec<KillSwitchRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM kill_switches \
             WHERE is_active AND (expires_at IS NULL OR expires_at > $1) \
             ORDER BY id"
        );
        sqlx::query_as::<_, KillSwitchRow>(&query)
            .bind(now)
            .fetch_all(pool)
            .await
    }

    /// Every switch ever created, newest first.
    pub async fn list_all(pool: &PgPool) -> Result<Vec<KillSwitchRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM kill_switches ORDER BY created_at DESC, id DESC");
        sqlx::query_as::<_, KillSwitchRow>(&query).fetch_all(pool).await
    }

    pub async fn create(pool: &PgPool, input: &NewKillSwitch) -> Result<KillSwitchRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO kill_switches (scope, target, reason, created_by, expires_at) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, KillSwitchRow>(&query)
            .bind(input.scope.as_str())
            .bind(input.target.as_deref().map(str::trim))
            .bind(&input.reason)
            .bind(input.created_by)
            .bind(input.expires_at)
            .fetch_one(pool)
            .await
    }

    /// Switch off. Deactivating an inactive switch returns it unchanged.
    pub async fn deactivate(pool: &PgPool, id: DbId) -> Result<Option<KillSwitchRow>, sqlx::Error> {
        let query = format!(
            "UPDATE kill_switches SET \
                is_active = false, \
                deactivated_at = COALESCE(deactivated_at, NOW()) \
             WHERE id = $1 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, KillSwitchRow>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }
}
