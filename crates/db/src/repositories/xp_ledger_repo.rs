//! Repository for the append-only `xp_ledger` table.

use beacon_core::ledger::apply_daily_cap;
use beacon_core::models::NewLedgerEntry;
use beacon_core::types::{DbId, Timestamp, Xp};
use chrono::{Days, NaiveDate, NaiveTime};
use sqlx::PgPool;

use crate::models::xp_ledger::LedgerRow;

const COLUMNS: &str = "id, user_id, amount, reason, dedupe_key, metadata, created_at";

/// UTC bounds `[start, end)` of a calendar day.
fn day_bounds(day: NaiveDate) -> (Timestamp, Timestamp) {
    let start = day.and_time(NaiveTime::MIN).and_utc();
    let end = day
        .checked_add_days(Days::new(1))
        .unwrap_or(day)
        .and_time(NaiveTime::MIN)
        .and_utc();
    (start, end)
}

pub struct XpLedgerRepo;

impl XpLedgerRepo {
    /// Insert unless `dedupe_key` exists, truncating the amount to what is
    /// left of the user's `daily_cap` for `day`.
    ///
    /// A transaction-scoped advisory lock on the user id serializes
    /// concurrent awards for one user, so the cap sum cannot be read stale.
    /// `None` means the key was already present.
    pub async fn insert_if_absent(
        pool: &PgPool,
        entry: &NewLedgerEntry,
        daily_cap: Xp,
        day: NaiveDate,
    ) -> Result<Option<LedgerRow>, sqlx::Error> {
        let mut tx = pool.begin().await?;

        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(entry.user_id)
            .execute(&mut *tx)
            .await?;

        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM xp_ledger WHERE dedupe_key = $1)")
                .bind(&entry.dedupe_key)
                .fetch_one(&mut *tx)
                .await?;
        if exists {
            return Ok(None);
        }

        let (start, end) = day_bounds(day);
        let today: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(amount), 0)::BIGINT FROM xp_ledger \
             WHERE user_id = $1 AND created_at >= $2 AND created_at < $3",
        )
        .bind(entry.user_id)
        .bind(start)
        .bind(end)
        .fetch_one(&mut *tx)
        .await?;

        let query = format!(
            "INSERT INTO xp_ledger (user_id, amount, reason, dedupe_key, metadata) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (dedupe_key) DO NOTHING \
             RETURNING {COLUMNS}"
        );
        let row = sqlx::query_as::<_, LedgerRow>(&query)
            .bind(entry.user_id)
            .bind(apply_daily_cap(entry.amount, today, daily_cap))
            .bind(&entry.reason)
            .bind(&entry.dedupe_key)
            .bind(&entry.metadata)
            .fetch_optional(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(row)
    }

    /// `(today, lifetime)` sums for a user.
    pub async fn totals(pool: &PgPool, user_id: DbId, day: NaiveDate) -> Result<(i64, i64), sqlx::Error> {
        let (start, end) = day_bounds(day);
        sqlx::query_as(
            "SELECT \
                COALESCE(SUM(amount) FILTER (WHERE created_at >= $2 AND created_at < $3), 0)::BIGINT, \
                COALESCE(SUM(amount), 0)::BIGINT \
             FROM xp_ledger WHERE user_id = $1",
        )
        .bind(user_id)
        .bind(start)
        .bind(end)
        .fetch_one(pool)
        .await
    }

    /// Most recent entries for a user, newest first.
    pub async fn recent(pool: &PgPool, user_id: DbId, limit: i64) -> Result<Vec<LedgerRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM xp_ledger WHERE user_id = $1 \
             ORDER BY created_at DESC, id DESC LIMIT $2"
        );
        sqlx::query_as::<_, LedgerRow>(&query)
            .bind(user_id)
            .bind(limit)
            .fetch_all(pool)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn day_bounds_cover_one_utc_day() {
        let day = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
        let (start, end) = day_bounds(day);
        assert_eq!(start.to_rfc3339(), "2026-03-01T00:00:00+00:00");
        assert_eq!((end - start).num_hours(), 24);
    }
}
