//! Repository for the `connection_requests` table.

use beacon_core::types::DbId;
use sqlx::PgPool;

use crate::models::connection::ConnectionRequestRow;

const COLUMNS: &str = "id, from_user_id, to_user_id, beacon_id, status, created_at";

pub struct ConnectionRepo;

impl ConnectionRepo {
    /// Create a pending request, or return the existing one for the pair.
    /// The flag is `true` when this call wrote the row.
    pub async fn request(
        pool: &PgPool,
        from_user_id: DbId,
        to_user_id: DbId,
        beacon_id: DbId,
    ) -> Result<(ConnectionRequestRow, bool), sqlx::Error> {
        let insert = format!(
            "INSERT INTO connection_requests (from_user_id, to_user_id, beacon_id) \
             VALUES ($1, $2, $3) \
             ON CONFLICT (from_user_id, to_user_id) DO NOTHING \
             RETURNING {COLUMNS}"
        );
        let created = sqlx::query_as::<_, ConnectionRequestRow>(&insert)
            .bind(from_user_id)
            .bind(to_user_id)
            .bind(beacon_id)
            .fetch_optional(pool)
            .await?;
        if let Some(row) = created {
            return Ok((row, true));
        }

        let select = format!(
            "SELECT {COLUMNS} FROM connection_requests \
             WHERE from_user_id = $1 AND to_user_id = $2"
        );
        let existing = sqlx::query_as::<_, ConnectionRequestRow>(&select)
            .bind(from_user_id)
            .bind(to_user_id)
            .fetch_one(pool)
            .await?;
        Ok((existing, false))
    }

    pub async fn pending_for(pool: &PgPool, user_id: DbId) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT COUNT(*) FROM connection_requests WHERE to_user_id = $1 AND status = 'pending'",
        )
        .bind(user_id)
        .fetch_one(pool)
        .await
    }
}
