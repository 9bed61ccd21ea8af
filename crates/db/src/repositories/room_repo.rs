//! Repository for the `room_members` table.

use beacon_core::types::DbId;
use sqlx::PgPool;

pub struct RoomRepo;

impl RoomRepo {
    /// Add the user to the room. Returns whether this call added them and
    /// the member count afterwards.
    pub async fn join(pool: &PgPool, room_id: DbId, user_id: DbId) -> Result<(bool, i64), sqlx::Error> {
        let inserted = sqlx::query(
            "INSERT INTO room_members (room_id, user_id) VALUES ($1, $2) \
             ON CONFLICT (room_id, user_id) DO NOTHING",
        )
        .bind(room_id)
        .bind(user_id)
        .execute(pool)
        .await?;

        let members: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM room_members WHERE room_id = $1")
            .bind(room_id)
            .fetch_one(pool)
            .await?;

        Ok((inserted.rows_affected() == 1, members))
    }
}
