//! Connection request row model.

use beacon_core::error::StoreError;
use beacon_core::models::ConnectionRequest;
use beacon_core::types::{DbId, Timestamp};
use sqlx::FromRow;

/// A row from the `connection_requests` table.
#[derive(Debug, Clone, FromRow)]
pub struct ConnectionRequestRow {
    pub id: DbId,
    pub from_user_id: DbId,
    pub to_user_id: DbId,
    pub beacon_id: Option<DbId>,
    pub status: String,
    pub created_at: Timestamp,
}

impl TryFrom<ConnectionRequestRow> for ConnectionRequest {
    type Error = StoreError;

    fn try_from(row: ConnectionRequestRow) -> Result<Self, Self::Error> {
        Ok(ConnectionRequest {
            id: row.id,
            from_user_id: row.from_user_id,
            to_user_id: row.to_user_id,
            beacon_id: row.beacon_id,
            status: row.status.parse()?,
            created_at: row.created_at,
        })
    }
}
