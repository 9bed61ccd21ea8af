//! Kill switch row model.

use beacon_core::error::StoreError;
use beacon_core::kill_switch::{KillSwitch, KillSwitchScope};
use beacon_core::types::{DbId, Timestamp};
use sqlx::FromRow;

/// A row from the `kill_switches` table.
#[derive(Debug, Clone, FromRow)]
pub struct KillSwitchRow {
    pub id: DbId,
    pub scope: String,
    pub target: Option<String>,
    pub reason: String,
    pub is_active: bool,
    pub created_by: DbId,
    pub created_at: Timestamp,
    pub expires_at: Option<Timestamp>,
}

impl TryFrom<KillSwitchRow> for KillSwitch {
    type Error = StoreError;

    fn try_from(row: KillSwitchRow) -> Result<Self, Self::Error> {
        let scope = KillSwitchScope::parse(&row.scope).ok_or_else(|| {
            StoreError::Integrity(format!("unknown kill switch scope '{}'", row.scope))
        })?;
        Ok(KillSwitch {
            id: row.id,
            scope,
            target: row.target,
            reason: row.reason,
            is_active: row.is_active,
            created_by: row.created_by,
            created_at: row.created_at,
            expires_at: row.expires_at,
        })
    }
}
