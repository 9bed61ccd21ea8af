//! XP ledger row model. Ledger rows have no enum columns, so the core
//! [`LedgerEntry`] is built directly.

use beacon_core::models::LedgerEntry;
use beacon_core::types::{DbId, Timestamp, Xp};
use sqlx::FromRow;

/// A row from the `xp_ledger` table.
#[derive(Debug, Clone, FromRow)]
pub struct LedgerRow {
    pub id: DbId,
    pub user_id: DbId,
    pub amount: Xp,
    pub reason: String,
    pub dedupe_key: String,
    pub metadata: serde_json::Value,
    pub created_at: Timestamp,
}

impl From<LedgerRow> for LedgerEntry {
    fn from(row: LedgerRow) -> Self {
        LedgerEntry {
            id: row.id,
            user_id: row.user_id,
            amount: row.amount,
            reason: row.reason,
            dedupe_key: row.dedupe_key,
            metadata: row.metadata,
            created_at: row.created_at,
        }
    }
}
