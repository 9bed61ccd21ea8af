//! XP ledger: idempotent, append-only awards with a daily cap.
//!
//! Exactly-once crediting rests on the store's insert-if-absent primitive
//! keyed by the dedupe key. This module adds the policy around it: the
//! daily cap, the write budget, and the canonical dedupe key formats.

use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use serde::Serialize;

use crate::error::StoreError;
use crate::models::{LedgerEntry, LedgerInsert, NewLedgerEntry, XpTotals};
use crate::ports::LedgerStore;
use crate::types::{DbId, Xp};

/// Default cap on XP granted to one user per UTC calendar day.
pub const DEFAULT_DAILY_CAP: Xp = 500;

/// Default budget for a single ledger write.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_millis(750);

/// Reason codes written to the ledger.
pub mod reasons {
    pub const CHECKIN: &str = "checkin";
    pub const TICKET_ENTRY: &str = "ticket_entry";
    pub const RESALE_PURCHASE: &str = "resale_purchase";
    pub const PRODUCT_PURCHASE: &str = "product_purchase";
    pub const CONNECT: &str = "connect";
    pub const ROOM_JOIN: &str = "room_join";
    pub const CARE: &str = "care";
    pub const PURCHASE: &str = "purchase";
}

/// Canonical dedupe keys. One key identifies one "at most once" event.
pub mod keys {
    use chrono::NaiveDate;

    use crate::types::DbId;

    /// One check-in award per beacon, per user, per UTC day.
    pub fn checkin(beacon_id: DbId, user_id: DbId, day: NaiveDate) -> String {
        format!("checkin:{beacon_id}:{user_id}:{day}")
    }

    pub fn ticket_entry(ticket_id: DbId) -> String {
        format!("ticket:{ticket_id}:entry")
    }

    pub fn resale_purchase(resale_id: DbId) -> String {
        format!("resale:{resale_id}:purchase")
    }

    pub fn product_purchase(beacon_id: DbId, payment_intent_id: &str) -> String {
        format!("product:{beacon_id}:{payment_intent_id}")
    }

    pub fn connect(from_user_id: DbId, to_user_id: DbId) -> String {
        format!("connect:{from_user_id}:{to_user_id}")
    }

    pub fn room_join(room_id: DbId, user_id: DbId) -> String {
        format!("room:{room_id}:{user_id}")
    }

    pub fn care(beacon_id: DbId, user_id: DbId, day: NaiveDate) -> String {
        format!("care:{beacon_id}:{user_id}:{day}")
    }

    pub fn order_purchase(order_id: DbId) -> String {
        format!("order:{order_id}:purchase_xp")
    }
}

/// Truncate `requested` so the day's total stays within `cap`.
pub fn apply_daily_cap(requested: Xp, already_today: i64, cap: Xp) -> Xp {
    let room = (i64::from(cap) - already_today).max(0);
    i64::from(requested.max(0)).min(room) as Xp
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("Ledger write timed out after {0} ms")]
    Timeout(u64),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// What happened to an award request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Award {
    /// `false` when the dedupe key had already been used.
    pub awarded: bool,
    /// Amount actually credited, after the daily cap.
    pub amount: Xp,
}

impl Award {
    pub const NONE: Award = Award { awarded: false, amount: 0 };
}

pub struct XpLedger {
    store: Arc<dyn LedgerStore>,
    daily_cap: Xp,
    write_timeout: Duration,
}

impl XpLedger {
    pub fn new(store: Arc<dyn LedgerStore>, daily_cap: Xp, write_timeout: Duration) -> Self {
        Self { store, daily_cap, write_timeout }
    }

    pub fn with_defaults(store: Arc<dyn LedgerStore>) -> Self {
        Self::new(store, DEFAULT_DAILY_CAP, DEFAULT_WRITE_TIMEOUT)
    }

    pub fn daily_cap(&self) -> Xp {
        self.daily_cap
    }

    /// Credit `amount` XP once per `dedupe_key`.
    ///
    /// A repeated key is a silent no-op reporting `awarded = false`. When the
    /// daily cap is already reached the entry is still written (for zero), so
    /// the key stays consumed.
    pub async fn award(
        &self,
        user_id: DbId,
        amount: Xp,
        dedupe_key: &str,
        reason: &str,
        metadata: serde_json::Value,
    ) -> Result<Award, LedgerError> {
        if amount <= 0 {
            return Ok(Award::NONE);
        }

        let entry = NewLedgerEntry {
            user_id,
            amount,
            reason: reason.to_string(),
            dedupe_key: dedupe_key.to_string(),
            metadata,
        };
        let day = Utc::now().date_naive();

        let write = self.store.insert_if_absent(&entry, self.daily_cap, day);
        let result = tokio::time::timeout(self.write_timeout, write)
            .await
            .map_err(|_| LedgerError::Timeout(self.write_timeout.as_millis() as u64))??;

        match result {
            LedgerInsert::Inserted(stored) => {
                if stored.amount < amount {
                    tracing::info!(
                        user_id,
                        requested = amount,
                        credited = stored.amount,
                        dedupe_key,
                        "XP award truncated by daily cap"
                    );
                }
                Ok(Award { awarded: true, amount: stored.amount })
            }
            LedgerInsert::Duplicate => {
                tracing::debug!(user_id, dedupe_key, "XP award already recorded");
                Ok(Award::NONE)
            }
        }
    }

    pub async fn totals(&self, user_id: DbId, day: NaiveDate) -> Result<XpTotals, LedgerError> {
        Ok(self.store.totals(user_id, day).await?)
    }

    pub async fn recent(&self, user_id: DbId, limit: i64) -> Result<Vec<LedgerEntry>, LedgerError> {
        Ok(self.store.recent(user_id, limit).await?)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;
    use crate::memory::MemoryLedger;

    fn ledger(cap: Xp) -> (XpLedger, Arc<MemoryLedger>) {
        let store = Arc::new(MemoryLedger::default());
        (XpLedger::new(store.clone(), cap, DEFAULT_WRITE_TIMEOUT), store)
    }

    #[test]
    fn daily_cap_truncates() {
        assert_eq!(apply_daily_cap(50, 0, 500), 50);
        assert_eq!(apply_daily_cap(50, 480, 500), 20);
        assert_eq!(apply_daily_cap(50, 500, 500), 0);
        assert_eq!(apply_daily_cap(50, 700, 500), 0);
        assert_eq!(apply_daily_cap(-5, 0, 500), 0);
    }

    #[tokio::test]
    async fn same_dedupe_key_awards_once() {
        let (ledger, store) = ledger(500);
        let first = ledger.award(1, 10, "k1", reasons::CHECKIN, json!({})).await.unwrap();
        let second = ledger.award(1, 10, "k1", reasons::CHECKIN, json!({})).await.unwrap();

        assert_eq!(first, Award { awarded: true, amount: 10 });
        assert_eq!(second, Award::NONE);
        assert_eq!(store.entries().len(), 1);
        assert_eq!(store.entries()[0].amount, 10);
    }

    #[tokio::test]
    async fn concurrent_awards_with_one_key_store_one_entry() {
        let (ledger, store) = ledger(500);
        let ledger = Arc::new(ledger);
        let mut handles = Vec::new();
        for _ in 0..16 {
            let ledger = Arc::clone(&ledger);
            handles.push(tokio::spawn(async move {
                ledger.award(7, 25, "race", reasons::TICKET_ENTRY, json!({})).await.unwrap()
            }));
        }
        let mut credited = 0;
        for h in handles {
            credited += h.await.unwrap().amount;
        }
        assert_eq!(credited, 25);
        assert_eq!(store.entries().len(), 1);
    }

    #[tokio::test]
    async fn cap_truncates_but_still_writes() {
        let (ledger, store) = ledger(30);
        ledger.award(1, 25, "a", reasons::CHECKIN, json!({})).await.unwrap();
        let award = ledger.award(1, 25, "b", reasons::CHECKIN, json!({})).await.unwrap();
        assert_eq!(award, Award { awarded: true, amount: 5 });

        let capped = ledger.award(1, 25, "c", reasons::CHECKIN, json!({})).await.unwrap();
        assert_eq!(capped, Award { awarded: true, amount: 0 });
        assert_eq!(store.entries().len(), 3);
    }

    #[tokio::test]
    async fn zero_amount_writes_nothing() {
        let (ledger, store) = ledger(500);
        let award = ledger.award(1, 0, "z", reasons::CARE, json!({})).await.unwrap();
        assert_eq!(award, Award::NONE);
        assert!(store.entries().is_empty());
    }

    #[tokio::test]
    async fn slow_store_times_out() {
        let store = Arc::new(MemoryLedger::default());
        store.set_delay(Duration::from_millis(200));
        let ledger = XpLedger::new(store.clone(), 500, Duration::from_millis(20));
        let err = ledger.award(1, 10, "slow", reasons::CHECKIN, json!({})).await.unwrap_err();
        assert_matches!(err, LedgerError::Timeout(20));
    }

    #[tokio::test]
    async fn failing_store_surfaces_error() {
        let store = Arc::new(MemoryLedger::default());
        store.set_failing(true);
        let ledger = XpLedger::with_defaults(store);
        let err = ledger.award(1, 10, "x", reasons::CHECKIN, json!({})).await.unwrap_err();
        assert_matches!(err, LedgerError::Store(StoreError::Unavailable(_)));
    }

    #[test]
    fn key_formats() {
        let day = NaiveDate::from_ymd_opt(2026, 10, 18).unwrap();
        assert_eq!(keys::checkin(3, 9, day), "checkin:3:9:2026-10-18");
        assert_eq!(keys::order_purchase(55), "order:55:purchase_xp");
        assert_eq!(keys::room_join(4, 2), "room:4:2");
    }
}
