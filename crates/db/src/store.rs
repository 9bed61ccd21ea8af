//! [`PgStore`]: the PostgreSQL implementation of every storage port.

use async_trait::async_trait;
use beacon_core::beacon::Beacon;
use beacon_core::error::{StoreError, StoreResult};
use beacon_core::kill_switch::{KillSwitch, NewKillSwitch};
use beacon_core::models::{
    ConnectionRequest, InboxEvent, LedgerEntry, LedgerInsert, Listing, NewLedgerEntry, Order,
    Provider, Resale, ResaleCompletion, ResaleOutcome, Reservation, RoomJoin, ScanEvent, Ticket,
    XpTotals,
};
use beacon_core::ports::{
    BeaconStore, ConnectionStore, KillSwitchStore, LedgerStore, ListingStore, OrderStore,
    ResaleStore, RoomStore, ScanEventStore, Stores, TicketStore, WebhookInbox,
};
use beacon_core::reconciliation::MAX_INBOX_ATTEMPTS;
use beacon_core::status::{BeaconStatus, OrderStatus};
use beacon_core::types::{DbId, Timestamp, Xp};
use chrono::NaiveDate;
use std::sync::Arc;

use crate::repositories::{
    BeaconRepo, CompleteOutcome, ConnectionRepo, KillSwitchRepo, ListingRepo, OrderRepo,
    ResaleRepo, ReserveOutcome, RoomRepo, ScanEventRepo, TicketRepo, WebhookEventRepo, XpLedgerRepo,
};
use crate::DbPool;

/// PostgreSQL unique-violation SQLSTATE.
const UNIQUE_VIOLATION: &str = "23505";

/// Translate a driver error into the port error vocabulary.
fn map_err(err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::Database(db) if db.code().as_deref() == Some(UNIQUE_VIOLATION) => {
            StoreError::Conflict(db.message().to_string())
        }
        sqlx::Error::PoolTimedOut => StoreError::Unavailable("connection pool timed out".into()),
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
            StoreError::Integrity(err.to_string())
        }
        _ => StoreError::Unavailable(err.to_string()),
    }
}

fn convert<R, T>(rows: Vec<R>) -> StoreResult<Vec<T>>
where
    T: TryFrom<R, Error = StoreError>,
{
    rows.into_iter().map(T::try_from).collect()
}

#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    /// Every port backed by this one pool.
    pub fn stores(self: &Arc<Self>) -> Stores {
        Stores {
            beacons: self.clone(),
            tickets: self.clone(),
            resales: self.clone(),
            listings: self.clone(),
            connections: self.clone(),
            rooms: self.clone(),
            kill_switches: self.clone(),
            ledger: self.clone(),
            orders: self.clone(),
            inbox: self.clone(),
        }
    }
}

#[async_trait]
impl BeaconStore for PgStore {
    async fn find_by_code(&self, code: &str) -> StoreResult<Option<Beacon>> {
        BeaconRepo::find_by_code(&self.pool, code)
            .await
            .map_err(map_err)?
            .map(Beacon::try_from)
            .transpose()
    }

    async fn find_by_id(&self, id: DbId) -> StoreResult<Option<Beacon>> {
        BeaconRepo::find_by_id(&self.pool, id)
            .await
            .map_err(map_err)?
            .map(Beacon::try_from)
            .transpose()
    }

    async fn increment_scan_count(&self, id: DbId) -> StoreResult<Option<i64>> {
        BeaconRepo::increment_scan_count(&self.pool, id).await.map_err(map_err)
    }

    async fn consume_user_quota(
        &self,
        beacon_id: DbId,
        user_id: DbId,
        day: NaiveDate,
        limit: i32,
    ) -> StoreResult<bool> {
        BeaconRepo::consume_user_quota(&self.pool, beacon_id, user_id, day, limit)
            .await
            .map_err(map_err)
    }

    async fn release_user_quota(
        &self,
        beacon_id: DbId,
        user_id: DbId,
        day: NaiveDate,
    ) -> StoreResult<()> {
        BeaconRepo::release_user_quota(&self.pool, beacon_id, user_id, day)
            .await
            .map_err(map_err)
    }

    async fn transition_status(
        &self,
        id: DbId,
        from: BeaconStatus,
        to: BeaconStatus,
    ) -> StoreResult<bool> {
        BeaconRepo::transition_status(&self.pool, id, from, to).await.map_err(map_err)
    }

    async fn expire_due(&self, now: Timestamp) -> StoreResult<u64> {
        BeaconRepo::expire_due(&self.pool, now).await.map_err(map_err)
    }

    async fn owner_is_premium(&self, owner_id: DbId, now: Timestamp) -> StoreResult<bool> {
        BeaconRepo::owner_is_premium(&self.pool, owner_id, now).await.map_err(map_err)
    }

    async fn ping(&self) -> StoreResult<()> {
        crate::health_check(&self.pool).await.map_err(map_err)
    }
}

#[async_trait]
impl TicketStore for PgStore {
    async fn find(&self, id: DbId) -> StoreResult<Option<Ticket>> {
        TicketRepo::find(&self.pool, id)
            .await
            .map_err(map_err)?
            .map(Ticket::try_from)
            .transpose()
    }

    async fn mark_scanned(
        &self,
        id: DbId,
        scanned_by: Option<DbId>,
        beacon_id: DbId,
        at: Timestamp,
    ) -> StoreResult<bool> {
        TicketRepo::mark_scanned(&self.pool, id, scanned_by, beacon_id, at)
            .await
            .map_err(map_err)
    }
}

#[async_trait]
impl ResaleStore for PgStore {
    async fn find(&self, id: DbId) -> StoreResult<Option<Resale>> {
        ResaleRepo::find(&self.pool, id)
            .await
            .map_err(map_err)?
            .map(Resale::try_from)
            .transpose()
    }

    async fn complete(
        &self,
        resale_id: DbId,
        buyer_id: DbId,
        payment_intent_id: &str,
        at: Timestamp,
    ) -> StoreResult<ResaleOutcome> {
        let outcome = ResaleRepo::complete(&self.pool, resale_id, buyer_id, payment_intent_id, at)
            .await
            .map_err(map_err)?;
        Ok(match outcome {
            CompleteOutcome::Completed(c) => ResaleOutcome::Completed(ResaleCompletion {
                resale_id,
                seller_id: c.seller_id,
                buyer_id,
                old_ticket_id: c.old_ticket_id,
                new_ticket_id: c.new_ticket_id,
            }),
            CompleteOutcome::NotActive => ResaleOutcome::NotActive,
            CompleteOutcome::TicketNotValid => ResaleOutcome::TicketNotValid,
            CompleteOutcome::PaymentUsed => ResaleOutcome::PaymentUsed,
        })
    }
}

#[async_trait]
impl ListingStore for PgStore {
    async fn find(&self, id: DbId) -> StoreResult<Option<Listing>> {
        ListingRepo::find(&self.pool, id)
            .await
            .map_err(map_err)?
            .map(Listing::try_from)
            .transpose()
    }

    async fn reserve(
        &self,
        listing_id: DbId,
        buyer_id: DbId,
        beacon_id: Option<DbId>,
        payment_intent_id: &str,
    ) -> StoreResult<Reservation> {
        let outcome =
            ListingRepo::reserve(&self.pool, listing_id, buyer_id, beacon_id, payment_intent_id)
                .await
                .map_err(map_err)?;
        Ok(match outcome {
            ReserveOutcome::Reserved(row) => Reservation::Reserved(Order::try_from(row)?),
            ReserveOutcome::SoldOut => Reservation::SoldOut,
            ReserveOutcome::NotActive => Reservation::NotActive,
            ReserveOutcome::PaymentUsed => Reservation::PaymentUsed,
        })
    }
}

#[async_trait]
impl ConnectionStore for PgStore {
    async fn request(
        &self,
        from_user_id: DbId,
        to_user_id: DbId,
        beacon_id: DbId,
    ) -> StoreResult<(ConnectionRequest, bool)> {
        let (row, created) = ConnectionRepo::request(&self.pool, from_user_id, to_user_id, beacon_id)
            .await
            .map_err(map_err)?;
        Ok((ConnectionRequest::try_from(row)?, created))
    }

    async fn pending_for(&self, user_id: DbId) -> StoreResult<i64> {
        ConnectionRepo::pending_for(&self.pool, user_id).await.map_err(map_err)
    }
}

#[async_trait]
impl RoomStore for PgStore {
    async fn join(&self, room_id: DbId, user_id: DbId) -> StoreResult<RoomJoin> {
        let (newly_joined, member_count) =
            RoomRepo::join(&self.pool, room_id, user_id).await.map_err(map_err)?;
        Ok(RoomJoin { room_id, newly_joined, member_count })
    }
}

#[async_trait]
impl KillSwitchStore for PgStore {
    async fn list_live(&self, now: Timestamp) -> StoreResult<Vec<KillSwitch>> {
        convert(KillSwitchRepo::list_live(&self.pool, now).await.map_err(map_err)?)
    }

    async fn list_all(&self) -> StoreResult<Vec<KillSwitch>> {
        convert(KillSwitchRepo::list_all(&self.pool).await.map_err(map_err)?)
    }

    async fn create(&self, input: &NewKillSwitch) -> StoreResult<KillSwitch> {
        KillSwitchRepo::create(&self.pool, input)
            .await
            .map_err(map_err)?
            .try_into()
    }

    async fn deactivate(&self, id: DbId) -> StoreResult<Option<KillSwitch>> {
        KillSwitchRepo::deactivate(&self.pool, id)
            .await
            .map_err(map_err)?
            .map(KillSwitch::try_from)
            .transpose()
    }
}

#[async_trait]
impl LedgerStore for PgStore {
    async fn insert_if_absent(
        &self,
        entry: &NewLedgerEntry,
        daily_cap: Xp,
        day: NaiveDate,
    ) -> StoreResult<LedgerInsert> {
        let row = XpLedgerRepo::insert_if_absent(&self.pool, entry, daily_cap, day)
            .await
            .map_err(map_err)?;
        Ok(match row {
            Some(row) => LedgerInsert::Inserted(row.into()),
            None => LedgerInsert::Duplicate,
        })
    }

    async fn totals(&self, user_id: DbId, day: NaiveDate) -> StoreResult<XpTotals> {
        let (today, lifetime) =
            XpLedgerRepo::totals(&self.pool, user_id, day).await.map_err(map_err)?;
        Ok(XpTotals { today, lifetime })
    }

    async fn recent(&self, user_id: DbId, limit: i64) -> StoreResult<Vec<LedgerEntry>> {
        let rows = XpLedgerRepo::recent(&self.pool, user_id, limit).await.map_err(map_err)?;
        Ok(rows.into_iter().map(LedgerEntry::from).collect())
    }
}

#[async_trait]
impl ScanEventStore for PgStore {
    async fn insert(&self, event: &ScanEvent) -> StoreResult<DbId> {
        ScanEventRepo::insert(&self.pool, event).await.map_err(map_err)
    }
}

#[async_trait]
impl OrderStore for PgStore {
    async fn find(&self, id: DbId) -> StoreResult<Option<Order>> {
        OrderRepo::find(&self.pool, id)
            .await
            .map_err(map_err)?
            .map(Order::try_from)
            .transpose()
    }

    async fn find_by_provider_ref(&self, reference: &str) -> StoreResult<Option<Order>> {
        OrderRepo::find_by_provider_ref(&self.pool, reference)
            .await
            .map_err(map_err)?
            .map(Order::try_from)
            .transpose()
    }

    async fn transition(
        &self,
        id: DbId,
        from: OrderStatus,
        to: OrderStatus,
        release_stock: bool,
    ) -> StoreResult<bool> {
        OrderRepo::transition(&self.pool, id, from, to, release_stock)
            .await
            .map_err(map_err)
    }
}

#[async_trait]
impl WebhookInbox for PgStore {
    async fn enqueue(
        &self,
        provider: Provider,
        event_id: &str,
        event_type: &str,
        payload: &serde_json::Value,
    ) -> StoreResult<Option<DbId>> {
        WebhookEventRepo::enqueue(&self.pool, provider.as_str(), event_id, event_type, payload)
            .await
            .map_err(map_err)
    }

    async fn find(&self, id: DbId) -> StoreResult<Option<InboxEvent>> {
        WebhookEventRepo::find(&self.pool, id)
            .await
            .map_err(map_err)?
            .map(InboxEvent::try_from)
            .transpose()
    }

    async fn pending(&self, older_than: Timestamp, limit: i64) -> StoreResult<Vec<InboxEvent>> {
        convert(
            WebhookEventRepo::claim_pending(&self.pool, older_than, limit, MAX_INBOX_ATTEMPTS)
                .await
                .map_err(map_err)?,
        )
    }

    async fn mark_processed(&self, id: DbId, outcome: &str) -> StoreResult<()> {
        WebhookEventRepo::mark_processed(&self.pool, id, outcome).await.map_err(map_err)
    }

    async fn record_failure(&self, id: DbId, error: &str) -> StoreResult<()> {
        WebhookEventRepo::record_failure(&self.pool, id, error).await.map_err(map_err)
    }
}
