//! Storage and collaborator ports.
//!
//! The scan engine and the reconciler only talk to the outside world through
//! these traits. `beacon-db` implements them on PostgreSQL; [`crate::memory`]
//! implements them in memory for tests.
//!
//! Every write that can race is specified as a single conditional operation
//! (insert-if-absent, update-where-status), never as read-then-write.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::beacon::Beacon;
use crate::error::StoreResult;
use crate::kill_switch::{KillSwitch, NewKillSwitch};
use crate::models::{
    ConnectionRequest, InboxEvent, LedgerEntry, LedgerInsert, Listing, NewLedgerEntry,
    Notification, Order, Provider, Resale, ResaleOutcome, Reservation, RoomJoin, ScanEvent,
    Ticket, VerifiedIntent, XpTotals,
};
use crate::status::{BeaconStatus, OrderStatus};
use crate::types::{DbId, Timestamp, Xp};

#[async_trait]
pub trait BeaconStore: Send + Sync {
    async fn find_by_code(&self, code: &str) -> StoreResult<Option<Beacon>>;

    async fn find_by_id(&self, id: DbId) -> StoreResult<Option<Beacon>>;

    /// Atomically bump `scan_count`, refusing once `scan_limit` is reached.
    /// Reaching the limit flips the beacon to `expired` in the same write.
    /// Returns the new count, or `None` when the limit was already hit.
    async fn increment_scan_count(&self, id: DbId) -> StoreResult<Option<i64>>;

    /// Consume one unit of a per-user daily quota. `false` once exhausted.
    async fn consume_user_quota(
        &self,
        beacon_id: DbId,
        user_id: DbId,
        day: NaiveDate,
        limit: i32,
    ) -> StoreResult<bool>;

    /// Give back a unit taken by [`consume_user_quota`](Self::consume_user_quota)
    /// for a scan that ended up performing nothing.
    async fn release_user_quota(
        &self,
        beacon_id: DbId,
        user_id: DbId,
        day: NaiveDate,
    ) -> StoreResult<()>;

    /// Conditional status update (`WHERE status = from`).
    async fn transition_status(
        &self,
        id: DbId,
        from: BeaconStatus,
        to: BeaconStatus,
    ) -> StoreResult<bool>;

    /// Expire every active or paused beacon whose window closed before `now`.
    async fn expire_due(&self, now: Timestamp) -> StoreResult<u64>;

    async fn owner_is_premium(&self, owner_id: DbId, now: Timestamp) -> StoreResult<bool>;

    /// Cheap reachability probe for health checks.
    async fn ping(&self) -> StoreResult<()>;
}

#[async_trait]
pub trait TicketStore: Send + Sync {
    async fn find(&self, id: DbId) -> StoreResult<Option<Ticket>>;

    /// `valid -> scanned` plus a history row, in one transaction.
    /// `false` when the ticket was not `valid` at write time.
    async fn mark_scanned(
        &self,
        id: DbId,
        scanned_by: Option<DbId>,
        beacon_id: DbId,
        at: Timestamp,
    ) -> StoreResult<bool>;
}

#[async_trait]
pub trait ResaleStore: Send + Sync {
    async fn find(&self, id: DbId) -> StoreResult<Option<Resale>>;

    /// Mark the resale sold, retire the seller's ticket as `transferred` and
    /// issue a fresh `valid` ticket to the buyer, atomically. The seller's
    /// ticket must still be `valid` and the payment intent must not have
    /// paid for any other order or resale; otherwise nothing is written.
    async fn complete(
        &self,
        resale_id: DbId,
        buyer_id: DbId,
        payment_intent_id: &str,
        at: Timestamp,
    ) -> StoreResult<ResaleOutcome>;
}

#[async_trait]
pub trait ListingStore: Send + Sync {
    async fn find(&self, id: DbId) -> StoreResult<Option<Listing>>;

    /// Take one unit of stock and open a `created` order for it.
    ///
    /// Each payment intent pays for at most one purchase across orders and
    /// resales: an intent already claimed elsewhere yields
    /// [`Reservation::PaymentUsed`].
    async fn reserve(
        &self,
        listing_id: DbId,
        buyer_id: DbId,
        beacon_id: Option<DbId>,
        payment_intent_id: &str,
    ) -> StoreResult<Reservation>;
}

#[async_trait]
pub trait ConnectionStore: Send + Sync {
    /// Create a pending request, or return the existing one for the pair.
    /// The flag is `true` when a new row was written.
    async fn request(
        &self,
        from_user_id: DbId,
        to_user_id: DbId,
        beacon_id: DbId,
    ) -> StoreResult<(ConnectionRequest, bool)>;

    async fn pending_for(&self, user_id: DbId) -> StoreResult<i64>;
}

#[async_trait]
pub trait RoomStore: Send + Sync {
    async fn join(&self, room_id: DbId, user_id: DbId) -> StoreResult<RoomJoin>;
}

#[async_trait]
pub trait KillSwitchStore: Send + Sync {
    /// Active switches that have not expired at `now`.
    async fn list_live(&self, now: Timestamp) -> StoreResult<Vec<KillSwitch>>;

    async fn list_all(&self) -> StoreResult<Vec<KillSwitch>>;

    async fn create(&self, input: &NewKillSwitch) -> StoreResult<KillSwitch>;

    async fn deactivate(&self, id: DbId) -> StoreResult<Option<KillSwitch>>;
}

#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Insert the entry unless its dedupe key already exists.
    ///
    /// The stored amount is the requested amount truncated so the user's
    /// total for `day` does not exceed `daily_cap`. Both the dedupe check and
    /// the cap computation happen inside the same atomic write.
    async fn insert_if_absent(
        &self,
        entry: &NewLedgerEntry,
        daily_cap: Xp,
        day: NaiveDate,
    ) -> StoreResult<LedgerInsert>;

    async fn totals(&self, user_id: DbId, day: NaiveDate) -> StoreResult<XpTotals>;

    async fn recent(&self, user_id: DbId, limit: i64) -> StoreResult<Vec<LedgerEntry>>;
}

#[async_trait]
pub trait ScanEventStore: Send + Sync {
    async fn insert(&self, event: &ScanEvent) -> StoreResult<DbId>;
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn find(&self, id: DbId) -> StoreResult<Option<Order>>;

    /// Look an order up by provider checkout session or payment intent id.
    async fn find_by_provider_ref(&self, reference: &str) -> StoreResult<Option<Order>>;

    /// Conditional status update. When `release_stock` is set the order's
    /// quantity is returned to its listing in the same transaction, guarded
    /// by the order's `stock_released` flag.
    async fn transition(
        &self,
        id: DbId,
        from: OrderStatus,
        to: OrderStatus,
        release_stock: bool,
    ) -> StoreResult<bool>;
}

#[async_trait]
pub trait WebhookInbox: Send + Sync {
    /// Durably store a verified provider event. `None` when the
    /// `(provider, event_id)` pair was already received.
    async fn enqueue(
        &self,
        provider: Provider,
        event_id: &str,
        event_type: &str,
        payload: &serde_json::Value,
    ) -> StoreResult<Option<DbId>>;

    async fn find(&self, id: DbId) -> StoreResult<Option<InboxEvent>>;

    /// Unprocessed events received before `older_than`, oldest first.
    async fn pending(&self, older_than: Timestamp, limit: i64) -> StoreResult<Vec<InboxEvent>>;

    async fn mark_processed(&self, id: DbId, outcome: &str) -> StoreResult<()>;

    async fn record_failure(&self, id: DbId, error: &str) -> StoreResult<()>;
}

/// External payment-intent verification.
#[async_trait]
pub trait PaymentVerifier: Send + Sync {
    async fn verify(&self, payment_intent_id: &str) -> StoreResult<Option<VerifiedIntent>>;
}

/// Fire-and-forget scan event recording. Implementations must not block the
/// caller and must route their own failures to operational alerting.
pub trait ScanEventSink: Send + Sync {
    fn record(&self, event: ScanEvent);
}

/// Best-effort notification dispatch. Never blocks the caller.
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Every port the engine needs, bundled for wiring.
#[derive(Clone)]
pub struct Stores {
    pub beacons: Arc<dyn BeaconStore>,
    pub tickets: Arc<dyn TicketStore>,
    pub resales: Arc<dyn ResaleStore>,
    pub listings: Arc<dyn ListingStore>,
    pub connections: Arc<dyn ConnectionStore>,
    pub rooms: Arc<dyn RoomStore>,
    pub kill_switches: Arc<dyn KillSwitchStore>,
    pub ledger: Arc<dyn LedgerStore>,
    pub orders: Arc<dyn OrderStore>,
    pub inbox: Arc<dyn WebhookInbox>,
}
