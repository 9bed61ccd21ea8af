//! In-memory port implementations.
//!
//! Used by unit tests across the workspace and by the API integration tests.
//! Every conditional write happens under a single lock, so these fakes keep
//! the same atomicity the PostgreSQL store gets from its transactions.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};

use crate::beacon::Beacon;
use crate::error::{StoreError, StoreResult};
use crate::kill_switch::{KillSwitch, NewKillSwitch};
use crate::ledger::apply_daily_cap;
use crate::models::{
    ConnectionRequest, InboxEvent, LedgerEntry, LedgerInsert, Listing, NewLedgerEntry,
    Notification, Order, Provider, Resale, ResaleCompletion, ResaleOutcome, Reservation,
    RoomJoin, ScanEvent, Ticket, VerifiedIntent, XpTotals,
};
use crate::ports::{
    BeaconStore, ConnectionStore, KillSwitchStore, LedgerStore, ListingStore, Notifier,
    OrderStore, PaymentVerifier, ResaleStore, RoomStore, ScanEventSink, ScanEventStore, Stores,
    TicketStore, WebhookInbox,
};
use crate::reconciliation::MAX_INBOX_ATTEMPTS;
use crate::status::{
    BeaconStatus, ConnectionStatus, ListingStatus, OrderStatus, ResaleStatus, TicketStatus,
};
use crate::types::{DbId, Timestamp, Xp};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// Domain store
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct InboxRow {
    event: InboxEvent,
    outcome: Option<String>,
    last_error: Option<String>,
}

#[derive(Default)]
struct State {
    last_id: DbId,
    beacons: BTreeMap<DbId, Beacon>,
    premium_owners: BTreeSet<DbId>,
    daily_scans: HashMap<(DbId, DbId, NaiveDate), i32>,
    tickets: BTreeMap<DbId, Ticket>,
    ticket_history: Vec<(DbId, String)>,
    resales: BTreeMap<DbId, Resale>,
    listings: BTreeMap<DbId, Listing>,
    orders: BTreeMap<DbId, Order>,
    payment_claims: BTreeSet<String>,
    connections: Vec<ConnectionRequest>,
    rooms: HashMap<DbId, BTreeSet<DbId>>,
    kill_switches: Vec<KillSwitch>,
    inbox: Vec<InboxRow>,
}

impl State {
    /// Generated ids start high so they never collide with seeded fixtures.
    fn next_id(&mut self) -> DbId {
        self.last_id += 1;
        10_000 + self.last_id
    }

    fn intent_claimed(&self, payment_intent_id: &str) -> bool {
        self.payment_claims.contains(payment_intent_id)
    }
}

/// Every domain port except the ledger, backed by one mutex.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    /// Bundle this store with a ledger into the engine's port set.
    pub fn stores(self: &Arc<Self>, ledger: Arc<dyn LedgerStore>) -> Stores {
        Stores {
            beacons: self.clone(),
            tickets: self.clone(),
            resales: self.clone(),
            listings: self.clone(),
            connections: self.clone(),
            rooms: self.clone(),
            kill_switches: self.clone(),
            ledger,
            orders: self.clone(),
            inbox: self.clone(),
        }
    }

    /// Make every subsequent write fail with [`StoreError::Unavailable`].
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn write(&self) -> StoreResult<MutexGuard<'_, State>> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected write failure".into()));
        }
        Ok(lock(&self.state))
    }

    fn state(&self) -> MutexGuard<'_, State> {
        lock(&self.state)
    }

    // -- seeding ----------------------------------------------------------

    /// Insert or replace a beacon by id.
    pub fn add_beacon(&self, beacon: Beacon) {
        self.state().beacons.insert(beacon.id, beacon);
    }

    pub fn set_premium(&self, owner_id: DbId) {
        self.state().premium_owners.insert(owner_id);
    }

    pub fn add_ticket(&self, ticket: Ticket) {
        self.state().tickets.insert(ticket.id, ticket);
    }

    pub fn add_resale(&self, resale: Resale) {
        self.state().resales.insert(resale.id, resale);
    }

    pub fn add_listing(&self, listing: Listing) {
        self.state().listings.insert(listing.id, listing);
    }

    pub fn add_order(&self, order: Order) {
        let mut state = self.state();
        if let Some(intent) = &order.provider_intent_id {
            state.payment_claims.insert(intent.clone());
        }
        state.orders.insert(order.id, order);
    }

    pub fn add_kill_switch(&self, input: NewKillSwitch) -> KillSwitch {
        let mut state = self.state();
        let switch = KillSwitch {
            id: state.next_id(),
            scope: input.scope,
            target: input.target,
            reason: input.reason,
            is_active: true,
            created_by: input.created_by,
            created_at: Utc::now(),
            expires_at: input.expires_at,
        };
        state.kill_switches.push(switch.clone());
        switch
    }

    // -- inspection -------------------------------------------------------

    pub fn beacon(&self, id: DbId) -> Option<Beacon> {
        self.state().beacons.get(&id).cloned()
    }

    pub fn ticket(&self, id: DbId) -> Option<Ticket> {
        self.state().tickets.get(&id).cloned()
    }

    /// History actions recorded for a ticket, oldest first.
    pub fn ticket_history(&self, id: DbId) -> Vec<String> {
        self.state()
            .ticket_history
            .iter()
            .filter(|(t, _)| *t == id)
            .map(|(_, action)| action.clone())
            .collect()
    }

    pub fn resale(&self, id: DbId) -> Option<Resale> {
        self.state().resales.get(&id).cloned()
    }

    pub fn listing(&self, id: DbId) -> Option<Listing> {
        self.state().listings.get(&id).cloned()
    }

    pub fn order(&self, id: DbId) -> Option<Order> {
        self.state().orders.get(&id).cloned()
    }

    pub fn orders(&self) -> Vec<Order> {
        self.state().orders.values().cloned().collect()
    }

    /// Outcome label of a processed inbox row.
    pub fn inbox_outcome(&self, id: DbId) -> Option<String> {
        self.state()
            .inbox
            .iter()
            .find(|row| row.event.id == id)
            .and_then(|row| row.outcome.clone())
    }

    pub fn inbox_error(&self, id: DbId) -> Option<String> {
        self.state()
            .inbox
            .iter()
            .find(|row| row.event.id == id)
            .and_then(|row| row.last_error.clone())
    }

    /// Backdate an inbox row so the retry poller picks it up.
    pub fn age_inbox_event(&self, id: DbId, by: chrono::Duration) {
        if let Some(row) = self.state().inbox.iter_mut().find(|row| row.event.id == id) {
            row.event.received_at -= by;
        }
    }
}

#[async_trait]
impl BeaconStore for MemoryStore {
    async fn find_by_code(&self, code: &str) -> StoreResult<Option<Beacon>> {
        Ok(self.state().beacons.values().find(|b| b.code == code).cloned())
    }

    async fn find_by_id(&self, id: DbId) -> StoreResult<Option<Beacon>> {
        Ok(self.state().beacons.get(&id).cloned())
    }

    async fn increment_scan_count(&self, id: DbId) -> StoreResult<Option<i64>> {
        let mut state = self.write()?;
        let Some(beacon) = state.beacons.get_mut(&id) else {
            return Ok(None);
        };
        if beacon.scan_limit.is_some_and(|limit| beacon.scan_count >= limit) {
            return Ok(None);
        }
        beacon.scan_count += 1;
        if beacon.scan_limit.is_some_and(|limit| beacon.scan_count >= limit)
            && beacon.status == BeaconStatus::Active
        {
            beacon.status = BeaconStatus::Expired;
        }
        Ok(Some(beacon.scan_count))
    }

    async fn consume_user_quota(
        &self,
        beacon_id: DbId,
        user_id: DbId,
        day: NaiveDate,
        limit: i32,
    ) -> StoreResult<bool> {
        let mut state = self.write()?;
        let used = state.daily_scans.entry((beacon_id, user_id, day)).or_insert(0);
        if *used >= limit {
            return Ok(false);
        }
        *used += 1;
        Ok(true)
    }

    async fn release_user_quota(
        &self,
        beacon_id: DbId,
        user_id: DbId,
        day: NaiveDate,
    ) -> StoreResult<()> {
        let mut state = self.write()?;
        if let Some(used) = state.daily_scans.get_mut(&(beacon_id, user_id, day)) {
            *used = (*used - 1).max(0);
        }
        Ok(())
    }

    async fn transition_status(
        &self,
        id: DbId,
        from: BeaconStatus,
        to: BeaconStatus,
    ) -> StoreResult<bool> {
        let mut state = self.write()?;
        match state.beacons.get_mut(&id) {
            Some(b) if b.status == from => {
                b.status = to;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn expire_due(&self, now: Timestamp) -> StoreResult<u64> {
        let mut state = self.write()?;
        let mut expired = 0;
        for b in state.beacons.values_mut() {
            let live = matches!(b.status, BeaconStatus::Active | BeaconStatus::Paused);
            if live && b.active_until.is_some_and(|until| until <= now) {
                b.status = BeaconStatus::Expired;
                expired += 1;
            }
        }
        Ok(expired)
    }

    async fn owner_is_premium(&self, owner_id: DbId, _now: Timestamp) -> StoreResult<bool> {
        Ok(self.state().premium_owners.contains(&owner_id))
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}

#[async_trait]
impl TicketStore for MemoryStore {
    async fn find(&self, id: DbId) -> StoreResult<Option<Ticket>> {
        Ok(self.state().tickets.get(&id).cloned())
    }

    async fn mark_scanned(
        &self,
        id: DbId,
        _scanned_by: Option<DbId>,
        _beacon_id: DbId,
        _at: Timestamp,
    ) -> StoreResult<bool> {
        let mut state = self.write()?;
        match state.tickets.get_mut(&id) {
            Some(t) if t.status == TicketStatus::Valid => {
                t.status = TicketStatus::Scanned;
                state.ticket_history.push((id, "scanned".into()));
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl ResaleStore for MemoryStore {
    async fn find(&self, id: DbId) -> StoreResult<Option<Resale>> {
        Ok(self.state().resales.get(&id).cloned())
    }

    async fn complete(
        &self,
        resale_id: DbId,
        buyer_id: DbId,
        payment_intent_id: &str,
        at: Timestamp,
    ) -> StoreResult<ResaleOutcome> {
        let mut state = self.write()?;
        let Some(resale) = state.resales.get(&resale_id).cloned() else {
            return Ok(ResaleOutcome::NotActive);
        };
        if resale.status != ResaleStatus::Active {
            return Ok(ResaleOutcome::NotActive);
        }
        let Some(old) = state.tickets.get(&resale.ticket_id).cloned() else {
            return Err(StoreError::Integrity(format!(
                "resale {resale_id} references missing ticket {}",
                resale.ticket_id
            )));
        };
        if old.status != TicketStatus::Valid {
            return Ok(ResaleOutcome::TicketNotValid);
        }
        if state.intent_claimed(payment_intent_id) {
            return Ok(ResaleOutcome::PaymentUsed);
        }
        state.payment_claims.insert(payment_intent_id.to_string());

        let new_ticket_id = state.next_id();
        if let Some(r) = state.resales.get_mut(&resale_id) {
            r.status = ResaleStatus::Sold;
            r.buyer_id = Some(buyer_id);
        }
        if let Some(t) = state.tickets.get_mut(&old.id) {
            t.status = TicketStatus::Transferred;
        }
        state.tickets.insert(
            new_ticket_id,
            Ticket {
                id: new_ticket_id,
                event_id: old.event_id,
                owner_id: buyer_id,
                status: TicketStatus::Valid,
                issued_at: at,
            },
        );
        state.ticket_history.push((old.id, "transferred".into()));
        state.ticket_history.push((new_ticket_id, "issued".into()));

        Ok(ResaleOutcome::Completed(ResaleCompletion {
            resale_id,
            seller_id: resale.seller_id,
            buyer_id,
            old_ticket_id: old.id,
            new_ticket_id,
        }))
    }
}

#[async_trait]
impl ListingStore for MemoryStore {
    async fn find(&self, id: DbId) -> StoreResult<Option<Listing>> {
        Ok(self.state().listings.get(&id).cloned())
    }

    async fn reserve(
        &self,
        listing_id: DbId,
        buyer_id: DbId,
        beacon_id: Option<DbId>,
        payment_intent_id: &str,
    ) -> StoreResult<Reservation> {
        let mut state = self.write()?;
        if let Some(existing) = state
            .orders
            .values()
            .find(|o| o.provider_intent_id.as_deref() == Some(payment_intent_id))
        {
            if existing.listing_id == Some(listing_id) && existing.buyer_id == buyer_id {
                return Ok(Reservation::Reserved(existing.clone()));
            }
            return Ok(Reservation::PaymentUsed);
        }
        if state.intent_claimed(payment_intent_id) {
            return Ok(Reservation::PaymentUsed);
        }

        let Some(listing) = state.listings.get_mut(&listing_id) else {
            return Ok(Reservation::NotActive);
        };
        match listing.status {
            ListingStatus::Active if listing.stock > 0 => {}
            ListingStatus::Active | ListingStatus::SoldOut => return Ok(Reservation::SoldOut),
            ListingStatus::Draft | ListingStatus::Closed => return Ok(Reservation::NotActive),
        }
        listing.stock -= 1;
        if listing.stock == 0 {
            listing.status = ListingStatus::SoldOut;
        }
        let (vendor_id, price_cents, currency) =
            (listing.vendor_id, listing.price_cents, listing.currency.clone());

        let now = Utc::now();
        let order = Order {
            id: state.next_id(),
            buyer_id,
            seller_id: Some(vendor_id),
            listing_id: Some(listing_id),
            beacon_id,
            quantity: 1,
            status: OrderStatus::Created,
            total_cents: price_cents,
            currency,
            provider_session_id: None,
            provider_intent_id: Some(payment_intent_id.to_string()),
            stock_released: false,
            created_at: now,
            updated_at: now,
        };
        state.payment_claims.insert(payment_intent_id.to_string());
        state.orders.insert(order.id, order.clone());
        Ok(Reservation::Reserved(order))
    }
}

#[async_trait]
impl ConnectionStore for MemoryStore {
    async fn request(
        &self,
        from_user_id: DbId,
        to_user_id: DbId,
        beacon_id: DbId,
    ) -> StoreResult<(ConnectionRequest, bool)> {
        let mut state = self.write()?;
        if let Some(existing) = state
            .connections
            .iter()
            .find(|c| c.from_user_id == from_user_id && c.to_user_id == to_user_id)
        {
            return Ok((existing.clone(), false));
        }
        let request = ConnectionRequest {
            id: state.next_id(),
            from_user_id,
            to_user_id,
            beacon_id: Some(beacon_id),
            status: ConnectionStatus::Pending,
            created_at: Utc::now(),
        };
        state.connections.push(request.clone());
        Ok((request, true))
    }

    async fn pending_for(&self, user_id: DbId) -> StoreResult<i64> {
        Ok(self
            .state()
            .connections
            .iter()
            .filter(|c| c.to_user_id == user_id && c.status == ConnectionStatus::Pending)
            .count() as i64)
    }
}

#[async_trait]
impl RoomStore for MemoryStore {
    async fn join(&self, room_id: DbId, user_id: DbId) -> StoreResult<RoomJoin> {
        let mut state = self.write()?;
        let members = state.rooms.entry(room_id).or_default();
        let newly_joined = members.insert(user_id);
        Ok(RoomJoin { room_id, newly_joined, member_count: members.len() as i64 })
    }
}

#[async_trait]
impl KillSwitchStore for MemoryStore {
    async fn list_live(&self, now: Timestamp) -> StoreResult<Vec<KillSwitch>> {
        Ok(self.state().kill_switches.iter().filter(|s| s.is_live(now)).cloned().collect())
    }

    async fn list_all(&self) -> StoreResult<Vec<KillSwitch>> {
        Ok(self.state().kill_switches.clone())
    }

    async fn create(&self, input: &NewKillSwitch) -> StoreResult<KillSwitch> {
        drop(self.write()?);
        Ok(self.add_kill_switch(input.clone()))
    }

    async fn deactivate(&self, id: DbId) -> StoreResult<Option<KillSwitch>> {
        let mut state = self.write()?;
        Ok(state.kill_switches.iter_mut().find(|s| s.id == id).map(|s| {
            s.is_active = false;
            s.clone()
        }))
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn find(&self, id: DbId) -> StoreResult<Option<Order>> {
        Ok(self.state().orders.get(&id).cloned())
    }

    async fn find_by_provider_ref(&self, reference: &str) -> StoreResult<Option<Order>> {
        Ok(self
            .state()
            .orders
            .values()
            .find(|o| {
                o.provider_session_id.as_deref() == Some(reference)
                    || o.provider_intent_id.as_deref() == Some(reference)
            })
            .cloned())
    }

    async fn transition(
        &self,
        id: DbId,
        from: OrderStatus,
        to: OrderStatus,
        release_stock: bool,
    ) -> StoreResult<bool> {
        let mut state = self.write()?;
        let Some(order) = state.orders.get_mut(&id) else {
            return Ok(false);
        };
        if order.status != from {
            return Ok(false);
        }
        order.status = to;
        order.updated_at = Utc::now();

        let release = release_stock && !order.stock_released;
        if release {
            order.stock_released = true;
        }
        let (listing_id, quantity) = (order.listing_id, order.quantity);
        if let (true, Some(listing_id)) = (release, listing_id) {
            if let Some(listing) = state.listings.get_mut(&listing_id) {
                listing.stock += quantity;
                if listing.status == ListingStatus::SoldOut && listing.stock > 0 {
                    listing.status = ListingStatus::Active;
                }
            }
        }
        Ok(true)
    }
}

#[async_trait]
impl WebhookInbox for MemoryStore {
    async fn enqueue(
        &self,
        provider: Provider,
        event_id: &str,
        event_type: &str,
        payload: &serde_json::Value,
    ) -> StoreResult<Option<DbId>> {
        let mut state = self.write()?;
        if state
            .inbox
            .iter()
            .any(|row| row.event.provider == provider && row.event.event_id == event_id)
        {
            return Ok(None);
        }
        let id = state.next_id();
        state.inbox.push(InboxRow {
            event: InboxEvent {
                id,
                provider,
                event_id: event_id.to_string(),
                event_type: event_type.to_string(),
                payload: payload.clone(),
                attempts: 0,
                received_at: Utc::now(),
            },
            outcome: None,
            last_error: None,
        });
        Ok(Some(id))
    }

    async fn find(&self, id: DbId) -> StoreResult<Option<InboxEvent>> {
        Ok(self
            .state()
            .inbox
            .iter()
            .find(|row| row.event.id == id)
            .map(|row| row.event.clone()))
    }

    async fn pending(&self, older_than: Timestamp, limit: i64) -> StoreResult<Vec<InboxEvent>> {
        let mut rows: Vec<InboxEvent> = self
            .state()
            .inbox
            .iter()
            .filter(|row| {
                row.outcome.is_none()
                    && row.event.received_at < older_than
                    && row.event.attempts < MAX_INBOX_ATTEMPTS
            })
            .map(|row| row.event.clone())
            .collect();
        rows.sort_by_key(|e| e.received_at);
        rows.truncate(limit.max(0) as usize);
        Ok(rows)
    }

    async fn mark_processed(&self, id: DbId, outcome: &str) -> StoreResult<()> {
        let mut state = self.write()?;
        if let Some(row) = state.inbox.iter_mut().find(|row| row.event.id == id) {
            row.outcome = Some(outcome.to_string());
        }
        Ok(())
    }

    async fn record_failure(&self, id: DbId, error: &str) -> StoreResult<()> {
        let mut state = self.write()?;
        if let Some(row) = state.inbox.iter_mut().find(|row| row.event.id == id) {
            row.event.attempts += 1;
            row.last_error = Some(error.to_string());
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

/// Ledger store with injectable latency and failure.
#[derive(Default)]
pub struct MemoryLedger {
    entries: Mutex<Vec<LedgerEntry>>,
    delay: Mutex<Duration>,
    failing: AtomicBool,
}

impl MemoryLedger {
    pub fn entries(&self) -> Vec<LedgerEntry> {
        lock(&self.entries).clone()
    }

    pub fn set_delay(&self, delay: Duration) {
        *lock(&self.delay) = delay;
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl LedgerStore for MemoryLedger {
    async fn insert_if_absent(
        &self,
        entry: &NewLedgerEntry,
        daily_cap: Xp,
        day: NaiveDate,
    ) -> StoreResult<LedgerInsert> {
        let delay = *lock(&self.delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("ledger offline".into()));
        }

        let mut entries = lock(&self.entries);
        if entries.iter().any(|e| e.dedupe_key == entry.dedupe_key) {
            return Ok(LedgerInsert::Duplicate);
        }
        let today: i64 = entries
            .iter()
            .filter(|e| e.user_id == entry.user_id && e.created_at.date_naive() == day)
            .map(|e| i64::from(e.amount))
            .sum();
        let stored = LedgerEntry {
            id: entries.len() as DbId + 1,
            user_id: entry.user_id,
            amount: apply_daily_cap(entry.amount, today, daily_cap),
            reason: entry.reason.clone(),
            dedupe_key: entry.dedupe_key.clone(),
            metadata: entry.metadata.clone(),
            created_at: Utc::now(),
        };
        entries.push(stored.clone());
        Ok(LedgerInsert::Inserted(stored))
    }

    async fn totals(&self, user_id: DbId, day: NaiveDate) -> StoreResult<XpTotals> {
        let entries = lock(&self.entries);
        let mine = entries.iter().filter(|e| e.user_id == user_id);
        let lifetime = mine.clone().map(|e| i64::from(e.amount)).sum();
        let today = mine
            .filter(|e| e.created_at.date_naive() == day)
            .map(|e| i64::from(e.amount))
            .sum();
        Ok(XpTotals { today, lifetime })
    }

    async fn recent(&self, user_id: DbId, limit: i64) -> StoreResult<Vec<LedgerEntry>> {
        Ok(lock(&self.entries)
            .iter()
            .rev()
            .filter(|e| e.user_id == user_id)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Scan events, notifications, payments
// ---------------------------------------------------------------------------

/// Sink that keeps every recorded scan event.
#[derive(Default)]
pub struct MemorySink {
    events: Mutex<Vec<ScanEvent>>,
}

impl MemorySink {
    pub fn events(&self) -> Vec<ScanEvent> {
        lock(&self.events).clone()
    }
}

impl ScanEventSink for MemorySink {
    fn record(&self, event: ScanEvent) {
        lock(&self.events).push(event);
    }
}

/// Scan event store whose next `n` inserts fail.
#[derive(Default)]
pub struct MemoryScanEvents {
    events: Mutex<Vec<ScanEvent>>,
    failures_left: AtomicUsize,
}

impl MemoryScanEvents {
    pub fn events(&self) -> Vec<ScanEvent> {
        lock(&self.events).clone()
    }

    pub fn fail_next(&self, n: usize) {
        self.failures_left.store(n, Ordering::SeqCst);
    }
}

#[async_trait]
impl ScanEventStore for MemoryScanEvents {
    async fn insert(&self, event: &ScanEvent) -> StoreResult<DbId> {
        let failed = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(StoreError::Unavailable("scan_events offline".into()));
        }
        let mut events = lock(&self.events);
        events.push(event.clone());
        Ok(events.len() as DbId)
    }
}

#[derive(Default)]
pub struct MemoryNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl MemoryNotifier {
    pub fn sent(&self) -> Vec<Notification> {
        lock(&self.sent).clone()
    }
}

impl Notifier for MemoryNotifier {
    fn notify(&self, notification: Notification) {
        lock(&self.sent).push(notification);
    }
}

/// Payment verifier answering from a fixed table of intents.
#[derive(Default)]
pub struct MemoryVerifier {
    intents: Mutex<HashMap<String, VerifiedIntent>>,
}

impl MemoryVerifier {
    /// Register a succeeded GBP intent for `amount_cents`.
    pub fn approve(&self, intent_id: &str, amount_cents: i64) {
        self.approve_in(intent_id, amount_cents, "gbp");
    }

    pub fn approve_in(&self, intent_id: &str, amount_cents: i64, currency: &str) {
        lock(&self.intents).insert(
            intent_id.to_string(),
            VerifiedIntent {
                id: intent_id.to_string(),
                succeeded: true,
                amount_cents,
                currency: currency.to_string(),
            },
        );
    }
}

#[async_trait]
impl PaymentVerifier for MemoryVerifier {
    async fn verify(&self, payment_intent_id: &str) -> StoreResult<Option<VerifiedIntent>> {
        Ok(lock(&self.intents).get(payment_intent_id).cloned())
    }
}
