//! Payment-to-ledger reconciliation.
//!
//! Provider webhooks are at-least-once and unordered. Every event is reduced
//! to a [`PaymentSignal`] and applied to its order through [`next_step`],
//! whose table never moves an order out of a terminal state. Status changes
//! go through the store's conditional transition; stock release and the
//! purchase XP credit ride on that same guard and on the ledger dedupe key.

use std::sync::Arc;

use serde_json::{json, Value};

use crate::error::StoreError;
use crate::ledger::{keys, reasons, LedgerError, XpLedger};
use crate::models::{InboxEvent, Notification, Order, Provider};
use crate::ports::{Notifier, OrderStore, WebhookInbox};
use crate::status::OrderStatus;
use crate::types::{DbId, Xp};

/// Conditional transitions lost to a concurrent writer before giving up.
const MAX_TRANSITION_ATTEMPTS: usize = 3;

/// Inbox rows that failed this many times are left for an operator.
pub const MAX_INBOX_ATTEMPTS: i32 = 10;

pub const PURCHASE_XP_MIN: Xp = 10;
pub const PURCHASE_XP_MAX: Xp = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentSignal {
    Confirmed,
    Failed,
    Expired,
    Cancelled,
    Refunded,
}

/// A provider event reduced to what reconciliation needs.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderEvent {
    pub provider: Provider,
    pub event_id: String,
    pub signal: PaymentSignal,
    /// Our order id, when the provider echoes it back in metadata.
    pub order_id: Option<DbId>,
    /// Provider session / payment intent ids to match orders by.
    pub provider_refs: Vec<String>,
}

/// What to do with an order given its current status and a new signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Move { to: OrderStatus, release_stock: bool, credit_xp: bool },
    /// Already in the state the signal asks for. `credit_xp` re-ensures the
    /// purchase credit in case an earlier attempt failed after the move.
    AlreadyThere { credit_xp: bool },
    /// The signal is older than the order's state; drop it.
    Stale,
    /// The signal would regress a terminal state.
    Rejected,
}

/// Reconciliation state table.
///
/// ```text
/// created --confirmed--> paid --refunded--> refunded
///    |                                        ^
///    +--failed|expired|cancelled--> cancelled |
///    +--refunded------------------------------+
/// ```
pub fn next_step(current: OrderStatus, signal: PaymentSignal) -> Step {
    use OrderStatus::*;
    use PaymentSignal as S;
    match (current, signal) {
        (Created, S::Confirmed) => Step::Move { to: Paid, release_stock: false, credit_xp: true },
        (Created, S::Failed | S::Expired | S::Cancelled) => {
            Step::Move { to: Cancelled, release_stock: true, credit_xp: false }
        }
        // Refund overtook the confirmation; land where ordered delivery would.
        (Created, S::Refunded) => Step::Move { to: Refunded, release_stock: true, credit_xp: false },
        (Paid, S::Confirmed) => Step::AlreadyThere { credit_xp: true },
        (Paid, S::Refunded) => Step::Move { to: Refunded, release_stock: true, credit_xp: false },
        (Paid, S::Failed | S::Expired | S::Cancelled) => Step::Stale,
        (Refunded | Cancelled, S::Confirmed) => Step::Rejected,
        (Refunded, S::Refunded) => Step::AlreadyThere { credit_xp: false },
        (Cancelled, S::Failed | S::Expired | S::Cancelled) => Step::AlreadyThere { credit_xp: false },
        (Refunded, _) | (Cancelled, S::Refunded) => Step::Stale,
    }
}

/// `clamp(total_cents / 100, 10, 500)`.
pub fn purchase_xp(total_cents: i64) -> Xp {
    (total_cents / 100).clamp(i64::from(PURCHASE_XP_MIN), i64::from(PURCHASE_XP_MAX)) as Xp
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReconcileOutcome {
    Applied { order_id: DbId, from: OrderStatus, to: OrderStatus },
    NoOp { order_id: DbId, status: OrderStatus },
    Rejected { order_id: DbId, status: OrderStatus },
    OrderNotFound,
    Ignored,
}

impl ReconcileOutcome {
    /// Short label stored on the processed inbox row.
    pub fn label(&self) -> &'static str {
        match self {
            ReconcileOutcome::Applied { .. } => "applied",
            ReconcileOutcome::NoOp { .. } => "noop",
            ReconcileOutcome::Rejected { .. } => "rejected",
            ReconcileOutcome::OrderNotFound => "order_not_found",
            ReconcileOutcome::Ignored => "ignored",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error("Malformed provider payload: {0}")]
    Malformed(String),

    #[error("Order {0} kept changing under reconciliation")]
    Contended(DbId),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

// ---------------------------------------------------------------------------
// Provider payload parsing
// ---------------------------------------------------------------------------

/// Reduce a stored provider payload to a [`ProviderEvent`]. `Ok(None)` for
/// event types reconciliation does not act on.
pub fn parse_event(
    provider: Provider,
    event_id: &str,
    event_type: &str,
    payload: &Value,
) -> Result<Option<ProviderEvent>, ReconcileError> {
    match provider {
        Provider::Stripe => parse_stripe(event_id, event_type, payload),
        Provider::Shopify => parse_shopify(event_id, event_type, payload),
    }
}

fn parse_stripe(
    event_id: &str,
    event_type: &str,
    payload: &Value,
) -> Result<Option<ProviderEvent>, ReconcileError> {
    let object = payload
        .pointer("/data/object")
        .ok_or_else(|| ReconcileError::Malformed("stripe event has no data.object".into()))?;
    let id = str_field(object, "id");

    let (signal, refs) = match event_type {
        "checkout.session.completed" => {
            // Delayed payment methods complete the session before the money arrives.
            if object.get("payment_status").and_then(Value::as_str) == Some("unpaid") {
                return Ok(None);
            }
            (PaymentSignal::Confirmed, [id, str_field(object, "payment_intent")])
        }
        "checkout.session.async_payment_succeeded" => {
            (PaymentSignal::Confirmed, [id, str_field(object, "payment_intent")])
        }
        "checkout.session.async_payment_failed" => {
            (PaymentSignal::Failed, [id, str_field(object, "payment_intent")])
        }
        "checkout.session.expired" => (PaymentSignal::Expired, [id, None]),
        "payment_intent.succeeded" => (PaymentSignal::Confirmed, [id, None]),
        "payment_intent.payment_failed" => (PaymentSignal::Failed, [id, None]),
        "payment_intent.canceled" => (PaymentSignal::Cancelled, [id, None]),
        "charge.refunded" => (PaymentSignal::Refunded, [str_field(object, "payment_intent"), None]),
        _ => return Ok(None),
    };

    let order_id = object.pointer("/metadata/order_id").and_then(id_value);
    let provider_refs: Vec<String> = refs.into_iter().flatten().collect();
    if order_id.is_none() && provider_refs.is_empty() {
        return Err(ReconcileError::Malformed(format!(
            "stripe {event_type} carries no order reference"
        )));
    }

    Ok(Some(ProviderEvent {
        provider: Provider::Stripe,
        event_id: event_id.to_string(),
        signal,
        order_id,
        provider_refs,
    }))
}

fn parse_shopify(
    event_id: &str,
    topic: &str,
    payload: &Value,
) -> Result<Option<ProviderEvent>, ReconcileError> {
    let (signal, shopify_order) = match topic {
        "orders/paid" => (PaymentSignal::Confirmed, payload.get("id")),
        "orders/cancelled" => (PaymentSignal::Cancelled, payload.get("id")),
        "refunds/create" => (PaymentSignal::Refunded, payload.get("order_id")),
        _ => return Ok(None),
    };

    let order_id = payload
        .get("note_attributes")
        .and_then(Value::as_array)
        .and_then(|attrs| {
            attrs
                .iter()
                .find(|a| a.get("name").and_then(Value::as_str) == Some("order_id"))
        })
        .and_then(|a| a.get("value"))
        .and_then(id_value);
    let provider_refs: Vec<String> = shopify_order
        .and_then(|v| id_value(v).map(|n| n.to_string()).or_else(|| v.as_str().map(String::from)))
        .into_iter()
        .collect();

    if order_id.is_none() && provider_refs.is_empty() {
        return Err(ReconcileError::Malformed(format!("shopify {topic} carries no order reference")));
    }

    Ok(Some(ProviderEvent {
        provider: Provider::Shopify,
        event_id: event_id.to_string(),
        signal,
        order_id,
        provider_refs,
    }))
}

fn str_field(object: &Value, key: &str) -> Option<String> {
    object
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

/// Ids arrive as JSON numbers or as numeric strings.
fn id_value(v: &Value) -> Option<DbId> {
    v.as_i64().or_else(|| v.as_str().and_then(|s| s.trim().parse().ok()))
}

// ---------------------------------------------------------------------------
// Reconciler
// ---------------------------------------------------------------------------

pub struct Reconciler {
    orders: Arc<dyn OrderStore>,
    inbox: Arc<dyn WebhookInbox>,
    ledger: Arc<XpLedger>,
    notifier: Arc<dyn Notifier>,
}

impl Reconciler {
    pub fn new(
        orders: Arc<dyn OrderStore>,
        inbox: Arc<dyn WebhookInbox>,
        ledger: Arc<XpLedger>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self { orders, inbox, ledger, notifier }
    }

    pub fn inbox(&self) -> &Arc<dyn WebhookInbox> {
        &self.inbox
    }

    /// Apply one provider event to its order.
    ///
    /// Errors are transient (datastore, ledger) and mean the event should be
    /// retried; every domain outcome is an `Ok`.
    pub async fn apply(&self, event: &ProviderEvent) -> Result<ReconcileOutcome, ReconcileError> {
        let Some(mut order) = self.locate(event).await? else {
            tracing::warn!(
                provider = event.provider.as_str(),
                event_id = %event.event_id,
                order_id = ?event.order_id,
                refs = ?event.provider_refs,
                "No order matches provider event"
            );
            return Ok(ReconcileOutcome::OrderNotFound);
        };

        for _ in 0..MAX_TRANSITION_ATTEMPTS {
            match next_step(order.status, event.signal) {
                Step::Move { to, release_stock, credit_xp } => {
                    let from = order.status;
                    if self.orders.transition(order.id, from, to, release_stock).await? {
                        tracing::info!(
                            order_id = order.id,
                            from = %from,
                            to = %to,
                            provider = event.provider.as_str(),
                            event_id = %event.event_id,
                            "Order transitioned"
                        );
                        if credit_xp {
                            self.credit_purchase_xp(&order, event).await?;
                        }
                        self.notify_transition(&order, to);
                        return Ok(ReconcileOutcome::Applied { order_id: order.id, from, to });
                    }
                    // Another delivery moved the order first; re-read and re-decide.
                    order = self
                        .orders
                        .find(order.id)
                        .await?
                        .ok_or_else(|| StoreError::Integrity(format!("order {} vanished", order.id)))?;
                }
                Step::AlreadyThere { credit_xp } => {
                    if credit_xp {
                        self.credit_purchase_xp(&order, event).await?;
                    }
                    tracing::debug!(order_id = order.id, status = %order.status, "Redelivered event is a no-op");
                    return Ok(ReconcileOutcome::NoOp { order_id: order.id, status: order.status });
                }
                Step::Stale => {
                    tracing::debug!(
                        order_id = order.id,
                        status = %order.status,
                        signal = ?event.signal,
                        "Ignoring stale provider event"
                    );
                    return Ok(ReconcileOutcome::NoOp { order_id: order.id, status: order.status });
                }
                Step::Rejected => {
                    tracing::warn!(
                        order_id = order.id,
                        status = %order.status,
                        event_id = %event.event_id,
                        "Payment confirmation for a closed order; not reopening"
                    );
                    self.notifier.notify(Notification::new("ops.alert").with_payload(json!({
                        "alert": "payment_after_terminal",
                        "detail": {
                            "order_id": order.id,
                            "status": order.status.as_str(),
                            "provider": event.provider.as_str(),
                            "event_id": event.event_id,
                        },
                    })));
                    return Ok(ReconcileOutcome::Rejected { order_id: order.id, status: order.status });
                }
            }
        }
        Err(ReconcileError::Contended(order.id))
    }

    /// Parse and apply a stored inbox row, then record the result on it.
    pub async fn process_inbox_event(&self, event: &InboxEvent) -> Result<ReconcileOutcome, ReconcileError> {
        let parsed = match parse_event(event.provider, &event.event_id, &event.event_type, &event.payload) {
            Ok(parsed) => parsed,
            // Redelivering a malformed payload cannot fix it.
            Err(e) => {
                tracing::warn!(inbox_id = event.id, error = %e, "Dropping malformed provider event");
                self.inbox.mark_processed(event.id, "malformed").await?;
                return Err(e);
            }
        };

        let result = match parsed {
            Some(provider_event) => self.apply(&provider_event).await,
            None => Ok(ReconcileOutcome::Ignored),
        };

        match &result {
            // A confirmation can beat the purchase that creates its order;
            // leave the row for the poller until the attempts run out.
            Ok(ReconcileOutcome::OrderNotFound) if event.attempts + 1 < MAX_INBOX_ATTEMPTS => {
                tracing::info!(
                    inbox_id = event.id,
                    provider = event.provider.as_str(),
                    event_id = %event.event_id,
                    attempt = event.attempts + 1,
                    "No order for provider event yet; will retry"
                );
                self.inbox.record_failure(event.id, "no matching order yet").await?;
            }
            Ok(outcome) => self.inbox.mark_processed(event.id, outcome.label()).await?,
            Err(e) => {
                tracing::error!(
                    inbox_id = event.id,
                    provider = event.provider.as_str(),
                    event_id = %event.event_id,
                    error = %e,
                    "Provider event processing failed; will retry"
                );
                self.inbox.record_failure(event.id, &e.to_string()).await?;
            }
        }
        result
    }

    async fn locate(&self, event: &ProviderEvent) -> Result<Option<Order>, StoreError> {
        if let Some(id) = event.order_id {
            if let Some(order) = self.orders.find(id).await? {
                return Ok(Some(order));
            }
        }
        for reference in &event.provider_refs {
            if let Some(order) = self.orders.find_by_provider_ref(reference).await? {
                return Ok(Some(order));
            }
        }
        Ok(None)
    }

    async fn credit_purchase_xp(&self, order: &Order, event: &ProviderEvent) -> Result<(), LedgerError> {
        let amount = purchase_xp(order.total_cents);
        let award = self
            .ledger
            .award(
                order.buyer_id,
                amount,
                &keys::order_purchase(order.id),
                reasons::PURCHASE,
                json!({
                    "order_id": order.id,
                    "provider": event.provider.as_str(),
                    "event_id": event.event_id,
                }),
            )
            .await?;
        if award.awarded {
            tracing::info!(order_id = order.id, user_id = order.buyer_id, amount = award.amount, "Purchase XP credited");
        }
        Ok(())
    }

    fn notify_transition(&self, order: &Order, to: OrderStatus) {
        let kind = match to {
            OrderStatus::Paid => "order.paid",
            OrderStatus::Refunded => "order.refunded",
            OrderStatus::Cancelled => "order.cancelled",
            OrderStatus::Created => return,
        };
        self.notifier.notify(
            Notification::new(kind)
                .to(order.buyer_id)
                .about("order", order.id)
                .with_payload(json!({
                    "total_cents": order.total_cents,
                    "currency": order.currency,
                })),
        );
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use chrono::Utc;

    use super::*;
    use crate::ledger::DEFAULT_WRITE_TIMEOUT;
    use crate::memory::{MemoryLedger, MemoryNotifier, MemoryStore};
    use crate::models::{Listing, Reservation};
    use crate::ports::ListingStore;
    use crate::status::ListingStatus;

    struct Harness {
        reconciler: Reconciler,
        store: Arc<MemoryStore>,
        ledger: Arc<MemoryLedger>,
        notifier: Arc<MemoryNotifier>,
    }

    fn harness() -> Harness {
        let store = Arc::new(MemoryStore::default());
        let ledger = Arc::new(MemoryLedger::default());
        let notifier = Arc::new(MemoryNotifier::default());
        let xp = Arc::new(XpLedger::new(ledger.clone(), 500, DEFAULT_WRITE_TIMEOUT));
        let reconciler = Reconciler::new(store.clone(), store.clone(), xp, notifier.clone());
        store.add_listing(Listing {
            id: 30,
            vendor_id: 3,
            title: "Poster".into(),
            price_cents: 2500,
            currency: "gbp".into(),
            stock: 4,
            status: ListingStatus::Active,
        });
        store.add_order(Order {
            id: 1,
            buyer_id: 42,
            seller_id: Some(3),
            listing_id: Some(30),
            beacon_id: None,
            quantity: 1,
            status: OrderStatus::Created,
            total_cents: 2500,
            currency: "gbp".into(),
            provider_session_id: Some("cs_1".into()),
            provider_intent_id: Some("pi_1".into()),
            stock_released: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        });
        Harness { reconciler, store, ledger, notifier }
    }

    fn event(signal: PaymentSignal, id: &str) -> ProviderEvent {
        ProviderEvent {
            provider: Provider::Stripe,
            event_id: id.into(),
            signal,
            order_id: None,
            provider_refs: vec!["cs_1".into()],
        }
    }

    #[test]
    fn terminal_states_never_regress() {
        use PaymentSignal::*;
        for terminal in [OrderStatus::Refunded, OrderStatus::Cancelled] {
            for signal in [Confirmed, Failed, Expired, Cancelled, Refunded] {
                assert!(
                    !matches!(next_step(terminal, signal), Step::Move { .. }),
                    "{terminal:?} moved on {signal:?}"
                );
            }
        }
        assert_eq!(next_step(OrderStatus::Cancelled, Confirmed), Step::Rejected);
    }

    #[test]
    fn purchase_xp_is_clamped() {
        assert_eq!(purchase_xp(0), 10);
        assert_eq!(purchase_xp(2500), 25);
        assert_eq!(purchase_xp(1_000_000), 500);
    }

    #[tokio::test]
    async fn confirmation_redelivery_credits_once() {
        let h = harness();
        let first = h.reconciler.apply(&event(PaymentSignal::Confirmed, "evt_1")).await.unwrap();
        assert_eq!(
            first,
            ReconcileOutcome::Applied { order_id: 1, from: OrderStatus::Created, to: OrderStatus::Paid }
        );
        let again = h.reconciler.apply(&event(PaymentSignal::Confirmed, "evt_1")).await.unwrap();
        assert_matches!(again, ReconcileOutcome::NoOp { status: OrderStatus::Paid, .. });

        let entries = h.ledger.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].dedupe_key, "order:1:purchase_xp");
        assert_eq!(entries[0].amount, 25);
        assert!(h.notifier.sent().iter().any(|n| n.kind == "order.paid"));
    }

    #[tokio::test]
    async fn refund_then_late_confirmation_stays_refunded() {
        let h = harness();
        h.reconciler.apply(&event(PaymentSignal::Confirmed, "evt_1")).await.unwrap();
        h.reconciler.apply(&event(PaymentSignal::Refunded, "evt_2")).await.unwrap();
        h.reconciler.apply(&event(PaymentSignal::Refunded, "evt_2")).await.unwrap();
        let late = h.reconciler.apply(&event(PaymentSignal::Confirmed, "evt_1")).await.unwrap();

        assert_matches!(late, ReconcileOutcome::Rejected { status: OrderStatus::Refunded, .. });
        let order = h.store.order(1).unwrap();
        assert_eq!(order.status, OrderStatus::Refunded);
        assert!(order.stock_released);
        assert_eq!(h.store.listing(30).unwrap().stock, 5);
    }

    #[tokio::test]
    async fn out_of_order_refund_matches_ordered_outcome() {
        let h = harness();
        h.reconciler.apply(&event(PaymentSignal::Refunded, "evt_2")).await.unwrap();
        h.reconciler.apply(&event(PaymentSignal::Confirmed, "evt_1")).await.unwrap();

        assert_eq!(h.store.order(1).unwrap().status, OrderStatus::Refunded);
        assert_eq!(h.store.listing(30).unwrap().stock, 5);
        assert!(h.ledger.entries().is_empty());
    }

    #[tokio::test]
    async fn cancellations_release_stock_once() {
        let h = harness();
        for id in ["evt_a", "evt_b", "evt_a"] {
            h.reconciler.apply(&event(PaymentSignal::Expired, id)).await.unwrap();
        }
        h.reconciler.apply(&event(PaymentSignal::Failed, "evt_c")).await.unwrap();
        assert_eq!(h.store.order(1).unwrap().status, OrderStatus::Cancelled);
        assert_eq!(h.store.listing(30).unwrap().stock, 5);
    }

    #[tokio::test]
    async fn ledger_failure_is_retried_on_redelivery() {
        let h = harness();
        h.ledger.set_failing(true);
        let err = h.reconciler.apply(&event(PaymentSignal::Confirmed, "evt_1")).await.unwrap_err();
        assert_matches!(err, ReconcileError::Ledger(_));
        assert_eq!(h.store.order(1).unwrap().status, OrderStatus::Paid);

        h.ledger.set_failing(false);
        h.reconciler.apply(&event(PaymentSignal::Confirmed, "evt_1")).await.unwrap();
        assert_eq!(h.ledger.entries().len(), 1);
    }

    #[tokio::test]
    async fn unknown_order_is_reported() {
        let h = harness();
        let mut e = event(PaymentSignal::Confirmed, "evt_x");
        e.provider_refs = vec!["cs_missing".into()];
        let outcome = h.reconciler.apply(&e).await.unwrap();
        assert_eq!(outcome, ReconcileOutcome::OrderNotFound);
    }

    #[tokio::test]
    async fn inbox_rows_are_marked() {
        let h = harness();
        let payload = json!({
            "id": "evt_1",
            "type": "checkout.session.completed",
            "data": { "object": { "id": "cs_1", "payment_status": "paid", "metadata": { "order_id": "1" } } }
        });
        let inbox_id = h
            .store
            .enqueue(Provider::Stripe, "evt_1", "checkout.session.completed", &payload)
            .await
            .unwrap()
            .unwrap();
        let row = WebhookInbox::find(h.store.as_ref(), inbox_id).await.unwrap().unwrap();
        let outcome = h.reconciler.process_inbox_event(&row).await.unwrap();
        assert_matches!(outcome, ReconcileOutcome::Applied { .. });
        assert_eq!(h.store.inbox_outcome(inbox_id).as_deref(), Some("applied"));

        let dup = h
            .store
            .enqueue(Provider::Stripe, "evt_1", "checkout.session.completed", &payload)
            .await
            .unwrap();
        assert!(dup.is_none());
    }

    #[tokio::test]
    async fn failed_inbox_rows_keep_the_error() {
        let h = harness();
        h.ledger.set_failing(true);
        let payload = json!({
            "id": "evt_9",
            "type": "payment_intent.succeeded",
            "data": { "object": { "id": "pi_1", "metadata": { "order_id": "1" } } }
        });
        let inbox_id = h
            .store
            .enqueue(Provider::Stripe, "evt_9", "payment_intent.succeeded", &payload)
            .await
            .unwrap()
            .unwrap();
        let row = WebhookInbox::find(h.store.as_ref(), inbox_id).await.unwrap().unwrap();

        assert!(h.reconciler.process_inbox_event(&row).await.is_err());
        assert_eq!(h.store.inbox_outcome(inbox_id), None);
        assert!(h.store.inbox_error(inbox_id).is_some());
    }

    #[tokio::test]
    async fn confirmation_before_order_is_retried() {
        let h = harness();
        let payload = json!({
            "id": "evt_early",
            "type": "payment_intent.succeeded",
            "data": { "object": { "id": "pi_new", "amount": 2500 } }
        });
        let inbox_id = h
            .store
            .enqueue(Provider::Stripe, "evt_early", "payment_intent.succeeded", &payload)
            .await
            .unwrap()
            .unwrap();
        let row = WebhookInbox::find(h.store.as_ref(), inbox_id).await.unwrap().unwrap();
        let first = h.reconciler.process_inbox_event(&row).await.unwrap();
        assert_eq!(first, ReconcileOutcome::OrderNotFound);
        assert_eq!(h.store.inbox_outcome(inbox_id), None);

        let reserved = ListingStore::reserve(h.store.as_ref(), 30, 42, None, "pi_new").await.unwrap();
        let Reservation::Reserved(order) = reserved else {
            panic!("expected a reservation, got {reserved:?}");
        };

        let later = Utc::now() + chrono::Duration::hours(1);
        let pending = h.store.pending(later, 10).await.unwrap();
        assert_eq!(pending.len(), 1);
        let outcome = h.reconciler.process_inbox_event(&pending[0]).await.unwrap();
        assert_matches!(outcome, ReconcileOutcome::Applied { to: OrderStatus::Paid, .. });
        assert_eq!(h.store.order(order.id).unwrap().status, OrderStatus::Paid);
        assert_eq!(h.store.inbox_outcome(inbox_id).as_deref(), Some("applied"));
        assert_eq!(h.ledger.entries().len(), 1);
    }

    #[tokio::test]
    async fn unmatched_event_gives_up_after_max_attempts() {
        let h = harness();
        let payload = json!({
            "id": "evt_orphan",
            "type": "payment_intent.succeeded",
            "data": { "object": { "id": "pi_orphan" } }
        });
        let inbox_id = h
            .store
            .enqueue(Provider::Stripe, "evt_orphan", "payment_intent.succeeded", &payload)
            .await
            .unwrap()
            .unwrap();
        let mut row = WebhookInbox::find(h.store.as_ref(), inbox_id).await.unwrap().unwrap();
        row.attempts = MAX_INBOX_ATTEMPTS - 1;
        h.reconciler.process_inbox_event(&row).await.unwrap();
        assert_eq!(h.store.inbox_outcome(inbox_id).as_deref(), Some("order_not_found"));
    }

    #[test]
    fn stripe_payloads() {
        let completed = json!({
            "id": "evt_1",
            "type": "checkout.session.completed",
            "data": { "object": { "id": "cs_1", "payment_intent": "pi_1", "payment_status": "paid", "metadata": { "order_id": 9 } } }
        });
        let parsed = parse_event(Provider::Stripe, "evt_1", "checkout.session.completed", &completed)
            .unwrap()
            .unwrap();
        assert_eq!(parsed.signal, PaymentSignal::Confirmed);
        assert_eq!(parsed.order_id, Some(9));
        assert_eq!(parsed.provider_refs, vec!["cs_1".to_string(), "pi_1".to_string()]);

        let unpaid = json!({ "data": { "object": { "id": "cs_2", "payment_status": "unpaid" } } });
        assert!(parse_event(Provider::Stripe, "e", "checkout.session.completed", &unpaid).unwrap().is_none());

        let refund = json!({ "data": { "object": { "id": "ch_1", "payment_intent": "pi_7" } } });
        let parsed = parse_event(Provider::Stripe, "e", "charge.refunded", &refund).unwrap().unwrap();
        assert_eq!(parsed.signal, PaymentSignal::Refunded);
        assert_eq!(parsed.provider_refs, vec!["pi_7".to_string()]);

        assert!(parse_event(Provider::Stripe, "e", "customer.created", &refund).unwrap().is_none());
        assert_matches!(
            parse_event(Provider::Stripe, "e", "payment_intent.succeeded", &json!({})),
            Err(ReconcileError::Malformed(_))
        );
    }

    #[test]
    fn shopify_payloads() {
        let paid = json!({
            "id": 820982911946154508i64,
            "note_attributes": [{ "name": "order_id", "value": "12" }]
        });
        let parsed = parse_event(Provider::Shopify, "wh_1", "orders/paid", &paid).unwrap().unwrap();
        assert_eq!(parsed.signal, PaymentSignal::Confirmed);
        assert_eq!(parsed.order_id, Some(12));
        assert_eq!(parsed.provider_refs, vec!["820982911946154508".to_string()]);

        let refund = json!({ "id": 5, "order_id": 820982911946154508i64 });
        let parsed = parse_event(Provider::Shopify, "wh_2", "refunds/create", &refund).unwrap().unwrap();
        assert_eq!(parsed.signal, PaymentSignal::Refunded);
        assert_eq!(parsed.order_id, None);

        assert!(parse_event(Provider::Shopify, "wh_3", "products/update", &paid).unwrap().is_none());
    }
}
