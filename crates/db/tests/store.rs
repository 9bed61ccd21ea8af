//! Integration tests for [`PgStore`] against a real database.
//!
//! Each test gets a fresh database from `DATABASE_URL` with the crate's
//! migrations applied. Covers the conditional writes the scan engine and
//! reconciler rely on: ledger dedupe and caps, scan limits and quotas,
//! ticket and resale transitions, stock and payment claims, and the
//! webhook inbox lease.

use std::sync::Arc;

use beacon_core::kill_switch::{KillSwitchScope, NewKillSwitch};
use beacon_core::models::{LedgerInsert, NewLedgerEntry, Provider, ResaleOutcome, Reservation};
use beacon_core::ports::{
    BeaconStore, ConnectionStore, KillSwitchStore, LedgerStore, ListingStore, OrderStore,
    ResaleStore, RoomStore, TicketStore, WebhookInbox,
};
use beacon_core::status::{BeaconStatus, ListingStatus, OrderStatus, TicketStatus};
use beacon_core::types::DbId;
use beacon_db::repositories::TicketRepo;
use beacon_db::PgStore;
use chrono::{Duration, Utc};
use serde_json::json;
use sqlx::PgPool;

async fn insert_beacon(pool: &PgPool, code: &str, scan_limit: Option<i64>) -> DbId {
    sqlx::query_scalar(
        "INSERT INTO beacons (code, beacon_type, status, owner_id, scan_limit) \
         VALUES ($1, 'checkin', 'active', 900, $2) RETURNING id",
    )
    .bind(code)
    .bind(scan_limit)
    .fetch_one(pool)
    .await
    .unwrap()
}

async fn insert_listing(pool: &PgPool, stock: i32) -> DbId {
    sqlx::query_scalar(
        "INSERT INTO listings (vendor_id, title, price_cents, stock, status) \
         VALUES (7, 'Tote bag', 1500, $1, 'active') RETURNING id",
    )
    .bind(stock)
    .fetch_one(pool)
    .await
    .unwrap()
}

fn entry(user_id: DbId, amount: i32, key: &str) -> NewLedgerEntry {
    NewLedgerEntry {
        user_id,
        amount,
        reason: "checkin".into(),
        dedupe_key: key.into(),
        metadata: json!({}),
    }
}

#[sqlx::test(migrations = "./migrations")]
async fn test_health_check(pool: PgPool) {
    beacon_db::health_check(&pool).await.unwrap();
}

#[sqlx::test(migrations = "./migrations")]
async fn test_ledger_dedupe_key_is_unique(pool: PgPool) {
    let store = PgStore::new(pool);
    let today = Utc::now().date_naive();

    let first = store.insert_if_absent(&entry(1, 10, "k:1"), 500, today).await.unwrap();
    assert!(matches!(first, LedgerInsert::Inserted(ref e) if e.amount == 10));

    let second = store.insert_if_absent(&entry(1, 10, "k:1"), 500, today).await.unwrap();
    assert_eq!(second, LedgerInsert::Duplicate);

    let totals = store.totals(1, today).await.unwrap();
    assert_eq!((totals.today, totals.lifetime), (10, 10));
}

#[sqlx::test(migrations = "./migrations")]
async fn test_ledger_truncates_at_daily_cap(pool: PgPool) {
    let store = PgStore::new(pool);
    let today = Utc::now().date_naive();

    store.insert_if_absent(&entry(1, 90, "a"), 100, today).await.unwrap();
    let capped = store.insert_if_absent(&entry(1, 30, "b"), 100, today).await.unwrap();
    assert!(matches!(capped, LedgerInsert::Inserted(ref e) if e.amount == 10));
    let zero = store.insert_if_absent(&entry(1, 30, "c"), 100, today).await.unwrap();
    assert!(matches!(zero, LedgerInsert::Inserted(ref e) if e.amount == 0));

    assert_eq!(store.totals(1, today).await.unwrap().today, 100);
}

#[sqlx::test(migrations = "./migrations")]
async fn test_concurrent_awards_credit_once(pool: PgPool) {
    let store = Arc::new(PgStore::new(pool));
    let today = Utc::now().date_naive();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            store.insert_if_absent(&entry(5, 20, "race"), 500, today).await.unwrap()
        }));
    }
    let mut inserted = 0;
    for handle in handles {
        if matches!(handle.await.unwrap(), LedgerInsert::Inserted(_)) {
            inserted += 1;
        }
    }
    assert_eq!(inserted, 1);
    assert_eq!(store.totals(5, today).await.unwrap().lifetime, 20);
}

#[sqlx::test(migrations = "./migrations")]
async fn test_scan_limit_expires_beacon(pool: PgPool) {
    let id = insert_beacon(&pool, "LIMIT2", Some(2)).await;
    let store = PgStore::new(pool);

    assert_eq!(store.increment_scan_count(id).await.unwrap(), Some(1));
    assert_eq!(store.increment_scan_count(id).await.unwrap(), Some(2));
    assert_eq!(store.increment_scan_count(id).await.unwrap(), None);

    let beacon = store.find_by_id(id).await.unwrap().unwrap();
    assert_eq!(beacon.status, BeaconStatus::Expired);
    assert_eq!(beacon.scan_count, 2);
}

#[sqlx::test(migrations = "./migrations")]
async fn test_user_quota_is_enforced(pool: PgPool) {
    let id = insert_beacon(&pool, "QUOTA", None).await;
    let store = PgStore::new(pool);
    let today = Utc::now().date_naive();

    assert!(store.consume_user_quota(id, 3, today, 2).await.unwrap());
    assert!(store.consume_user_quota(id, 3, today, 2).await.unwrap());
    assert!(!store.consume_user_quota(id, 3, today, 2).await.unwrap());
    assert!(store.consume_user_quota(id, 4, today, 2).await.unwrap());

    store.release_user_quota(id, 3, today).await.unwrap();
    assert!(store.consume_user_quota(id, 3, today, 2).await.unwrap());
    assert!(!store.consume_user_quota(id, 3, today, 2).await.unwrap());
}

#[sqlx::test(migrations = "./migrations")]
async fn test_quota_release_never_goes_negative(pool: PgPool) {
    let id = insert_beacon(&pool, "QUOTA0", None).await;
    let store = PgStore::new(pool);
    let today = Utc::now().date_naive();

    // Nothing taken yet: both are no-ops.
    store.release_user_quota(id, 3, today).await.unwrap();
    assert!(store.consume_user_quota(id, 3, today, 1).await.unwrap());
    store.release_user_quota(id, 3, today).await.unwrap();
    store.release_user_quota(id, 3, today).await.unwrap();

    assert!(store.consume_user_quota(id, 3, today, 1).await.unwrap());
    assert!(!store.consume_user_quota(id, 3, today, 1).await.unwrap());
}

#[sqlx::test(migrations = "./migrations")]
async fn test_expire_due_skips_drafts(pool: PgPool) {
    let live = insert_beacon(&pool, "LIVE", None).await;
    let draft: DbId = sqlx::query_scalar(
        "INSERT INTO beacons (code, beacon_type, status, owner_id, active_until) \
         VALUES ('DRAFT', 'checkin', 'draft', 900, NOW() - INTERVAL '1 hour') RETURNING id",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    sqlx::query("UPDATE beacons SET active_until = NOW() - INTERVAL '1 hour' WHERE id = $1")
        .bind(live)
        .execute(&pool)
        .await
        .unwrap();

    let store = PgStore::new(pool);
    assert_eq!(store.expire_due(Utc::now()).await.unwrap(), 1);
    assert_eq!(store.find_by_id(live).await.unwrap().unwrap().status, BeaconStatus::Expired);
    assert_eq!(store.find_by_id(draft).await.unwrap().unwrap().status, BeaconStatus::Draft);
}

#[sqlx::test(migrations = "./migrations")]
async fn test_ticket_scans_once_with_history(pool: PgPool) {
    let beacon = insert_beacon(&pool, "GATE", None).await;
    let ticket: DbId = sqlx::query_scalar(
        "INSERT INTO tickets (event_id, owner_id) VALUES (77, 42) RETURNING id",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    let store = PgStore::new(pool.clone());

    assert!(store.mark_scanned(ticket, Some(5), beacon, Utc::now()).await.unwrap());
    assert!(!store.mark_scanned(ticket, Some(5), beacon, Utc::now()).await.unwrap());

    let found = TicketStore::find(&store, ticket).await.unwrap().unwrap();
    assert_eq!(found.status, TicketStatus::Scanned);
    assert_eq!(TicketRepo::history(&pool, ticket).await.unwrap(), vec!["scanned"]);
}

#[sqlx::test(migrations = "./migrations")]
async fn test_resale_transfers_ticket(pool: PgPool) {
    let ticket: DbId = sqlx::query_scalar(
        "INSERT INTO tickets (event_id, owner_id) VALUES (77, 42) RETURNING id",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    let resale: DbId = sqlx::query_scalar(
        "INSERT INTO ticket_resales (ticket_id, seller_id, price_cents) VALUES ($1, 42, 3000) \
         RETURNING id",
    )
    .bind(ticket)
    .fetch_one(&pool)
    .await
    .unwrap();
    let store = PgStore::new(pool);

    let ResaleOutcome::Completed(done) =
        store.complete(resale, 8, "pi_r", Utc::now()).await.unwrap()
    else {
        panic!("expected a completed resale");
    };
    assert_eq!(done.seller_id, 42);
    assert_eq!(done.old_ticket_id, ticket);

    let old = TicketStore::find(&store, ticket).await.unwrap().unwrap();
    assert_eq!(old.status, TicketStatus::Transferred);
    let new = TicketStore::find(&store, done.new_ticket_id).await.unwrap().unwrap();
    assert_eq!((new.owner_id, new.status), (8, TicketStatus::Valid));

    assert_eq!(
        store.complete(resale, 9, "pi_s", Utc::now()).await.unwrap(),
        ResaleOutcome::NotActive
    );
}

#[sqlx::test(migrations = "./migrations")]
async fn test_reserve_and_release_stock(pool: PgPool) {
    let listing = insert_listing(&pool, 1).await;
    let store = PgStore::new(pool);

    let Reservation::Reserved(order) = store.reserve(listing, 42, None, "pi_1").await.unwrap()
    else {
        panic!("expected a reservation");
    };
    let again = store.reserve(listing, 42, None, "pi_1").await.unwrap();
    assert_eq!(again, Reservation::Reserved(order.clone()));
    assert_eq!(store.reserve(listing, 43, None, "pi_2").await.unwrap(), Reservation::SoldOut);

    let sold_out = ListingStore::find(&store, listing).await.unwrap().unwrap();
    assert_eq!((sold_out.stock, sold_out.status), (0, ListingStatus::SoldOut));

    assert!(store
        .transition(order.id, OrderStatus::Created, OrderStatus::Cancelled, true)
        .await
        .unwrap());
    assert!(!store
        .transition(order.id, OrderStatus::Created, OrderStatus::Cancelled, true)
        .await
        .unwrap());

    let restocked = ListingStore::find(&store, listing).await.unwrap().unwrap();
    assert_eq!((restocked.stock, restocked.status), (1, ListingStatus::Active));
    let order = OrderStore::find(&store, order.id).await.unwrap().unwrap();
    assert!(order.stock_released);
}

#[sqlx::test(migrations = "./migrations")]
async fn test_intent_pays_for_one_listing_only(pool: PgPool) {
    let first = insert_listing(&pool, 5).await;
    let second = insert_listing(&pool, 5).await;
    let store = PgStore::new(pool);

    let reserved = store.reserve(first, 42, None, "pi_once").await.unwrap();
    assert!(matches!(reserved, Reservation::Reserved(_)));

    assert_eq!(
        store.reserve(second, 42, None, "pi_once").await.unwrap(),
        Reservation::PaymentUsed
    );
    assert_eq!(
        store.reserve(first, 43, None, "pi_once").await.unwrap(),
        Reservation::PaymentUsed
    );

    let untouched = ListingStore::find(&store, second).await.unwrap().unwrap();
    assert_eq!(untouched.stock, 5);
    let taken = ListingStore::find(&store, first).await.unwrap().unwrap();
    assert_eq!(taken.stock, 4);
}

#[sqlx::test(migrations = "./migrations")]
async fn test_sold_out_reserve_frees_the_intent(pool: PgPool) {
    let empty = insert_listing(&pool, 0).await;
    let stocked = insert_listing(&pool, 1).await;
    let store = PgStore::new(pool);

    assert_eq!(store.reserve(empty, 42, None, "pi_retry").await.unwrap(), Reservation::SoldOut);
    let reserved = store.reserve(stocked, 42, None, "pi_retry").await.unwrap();
    assert!(matches!(reserved, Reservation::Reserved(_)));
}

#[sqlx::test(migrations = "./migrations")]
async fn test_resale_refuses_spent_intent_and_scanned_ticket(pool: PgPool) {
    let listing = insert_listing(&pool, 5).await;
    let mut resales = Vec::new();
    for _ in 0..2 {
        let ticket: DbId = sqlx::query_scalar(
            "INSERT INTO tickets (event_id, owner_id) VALUES (77, 42) RETURNING id",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        let resale: DbId = sqlx::query_scalar(
            "INSERT INTO ticket_resales (ticket_id, seller_id, price_cents) \
             VALUES ($1, 42, 1500) RETURNING id",
        )
        .bind(ticket)
        .fetch_one(&pool)
        .await
        .unwrap();
        resales.push((resale, ticket));
    }
    let store = PgStore::new(pool);

    let reserved = store.reserve(listing, 8, None, "pi_spent").await.unwrap();
    assert!(matches!(reserved, Reservation::Reserved(_)));
    let (resale, ticket) = resales[0];
    assert_eq!(
        store.complete(resale, 8, "pi_spent", Utc::now()).await.unwrap(),
        ResaleOutcome::PaymentUsed
    );
    // Rolled back: the resale is still on sale and the ticket untouched.
    assert_eq!(ResaleStore::find(&store, resale).await.unwrap().unwrap().buyer_id, None);
    let seller_ticket = TicketStore::find(&store, ticket).await.unwrap().unwrap();
    assert_eq!(seller_ticket.status, TicketStatus::Valid);

    let (resale, ticket) = resales[1];
    assert!(store.mark_scanned(ticket, Some(5), 1, Utc::now()).await.unwrap());
    assert_eq!(
        store.complete(resale, 8, "pi_fresh", Utc::now()).await.unwrap(),
        ResaleOutcome::TicketNotValid
    );
}

#[sqlx::test(migrations = "./migrations")]
async fn test_connection_and_room_are_idempotent(pool: PgPool) {
    let beacon = insert_beacon(&pool, "PERSON", None).await;
    let store = PgStore::new(pool);

    let (_, created) = store.request(1, 2, beacon).await.unwrap();
    assert!(created);
    let (_, created) = store.request(1, 2, beacon).await.unwrap();
    assert!(!created);
    assert_eq!(store.pending_for(2).await.unwrap(), 1);

    assert!(store.join(9, 1).await.unwrap().newly_joined);
    let again = store.join(9, 1).await.unwrap();
    assert!(!again.newly_joined);
    assert_eq!(again.member_count, 1);
}

#[sqlx::test(migrations = "./migrations")]
async fn test_kill_switch_lifecycle(pool: PgPool) {
    let store = PgStore::new(pool);
    let switch = store
        .create(&NewKillSwitch {
            scope: KillSwitchScope::City,
            target: Some(" London ".into()),
            reason: "incident".into(),
            created_by: 1,
            expires_at: None,
        })
        .await
        .unwrap();
    assert_eq!(switch.target.as_deref(), Some("London"));

    store
        .create(&NewKillSwitch {
            scope: KillSwitchScope::Global,
            target: None,
            reason: "expired".into(),
            created_by: 1,
            expires_at: Some(Utc::now() - Duration::minutes(1)),
        })
        .await
        .unwrap();

    let live = store.list_live(Utc::now()).await.unwrap();
    assert_eq!(live.len(), 1);

    let off = store.deactivate(switch.id).await.unwrap().unwrap();
    assert!(!off.is_active);
    assert!(store.list_live(Utc::now()).await.unwrap().is_empty());
    assert_eq!(store.list_all().await.unwrap().len(), 2);
}

#[sqlx::test(migrations = "./migrations")]
async fn test_webhook_inbox_dedupes_and_claims(pool: PgPool) {
    let store = PgStore::new(pool);
    let payload = json!({ "id": "evt_1" });

    let id = store
        .enqueue(Provider::Stripe, "evt_1", "charge.refunded", &payload)
        .await
        .unwrap()
        .unwrap();
    assert!(store
        .enqueue(Provider::Stripe, "evt_1", "charge.refunded", &payload)
        .await
        .unwrap()
        .is_none());

    let later = Utc::now() + Duration::seconds(5);
    let claimed = store.pending(later, 10).await.unwrap();
    assert_eq!(claimed.len(), 1);
    // Leased rows are skipped until marked.
    assert!(store.pending(later, 10).await.unwrap().is_empty());

    store.record_failure(id, "boom").await.unwrap();
    let retried = store.pending(later, 10).await.unwrap();
    assert_eq!(retried[0].attempts, 1);

    store.mark_processed(id, "applied").await.unwrap();
    assert!(store.pending(later, 10).await.unwrap().is_empty());
}
