//! Integration tests for payment webhooks and the inbox retry poller.

mod common;

use axum::body::Body;
use axum::http::{Request, Response, StatusCode};
use axum::Router;
use beacon_api::background::webhook_inbox;
use beacon_core::models::{Order, Provider};
use beacon_core::signature::{sign_shopify, sign_stripe};
use beacon_core::status::OrderStatus;
use chrono::Utc;
use serde_json::json;
use tower::ServiceExt;

use common::{body_json, eventually, SHOPIFY_SECRET, STRIPE_SECRET};

fn order(id: i64, session: &str, intent: &str) -> Order {
    Order {
        id,
        buyer_id: 5,
        seller_id: None,
        listing_id: None,
        beacon_id: None,
        quantity: 1,
        status: OrderStatus::Created,
        total_cents: 2500,
        currency: "gbp".into(),
        provider_session_id: Some(session.into()),
        provider_intent_id: Some(intent.into()),
        stock_released: false,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

async fn post_raw(app: Router, uri: &str, headers: &[(&str, String)], body: &str) -> Response<Body> {
    let mut builder = Request::builder().method("POST").uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, value);
    }
    app.oneshot(builder.body(Body::from(body.to_string())).unwrap())
        .await
        .unwrap()
}

async fn post_stripe(app: Router, body: &str) -> Response<Body> {
    let sig = sign_stripe(body.as_bytes(), STRIPE_SECRET, Utc::now().timestamp());
    post_raw(app, "/api/v1/webhooks/stripe", &[("stripe-signature", sig)], body).await
}

fn session_completed(event_id: &str, order_id: i64) -> String {
    json!({
        "id": event_id,
        "type": "checkout.session.completed",
        "data": { "object": {
            "id": "cs_1",
            "payment_intent": "pi_1",
            "payment_status": "paid",
            "metadata": { "order_id": order_id.to_string() },
        }},
    })
    .to_string()
}

#[tokio::test]
async fn stripe_payment_marks_order_paid_once() {
    let t = common::build_test_app();
    t.store.add_order(order(77, "cs_1", "pi_1"));
    let body = session_completed("evt_1", 77);

    let response = post_stripe(t.app(), &body).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["received"], true);
    assert_eq!(json["duplicate"], false);

    let store = t.store.clone();
    assert!(eventually(|| store.order(77).is_some_and(|o| o.status == OrderStatus::Paid)).await);
    let ledger = t.ledger.clone();
    assert!(eventually(|| ledger.entries().len() == 1).await);

    let again = body_json(post_stripe(t.app(), &body).await).await;
    assert_eq!(again["duplicate"], true);

    let entries = t.ledger.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].user_id, 5);
    assert_eq!(entries[0].amount, 25);
    assert_eq!(entries[0].dedupe_key, "order:77:purchase_xp");
}

#[tokio::test]
async fn stripe_bad_signature_is_400_and_not_stored() {
    let t = common::build_test_app();
    t.store.add_order(order(77, "cs_1", "pi_1"));
    let body = session_completed("evt_1", 77);
    let forged = sign_stripe(body.as_bytes(), "whsec_other", Utc::now().timestamp());

    let response =
        post_raw(t.app(), "/api/v1/webhooks/stripe", &[("stripe-signature", forged)], &body).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // A correctly signed delivery of the same event is still new.
    let json = body_json(post_stripe(t.app(), &body).await).await;
    assert_eq!(json["duplicate"], false);
}

#[tokio::test]
async fn stripe_stale_timestamp_is_rejected() {
    let t = common::build_test_app();
    let body = session_completed("evt_1", 77);
    let old = sign_stripe(body.as_bytes(), STRIPE_SECRET, Utc::now().timestamp() - 3600);

    let response =
        post_raw(t.app(), "/api/v1/webhooks/stripe", &[("stripe-signature", old)], &body).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_stripe_event_is_acknowledged() {
    let t = common::build_test_app();
    let body = json!({
        "id": "evt_9",
        "type": "customer.created",
        "data": { "object": { "id": "cus_1" } },
    })
    .to_string();

    let response = post_stripe(t.app(), &body).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(t.store.orders().is_empty());
}

#[tokio::test]
async fn shopify_cancellation_releases_order() {
    let t = common::build_test_app();
    t.store.add_order(order(78, "cs_2", "pi_2"));
    let body = json!({
        "id": 9001,
        "note_attributes": [{ "name": "order_id", "value": "78" }],
    })
    .to_string();
    let headers = [
        ("x-shopify-hmac-sha256", sign_shopify(body.as_bytes(), SHOPIFY_SECRET)),
        ("x-shopify-topic", "orders/cancelled".to_string()),
        ("x-shopify-webhook-id", "sh-1".to_string()),
    ];

    let response = post_raw(t.app(), "/api/v1/webhooks/shopify", &headers, &body).await;
    assert_eq!(response.status(), StatusCode::OK);

    let store = t.store.clone();
    assert!(eventually(|| store.order(78).is_some_and(|o| o.status == OrderStatus::Cancelled)).await);
    assert!(t.ledger.entries().is_empty());
}

#[tokio::test]
async fn shopify_without_topic_is_400() {
    let t = common::build_test_app();
    let body = json!({ "id": 1 }).to_string();
    let headers = [
        ("x-shopify-hmac-sha256", sign_shopify(body.as_bytes(), SHOPIFY_SECRET)),
        ("x-shopify-webhook-id", "sh-2".to_string()),
    ];

    let response = post_raw(t.app(), "/api/v1/webhooks/shopify", &headers, &body).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn poller_reprocesses_stale_inbox_rows() {
    let t = common::build_test_app();
    t.store.add_order(order(79, "cs_3", "pi_3"));
    let payload = json!({
        "id": "evt_old",
        "type": "payment_intent.succeeded",
        "data": { "object": { "id": "pi_3" } },
    });
    let id = t
        .state
        .stores
        .inbox
        .enqueue(Provider::Stripe, "evt_old", "payment_intent.succeeded", &payload)
        .await
        .unwrap()
        .unwrap();

    // Fresh rows belong to their request's task.
    assert_eq!(webhook_inbox::drain_once(&t.state.reconciler).await.unwrap(), 0);

    t.store.age_inbox_event(id, chrono::Duration::minutes(5));
    assert_eq!(webhook_inbox::drain_once(&t.state.reconciler).await.unwrap(), 1);
    assert_eq!(t.store.order(79).unwrap().status, OrderStatus::Paid);
    assert_eq!(t.store.inbox_outcome(id).as_deref(), Some("applied"));

    assert_eq!(webhook_inbox::drain_once(&t.state.reconciler).await.unwrap(), 0);
}
