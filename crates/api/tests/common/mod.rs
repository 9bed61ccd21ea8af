#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use chrono::Utc;
use http_body_util::BodyExt;
use tower::ServiceExt;

use beacon_api::auth::jwt::{generate_access_token, JwtConfig, ROLE_ADMIN};
use beacon_api::config::ServerConfig;
use beacon_api::router::build_app_router;
use beacon_api::state::AppState;
use beacon_core::beacon::Beacon;
use beacon_core::memory::{MemoryLedger, MemorySink, MemoryStore, MemoryVerifier};
use beacon_core::status::BeaconStatus;
use beacon_core::types::DbId;
use beacon_events::EventBus;

pub const STRIPE_SECRET: &str = "whsec_test";
pub const SHOPIFY_SECRET: &str = "shpss_test";
pub const LINK_SECRET: &str = "link-secret";

/// Build a test `ServerConfig` through the same loader production uses.
pub fn test_config() -> ServerConfig {
    let vars: HashMap<&str, &str> = HashMap::from([
        ("HOST", "127.0.0.1"),
        ("PORT", "0"),
        ("DATABASE_URL", "postgres://unused"),
        ("JWT_SECRET", "test-jwt-secret"),
        ("STRIPE_WEBHOOK_SECRET", STRIPE_SECRET),
        ("SHOPIFY_WEBHOOK_SECRET", SHOPIFY_SECRET),
        ("SIGNED_LINK_SECRET", LINK_SECRET),
    ]);
    ServerConfig::from_lookup(|name| vars.get(name).map(|v| v.to_string()))
        .expect("test config is valid")
}

/// The full application over in-memory ports, with handles for seeding
/// and inspection.
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub store: Arc<MemoryStore>,
    pub ledger: Arc<MemoryLedger>,
    pub sink: Arc<MemorySink>,
    pub verifier: Arc<MemoryVerifier>,
}

impl TestApp {
    pub fn app(&self) -> Router {
        self.router.clone()
    }

    pub fn token(&self, user_id: DbId) -> String {
        generate_access_token(user_id, "user", &self.state.config.jwt).expect("token")
    }

    pub fn admin_token(&self, user_id: DbId) -> String {
        generate_access_token(user_id, ROLE_ADMIN, &self.state.config.jwt).expect("token")
    }

    /// Correctly signed but expired five minutes ago, past validation leeway.
    pub fn expired_token(&self, user_id: DbId) -> String {
        let jwt = JwtConfig::new(self.state.config.jwt.secret.clone(), -5);
        generate_access_token(user_id, "user", &jwt).expect("token")
    }
}

/// Build the full application router with all middleware layers.
pub fn build_test_app() -> TestApp {
    let config = test_config();
    let store = Arc::new(MemoryStore::default());
    let ledger = Arc::new(MemoryLedger::default());
    let sink = Arc::new(MemorySink::default());
    let verifier = Arc::new(MemoryVerifier::default());

    let state = AppState::new(
        Arc::new(config.clone()),
        store.stores(ledger.clone()),
        verifier.clone(),
        sink.clone(),
        Arc::new(EventBus::default()),
    );
    let router = build_app_router(state.clone(), &config);

    TestApp { router, state, store, ledger, sink, verifier }
}

/// An active beacon with no limits, fence or target.
pub fn beacon(id: DbId, beacon_type: &str) -> Beacon {
    Beacon {
        id,
        code: format!("B{id:04}"),
        beacon_type: beacon_type.into(),
        subtype: None,
        label: format!("{beacon_type} beacon"),
        status: BeaconStatus::Active,
        owner_id: 900,
        target_ref: None,
        vendor_id: None,
        city: None,
        xp_base: None,
        xp_multiplier: None,
        scan_count: 0,
        scan_limit: None,
        per_user_daily_limit: None,
        geofence: None,
        active_from: None,
        active_until: None,
        created_at: Utc::now(),
    }
}

pub async fn send(
    app: Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<serde_json::Value>,
) -> Response<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    let body = match body {
        Some(json) => {
            builder = builder.header("content-type", "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };
    app.oneshot(builder.body(body).expect("request")).await.expect("response")
}

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    send(app, Method::GET, uri, None, None).await
}

pub async fn get_authed(app: Router, uri: &str, token: &str) -> Response<Body> {
    send(app, Method::GET, uri, Some(token), None).await
}

pub async fn post_json(
    app: Router,
    uri: &str,
    token: Option<&str>,
    body: serde_json::Value,
) -> Response<Body> {
    send(app, Method::POST, uri, token, Some(body)).await
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.expect("body").to_bytes();
    serde_json::from_slice(&bytes).expect("json body")
}

/// Poll `check` until it holds; spawned webhook processing is asynchronous.
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
