pub mod account;
pub mod admin;
pub mod health;
pub mod scan;
pub mod webhooks;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /webhooks/stripe                                 Stripe events (signed)
/// /webhooks/shopify                                Shopify events (signed)
///
/// /admin/kill-switches                             list, create (admin only)
/// /admin/kill-switches/{id}/deactivate             deactivate (POST)
/// /admin/beacons/{id}/activate                     draft -> active (POST)
/// /admin/beacons/{id}/pause                        active -> paused (POST)
/// /admin/beacons/{id}/resume                       paused -> active (POST)
/// /admin/beacons/{id}/archive                      any -> archived (POST)
/// /admin/beacons/{id}/signed-link                  mint signed link (POST)
///
/// /me/xp                                           XP totals and recent entries
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/webhooks", webhooks::router())
        .nest("/admin", admin::router())
        .nest("/me", account::router())
}
