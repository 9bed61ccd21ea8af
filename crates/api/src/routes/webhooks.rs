//! Route definitions for the `/webhooks` resource.

use axum::routing::post;
use axum::Router;

use crate::handlers::webhooks;
use crate::state::AppState;

/// Routes mounted at `/webhooks`. Authenticated by provider signature.
///
/// ```text
/// POST   /stripe                  -> stripe
/// POST   /shopify                 -> shopify
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/stripe", post(webhooks::stripe))
        .route("/shopify", post(webhooks::shopify))
}
