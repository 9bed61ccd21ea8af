use axum::routing::get;
use axum::Router;

use crate::handlers::account;
use crate::state::AppState;

/// Routes mounted at `/me`. Require authentication.
///
/// ```text
/// GET    /xp                      -> my_xp
/// ```
pub fn router() -> Router<AppState> {
    Router::new().route("/xp", get(account::my_xp))
}
