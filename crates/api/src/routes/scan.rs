//! Route definitions for public scan endpoints (root level).

use axum::routing::get;
use axum::Router;

use crate::handlers::scan;
use crate::state::AppState;

/// Routes mounted at the root.
///
/// Authentication is optional: anonymous scans are routed too.
///
/// ```text
/// GET    /scan/{code}             -> scan_get
/// POST   /scan/{code}             -> scan_post
/// GET    /l/{code}                -> scan_link
/// POST   /l/{code}                -> scan_link_post
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/scan/{code}", get(scan::scan_get).post(scan::scan_post))
        .route("/l/{code}", get(scan::scan_link).post(scan::scan_link_post))
}
