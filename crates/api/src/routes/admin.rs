//! Route definitions for the `/admin` resource.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::admin;
use crate::state::AppState;

/// Routes mounted at `/admin`.
///
/// All routes require the `admin` role (enforced by handler extractors).
///
/// ```text
/// GET    /kill-switches                  -> list_kill_switches
/// POST   /kill-switches                  -> create_kill_switch
/// POST   /kill-switches/{id}/deactivate  -> deactivate_kill_switch
/// POST   /beacons/{id}/activate          -> activate_beacon
/// POST   /beacons/{id}/pause             -> pause_beacon
/// POST   /beacons/{id}/resume            -> resume_beacon
/// POST   /beacons/{id}/archive           -> archive_beacon
/// POST   /beacons/{id}/signed-link       -> create_signed_link
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/kill-switches",
            get(admin::list_kill_switches).post(admin::create_kill_switch),
        )
        .route(
            "/kill-switches/{id}/deactivate",
            post(admin::deactivate_kill_switch),
        )
        .route("/beacons/{id}/activate", post(admin::activate_beacon))
        .route("/beacons/{id}/pause", post(admin::pause_beacon))
        .route("/beacons/{id}/resume", post(admin::resume_beacon))
        .route("/beacons/{id}/archive", post(admin::archive_beacon))
        .route("/beacons/{id}/signed-link", post(admin::create_signed_link))
}
