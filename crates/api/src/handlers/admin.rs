//! Handlers for the `/admin` resource: kill switches, beacon lifecycle and
//! signed links.
//!
//! All handlers require the `admin` role via [`RequireAdmin`].

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use beacon_core::beacon::{validate_activation, validate_transition, Beacon, BeaconSummary};
use beacon_core::error::CoreError;
use beacon_core::kill_switch::{self, KillSwitch, NewKillSwitch};
use beacon_core::signed_link;
use beacon_core::status::BeaconStatus;
use beacon_core::types::DbId;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::middleware::rbac::RequireAdmin;
use crate::response::DataResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

/// Request body for `POST /admin/beacons/{id}/signed-link`.
#[derive(Debug, Deserialize)]
pub struct SignedLinkRequest {
    pub ttl_secs: i64,
}

#[derive(Debug, Serialize)]
pub struct SignedLinkResponse {
    /// Path and query of the link, relative to the public host.
    pub url: String,
    pub expires_at: i64,
}

// ---------------------------------------------------------------------------
// Kill switches
// ---------------------------------------------------------------------------

/// GET /api/v1/admin/kill-switches
///
/// Every switch, live or not, newest first.
pub async fn list_kill_switches(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
) -> AppResult<Json<DataResponse<Vec<KillSwitch>>>> {
    let switches = state.stores.kill_switches.list_all().await?;
    Ok(Json(DataResponse { data: switches }))
}

/// POST /api/v1/admin/kill-switches
pub async fn create_kill_switch(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Json(mut input): Json<NewKillSwitch>,
) -> AppResult<(StatusCode, Json<DataResponse<KillSwitch>>)> {
    input.target = input.target.map(|t| t.trim().to_string());
    kill_switch::validate_new(input.scope, input.target.as_deref())
        .map_err(|msg| AppError::Core(CoreError::Validation(msg)))?;
    if input.reason.trim().is_empty() {
        return Err(AppError::Core(CoreError::Validation(
            "a kill switch needs a reason".into(),
        )));
    }
    if input.expires_at.is_some_and(|at| at <= Utc::now()) {
        return Err(AppError::Core(CoreError::Validation(
            "expires_at must be in the future".into(),
        )));
    }
    input.created_by = admin.user_id;

    let switch = state.stores.kill_switches.create(&input).await?;
    tracing::warn!(
        kill_switch_id = switch.id,
        scope = switch.scope.as_str(),
        switch_target = ?switch.target,
        admin_id = admin.user_id,
        "Kill switch activated"
    );
    Ok((StatusCode::CREATED, Json(DataResponse { data: switch })))
}

/// POST /api/v1/admin/kill-switches/{id}/deactivate
pub async fn deactivate_kill_switch(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<KillSwitch>>> {
    let switch = state
        .stores
        .kill_switches
        .deactivate(id)
        .await?
        .ok_or(CoreError::NotFound { entity: "kill_switch", id })?;
    tracing::info!(kill_switch_id = id, admin_id = admin.user_id, "Kill switch deactivated");
    Ok(Json(DataResponse { data: switch }))
}

// ---------------------------------------------------------------------------
// Beacon lifecycle
// ---------------------------------------------------------------------------

/// POST /api/v1/admin/beacons/{id}/activate
///
/// Draft beacons only. Enforces the target requirement and the premium gate.
pub async fn activate_beacon(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<BeaconSummary>>> {
    let beacon = find_beacon(&state, id).await?;
    if beacon.status != BeaconStatus::Draft {
        return Err(AppError::Core(CoreError::Conflict(format!(
            "only draft beacons can be activated (status is '{}')",
            beacon.status
        ))));
    }
    let premium = state
        .stores
        .beacons
        .owner_is_premium(beacon.owner_id, Utc::now())
        .await?;
    validate_activation(&beacon, premium)?;
    change_status(&state, beacon, BeaconStatus::Active, admin.user_id).await
}

/// POST /api/v1/admin/beacons/{id}/pause
pub async fn pause_beacon(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<BeaconSummary>>> {
    let beacon = find_beacon(&state, id).await?;
    change_status(&state, beacon, BeaconStatus::Paused, admin.user_id).await
}

/// POST /api/v1/admin/beacons/{id}/resume
pub async fn resume_beacon(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<BeaconSummary>>> {
    let beacon = find_beacon(&state, id).await?;
    if beacon.status != BeaconStatus::Paused {
        return Err(AppError::Core(CoreError::Conflict(format!(
            "only paused beacons can be resumed (status is '{}')",
            beacon.status
        ))));
    }
    change_status(&state, beacon, BeaconStatus::Active, admin.user_id).await
}

/// POST /api/v1/admin/beacons/{id}/archive
pub async fn archive_beacon(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<BeaconSummary>>> {
    let beacon = find_beacon(&state, id).await?;
    change_status(&state, beacon, BeaconStatus::Archived, admin.user_id).await
}

async fn find_beacon(state: &AppState, id: DbId) -> AppResult<Beacon> {
    state
        .stores
        .beacons
        .find_by_id(id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound { entity: "beacon", id }))
}

/// Validate and apply a lifecycle move as a conditional write.
async fn change_status(
    state: &AppState,
    mut beacon: Beacon,
    to: BeaconStatus,
    admin_id: DbId,
) -> AppResult<Json<DataResponse<BeaconSummary>>> {
    let from = beacon.status;
    validate_transition(from, to)?;
    if !state.stores.beacons.transition_status(beacon.id, from, to).await? {
        return Err(AppError::Core(CoreError::Conflict(format!(
            "beacon {} changed status concurrently; reload and retry",
            beacon.id
        ))));
    }
    tracing::info!(beacon_id = beacon.id, from = %from, to = %to, admin_id, "Beacon status changed");
    beacon.status = to;
    Ok(Json(DataResponse { data: beacon.summary() }))
}

// ---------------------------------------------------------------------------
// Signed links
// ---------------------------------------------------------------------------

/// POST /api/v1/admin/beacons/{id}/signed-link
///
/// Mint a `/l/{code}` link valid for `ttl_secs`.
pub async fn create_signed_link(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<DbId>,
    Json(input): Json<SignedLinkRequest>,
) -> AppResult<Json<DataResponse<SignedLinkResponse>>> {
    let secret = state
        .config
        .signed_link_secret
        .as_deref()
        .ok_or_else(|| AppError::ServiceUnavailable("Signed links are not configured".into()))?;
    if !(1..=signed_link::MAX_TTL_SECS).contains(&input.ttl_secs) {
        return Err(AppError::Core(CoreError::Validation(format!(
            "ttl_secs must be between 1 and {}",
            signed_link::MAX_TTL_SECS
        ))));
    }

    let beacon = find_beacon(&state, id).await?;
    let expires_at = Utc::now().timestamp() + input.ttl_secs;
    let sig = signed_link::sign(&beacon.code, expires_at, secret);
    tracing::info!(beacon_id = beacon.id, expires_at, admin_id = admin.user_id, "Signed link minted");

    Ok(Json(DataResponse {
        data: SignedLinkResponse {
            url: format!("/l/{}?exp={expires_at}&sig={sig}", beacon.code),
            expires_at,
        },
    }))
}
