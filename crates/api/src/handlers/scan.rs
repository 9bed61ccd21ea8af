//! Handlers for scan endpoints.
//!
//! Scans never fail at the HTTP level for domain reasons: the engine always
//! produces a [`ScanResponse`]. The status code only distinguishes an
//! unknown code (404) and a datastore outage before the beacon could be
//! resolved (503).

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use beacon_core::geo::GeoPoint;
use beacon_core::models::ScanSource;
use beacon_core::scan::{LinkParams, ScanMode, ScanRequest, ScanResponse, ScanUi};
use beacon_core::types::DbId;
use chrono::Utc;
use serde::Deserialize;

use crate::error::{AppError, AppResult};
use crate::middleware::auth::MaybeAuthUser;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Request types
// ---------------------------------------------------------------------------

/// Scan parameters, from the query string or a JSON body.
#[derive(Debug, Default, Deserialize)]
pub struct ScanParams {
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    #[serde(default)]
    pub mode: ScanMode,
    pub source: Option<ScanSource>,
    pub ticket_id: Option<DbId>,
    pub payment_intent_id: Option<String>,
}

impl ScanParams {
    /// Body fields win over query fields.
    fn merge(self, body: ScanParams) -> ScanParams {
        ScanParams {
            lat: body.lat.or(self.lat),
            lng: body.lng.or(self.lng),
            mode: if body.mode == ScanMode::default() { self.mode } else { body.mode },
            source: body.source.or(self.source),
            ticket_id: body.ticket_id.or(self.ticket_id),
            payment_intent_id: body.payment_intent_id.or(self.payment_intent_id),
        }
    }

    fn into_request(self, code: String, user: MaybeAuthUser) -> ScanRequest {
        let mut req = ScanRequest::new(code, user.0.map(|u| u.user_id), Utc::now());
        req.mode = self.mode;
        req.source = self.source.unwrap_or(ScanSource::Qr);
        req.point = match (self.lat, self.lng) {
            (Some(lat), Some(lng)) => Some(GeoPoint::new(lat, lng)),
            _ => None,
        };
        req.ticket_id = self.ticket_id;
        req.payment_intent_id = self.payment_intent_id.filter(|id| !id.trim().is_empty());
        req
    }
}

/// `exp` / `sig` of a signed link. Missing values fail signature checks
/// rather than the request.
#[derive(Debug, Deserialize)]
pub struct LinkQuery {
    pub exp: Option<i64>,
    pub sig: Option<String>,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// GET /scan/{code}
pub async fn scan_get(
    State(state): State<AppState>,
    user: MaybeAuthUser,
    Path(code): Path<String>,
    Query(params): Query<ScanParams>,
) -> (StatusCode, Json<ScanResponse>) {
    respond(state.engine.scan(params.into_request(code, user)).await)
}

/// POST /scan/{code}
///
/// Accepts the same parameters as the GET form, as an optional JSON body.
pub async fn scan_post(
    State(state): State<AppState>,
    user: MaybeAuthUser,
    Path(code): Path<String>,
    Query(query): Query<ScanParams>,
    body: Bytes,
) -> AppResult<(StatusCode, Json<ScanResponse>)> {
    let params = with_body(query, &body)?;
    Ok(respond(state.engine.scan(params.into_request(code, user)).await))
}

/// GET /l/{code}?exp=..&sig=..
pub async fn scan_link(
    State(state): State<AppState>,
    user: MaybeAuthUser,
    Path(code): Path<String>,
    Query(params): Query<ScanParams>,
    Query(link): Query<LinkQuery>,
) -> (StatusCode, Json<ScanResponse>) {
    respond(state.engine.scan(link_request(params, link, code, user)).await)
}

/// POST /l/{code}?exp=..&sig=..
///
/// Signed-link counterpart of [`scan_post`]: the signature stays in the
/// query string, scan parameters may come in the body.
pub async fn scan_link_post(
    State(state): State<AppState>,
    user: MaybeAuthUser,
    Path(code): Path<String>,
    Query(query): Query<ScanParams>,
    Query(link): Query<LinkQuery>,
    body: Bytes,
) -> AppResult<(StatusCode, Json<ScanResponse>)> {
    let params = with_body(query, &body)?;
    Ok(respond(state.engine.scan(link_request(params, link, code, user)).await))
}

/// An empty body leaves the query parameters as they are.
fn with_body(query: ScanParams, body: &[u8]) -> AppResult<ScanParams> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(query);
    }
    let body: ScanParams = serde_json::from_slice(body)
        .map_err(|e| AppError::BadRequest(format!("Invalid scan body: {e}")))?;
    Ok(query.merge(body))
}

fn link_request(
    params: ScanParams,
    link: LinkQuery,
    code: String,
    user: MaybeAuthUser,
) -> ScanRequest {
    let mut req = params.into_request(code, user);
    req.source = ScanSource::Link;
    req.link = Some(LinkParams {
        expires_at: link.exp.unwrap_or(0),
        sig: link.sig.unwrap_or_default(),
    });
    req
}

fn respond(response: ScanResponse) -> (StatusCode, Json<ScanResponse>) {
    let status = if response.is_beacon_missing() {
        StatusCode::NOT_FOUND
    } else if response.beacon.is_none() && matches!(response.ui, ScanUi::RetryLater { .. }) {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };
    (status, Json(response))
}
