//! Handlers for the signed-in user's own data.

use axum::extract::{Query, State};
use axum::Json;
use beacon_core::models::LedgerEntry;
use beacon_core::types::Xp;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::AppResult;
use crate::middleware::auth::AuthUser;
use crate::response::DataResponse;
use crate::state::AppState;

const DEFAULT_RECENT_LIMIT: i64 = 20;
const MAX_RECENT_LIMIT: i64 = 100;

#[derive(Debug, Deserialize)]
pub struct XpQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct XpSummary {
    /// Credited today (UTC), after the daily cap.
    pub today: i64,
    pub lifetime: i64,
    pub daily_cap: Xp,
    pub recent: Vec<LedgerEntry>,
}

/// GET /api/v1/me/xp
pub async fn my_xp(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<XpQuery>,
) -> AppResult<Json<DataResponse<XpSummary>>> {
    let limit = query.limit.unwrap_or(DEFAULT_RECENT_LIMIT).clamp(1, MAX_RECENT_LIMIT);
    let totals = state.ledger.totals(user.user_id, Utc::now().date_naive()).await?;
    let recent = state.ledger.recent(user.user_id, limit).await?;

    Ok(Json(DataResponse {
        data: XpSummary {
            today: totals.today,
            lifetime: totals.lifetime,
            daily_cap: state.ledger.daily_cap(),
            recent,
        },
    }))
}
