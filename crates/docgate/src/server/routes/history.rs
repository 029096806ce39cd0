//! Processing history endpoints

use axum::extract::{Query, State};
use axum::Json;

use crate::error::{Error, Result};
use crate::history::{HistoryFilter, HistoryPage};
use crate::server::state::AppState;

/// GET /api/history - filtered, newest-first pages of outcomes
pub async fn query_history(
    State(state): State<AppState>,
    Query(filter): Query<HistoryFilter>,
) -> Result<Json<HistoryPage>> {
    let page = state.history().query(&filter)?;
    Ok(Json(page))
}

/// GET /api/history/stats - totals for the retained window
pub async fn history_stats(State(state): State<AppState>) -> Result<Json<serde_json::Value>> {
    let stats = state.history().stats()?;
    Ok(Json(
        serde_json::to_value(stats).map_err(|e| Error::History(e.to_string()))?,
    ))
}
