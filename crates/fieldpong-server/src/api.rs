use axum::extract::{Path, Query, State};
use axum::response::Json;
use serde::{Deserialize, Serialize};

use fieldpong_core::state::MatchResult;

use crate::error::AppError;
use crate::lobby::LobbyStats;
use crate::results::ResultStats;
use crate::state::AppState;

const DEFAULT_RESULTS_PAGE: usize = 20;

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub lobby: LobbyStats,
    pub results: ResultStats,
}

/// GET /api/v1/status: queue depths and recorded results.
pub async fn get_status(State(state): State<AppState>) -> Json<StatusResponse> {
    let lobby = state.lobby.read().await.stats();
    Json(StatusResponse {
        lobby,
        results: state.results.stats(),
    })
}

#[derive(Debug, Deserialize)]
pub struct ResultsQuery {
    pub limit: Option<usize>,
}

/// GET /api/v1/results: most recent match results, newest first.
pub async fn list_results(
    State(state): State<AppState>,
    Query(query): Query<ResultsQuery>,
) -> Result<Json<Vec<MatchResult>>, AppError> {
    let max = state.config.limits.max_results_page;
    let limit = query.limit.unwrap_or(DEFAULT_RESULTS_PAGE.min(max));
    if limit == 0 || limit > max {
        return Err(AppError::BadRequest(format!(
            "limit must be between 1 and {max}"
        )));
    }
    Ok(Json(state.results.recent(limit)))
}

/// GET /api/v1/results/{match_id}
pub async fn get_result(
    State(state): State<AppState>,
    Path(match_id): Path<String>,
) -> Result<Json<MatchResult>, AppError> {
    state
        .results
        .get(&match_id)
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("No result for match {match_id}")))
}
