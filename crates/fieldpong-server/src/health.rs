use std::sync::atomic::Ordering;

use axum::Json;
use axum::extract::State;
use serde::Serialize;

use crate::state::AppState;

/// Structured health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub connections: ConnectionInfo,
    pub matches: MatchInfo,
}

#[derive(Serialize)]
pub struct ConnectionInfo {
    pub websocket: usize,
    pub players: usize,
}

#[derive(Serialize)]
pub struct MatchInfo {
    pub active: usize,
    pub queued: usize,
}

/// Structured health check endpoint. Returns server status, connection counts,
/// and match info as JSON.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let ws = state.ws_connection_count.load(Ordering::Relaxed);

    let (stats, active) = {
        let lobby = state.lobby.read().await;
        (lobby.stats(), lobby.active_matches())
    };

    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        connections: ConnectionInfo {
            websocket: ws,
            players: stats.connected_players,
        },
        matches: MatchInfo {
            active,
            queued: stats.matchmaker.queued.values().sum(),
        },
    })
}

/// Readiness check: the match tuning the server was started with must be runnable.
pub async fn readiness_check(State(state): State<AppState>) -> &'static str {
    if state.config.matches.validate().is_err() {
        return "not ready: invalid match configuration";
    }
    "ready"
}
