pub mod api;
pub mod config;
pub mod error;
pub mod game_loop;
pub mod health;
pub mod identity;
pub mod lobby;
pub mod results;
pub mod state;
pub mod ws;

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use config::ServerConfig;
use identity::{IdentityResolver, QueryIdentityResolver};
use state::AppState;

/// Build the Axum router and application state from a config.
pub fn build_app(config: ServerConfig) -> (Router<()>, AppState) {
    build_app_with_identity(config, Arc::new(QueryIdentityResolver))
}

/// Same as [`build_app`], with a custom identity collaborator.
pub fn build_app_with_identity(
    config: ServerConfig,
    identity: Arc<dyn IdentityResolver>,
) -> (Router<()>, AppState) {
    let state = AppState::with_identity(config, identity);

    let api_routes = Router::new()
        .route("/status", get(api::get_status))
        .route("/results", get(api::list_results))
        .route("/results/{match_id}", get(api::get_result));

    let app = Router::new()
        .route("/ws", get(ws::ws_handler))
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        .nest("/api/v1", api_routes)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state.clone());

    (app, state)
}
