//! HTTP route definitions

use axum::{
    extract::State,
    http::{header, Method},
    response::Json,
    routing::get,
    Router,
};
use serde::Serialize;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::app::AppState;
use crate::game::session::Scoreboard;
use crate::util::time::uptime_secs;
use crate::ws::handler::ws_handler;

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    // CORS configuration - support multiple origins (comma-separated in CLIENT_ORIGIN)
    let cors = match state.config.client_origin.as_deref() {
        Some(origins) => {
            let allowed_origins: Vec<header::HeaderValue> = origins
                .split(',')
                .filter_map(|s| s.trim().parse::<header::HeaderValue>().ok())
                .collect();

            CorsLayer::new()
                .allow_origin(allowed_origins)
                .allow_methods([Method::GET, Method::OPTIONS])
                .allow_headers([header::CONTENT_TYPE])
        }
        None => CorsLayer::permissive(),
    };

    Router::new()
        .route("/health", get(health_handler))
        .route("/scoreboard", get(scoreboard_handler))
        .route("/ws", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

// ============================================================================
// Health endpoint
// ============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
    tick: u64,
    in_lobby: bool,
    participants: usize,
    pending_spawns: usize,
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let status = state.session.status();

    Json(HealthResponse {
        status: "ok",
        uptime_secs: uptime_secs(),
        tick: status.tick,
        in_lobby: status.in_lobby,
        participants: status.participant_count,
        pending_spawns: status.pending_spawns,
    })
}

// ============================================================================
// Scoreboard endpoint
// ============================================================================

#[derive(Serialize)]
struct ScoreboardResponse {
    in_lobby: bool,
    #[serde(flatten)]
    teams: Scoreboard,
}

async fn scoreboard_handler(State(state): State<AppState>) -> Json<ScoreboardResponse> {
    let status = state.session.status();

    Json(ScoreboardResponse {
        in_lobby: status.in_lobby,
        teams: status.scoreboard,
    })
}
