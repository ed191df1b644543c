//! Dashboard HTTP API

use axum::{extract::State, response::IntoResponse, routing::get, Json, Router};
use tower_http::cors::{Any, CorsLayer};

use super::types::*;
use crate::monitor::SharedBoard;

/// Create the API router with all endpoints
pub fn create_router(board: SharedBoard) -> Router {
    Router::new()
        .route("/health", get(get_health))
        .route("/api/status", get(get_status))
        .with_state(board)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}

/// GET /health - Liveness
async fn get_health(State(board): State<SharedBoard>) -> impl IntoResponse {
    let now = chrono::Utc::now().timestamp_millis();
    let board = board.read().await;
    Json(HealthResponse {
        status: "ok",
        uptime_secs: board.uptime_secs(now),
        cycles: board.cycles,
        last_cycle_at: board.last_cycle_at,
    })
}

/// GET /api/status - Last cycle summary per instrument
async fn get_status(State(board): State<SharedBoard>) -> impl IntoResponse {
    let board = board.read().await;
    Json(ApiResponse::success(StatusResponse {
        cycles: board.cycles,
        last_cycle_at: board.last_cycle_at,
        instruments: board.instruments.values().cloned().collect(),
    }))
}
