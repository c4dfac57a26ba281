//! Router assembly.
//!
//! SYSTEM CONTEXT
//! ==============
//! This module binds the room REST endpoints, the websocket upgrade, and the
//! health check under a single Axum router with permissive CORS and request
//! tracing.

pub mod rooms;
pub mod ws;

use axum::Router;
use axum::http::StatusCode;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the application router.
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/rooms", post(rooms::create_room_rest))
        .route(
            "/api/rooms/{code}",
            get(rooms::get_room_rest).delete(rooms::delete_room_rest),
        )
        .route("/api/ws", get(ws::handle_ws))
        .route("/healthz", get(healthz))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}
