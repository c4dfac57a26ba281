//! Room REST routes.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use grid::doc::{GridSettings, Room};
use serde::Deserialize;

use crate::services::room::{self, RoomError};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct CreateRoomBody {
    pub image_url: String,
    #[serde(default)]
    pub settings: GridSettings,
}

/// `POST /api/rooms`: create a room.
pub async fn create_room_rest(
    State(state): State<AppState>,
    Json(body): Json<CreateRoomBody>,
) -> Result<(StatusCode, Json<Room>), StatusCode> {
    let room = room::create_room(&state, &body.image_url, body.settings)
        .await
        .map_err(room_error_to_status)?;
    Ok((StatusCode::CREATED, Json(room)))
}

/// `GET /api/rooms/:code`: fetch a room snapshot.
pub async fn get_room_rest(State(state): State<AppState>, Path(code): Path<String>) -> Result<Json<Room>, StatusCode> {
    let code = room::normalize_room_code(&code).map_err(room_error_to_status)?;
    let room = room::get_room(&state, &code).await.map_err(room_error_to_status)?;
    Ok(Json(room))
}

/// `DELETE /api/rooms/:code`: delete a room and notify its participants.
pub async fn delete_room_rest(State(state): State<AppState>, Path(code): Path<String>) -> Result<StatusCode, StatusCode> {
    let code = room::normalize_room_code(&code).map_err(room_error_to_status)?;
    room::delete_room(&state, &code).await.map_err(room_error_to_status)?;
    Ok(StatusCode::NO_CONTENT)
}

pub(crate) fn room_error_to_status(err: RoomError) -> StatusCode {
    match err {
        RoomError::NotFound(_) => StatusCode::NOT_FOUND,
        RoomError::InvalidCode(_) | RoomError::MissingImage | RoomError::Invalid(_) => StatusCode::BAD_REQUEST,
        RoomError::CodesExhausted => StatusCode::SERVICE_UNAVAILABLE,
        RoomError::Corrupt(_) | RoomError::Database(_) => {
            tracing::error!(error = %err, "room request failed");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

#[cfg(test)]
#[path = "rooms_test.rs"]
mod tests;
