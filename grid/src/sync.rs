//! Translation between engine actions and wire frames.
//!
//! Outbound, store writes produced by the engine become request frames
//! addressed to the current room. Inbound, frames from the server become
//! engine calls. Replies to our own writes are skipped: the engine applied
//! those locally before sending, and a late echo could resurrect state that
//! a later undo removed.

#[cfg(test)]
#[path = "sync_test.rs"]
mod sync_test;

use std::collections::BTreeSet;

use frames::{Data, FRAME_CODE, FRAME_MESSAGE, Frame, Status};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::doc::{Cell, CellKey, CellStrokes, GridSettings, Room, Stroke};
use crate::engine::{Action, EngineCore};

pub const ROOM_CREATE: &str = "room:create";
pub const ROOM_JOIN: &str = "room:join";
pub const ROOM_PART: &str = "room:part";
pub const ROOM_SETTINGS: &str = "room:settings";
pub const ROOM_DELETED: &str = "room:deleted";
pub const CELL_SET: &str = "cell:set";
pub const STROKES_SET: &str = "strokes:set";
pub const CLUE_SET: &str = "clue:set";
pub const DRAWING_SET: &str = "drawing:set";
pub const SESSION_CONNECTED: &str = "session:connected";

/// Failures while translating frames.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("frame is missing field: {0}")]
    MissingField(&'static str),
    #[error("invalid payload: {0}")]
    Payload(#[from] serde_json::Error),
    #[error("server error {code}: {message}")]
    Remote { code: String, message: String },
}

impl frames::ErrorCode for SyncError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::MissingField(_) | Self::Payload(_) => "E_SYNC_PAYLOAD",
            Self::Remote { .. } => "E_SYNC_REMOTE",
        }
    }
}

// =============================================================================
// OUTBOUND
// =============================================================================

/// Build the store write for an engine action, if it is one.
///
/// # Errors
///
/// Returns [`SyncError::Payload`] if the payload cannot be serialized.
pub fn action_to_frame(room_id: &str, action: &Action, now_ms: i64) -> Result<Option<Frame>, SyncError> {
    let (syscall, data) = match action {
        Action::SyncStrokes { strokes } => (STROKES_SET, data_with("strokes", serde_json::to_value(strokes)?)),
        Action::SetCell { cell, value } => {
            let mut data = data_with("cell", Value::String(cell.to_string()));
            data.insert("value".into(), serde_json::to_value(value)?);
            (CELL_SET, data)
        }
        Action::SetMarkedClues { marked } => (CLUE_SET, data_with("marked", serde_json::to_value(marked)?)),
        Action::SyncDrawing { strokes } => (DRAWING_SET, data_with("strokes", serde_json::to_value(strokes)?)),
        _ => return Ok(None),
    };
    Ok(Some(Frame::request_at(syscall, data, now_ms).with_room_id(room_id)))
}

/// Build store writes for a batch of actions, skipping host-only effects.
///
/// # Errors
///
/// Returns the first serialization failure.
pub fn actions_to_frames(room_id: &str, actions: &[Action], now_ms: i64) -> Result<Vec<Frame>, SyncError> {
    let mut out = Vec::new();
    for action in actions {
        if let Some(frame) = action_to_frame(room_id, action, now_ms)? {
            out.push(frame);
        }
    }
    Ok(out)
}

/// Request a new room over `image_url`.
///
/// # Errors
///
/// Returns [`SyncError::Payload`] if the settings cannot be serialized.
pub fn create_request(image_url: &str, settings: &GridSettings, now_ms: i64) -> Result<Frame, SyncError> {
    let mut data = data_with("image_url", Value::String(image_url.to_owned()));
    data.insert("settings".into(), serde_json::to_value(settings)?);
    Ok(Frame::request_at(ROOM_CREATE, data, now_ms))
}

#[must_use]
pub fn join_request(room_id: &str, now_ms: i64) -> Frame {
    Frame::request_at(ROOM_JOIN, Data::new(), now_ms).with_room_id(room_id)
}

#[must_use]
pub fn part_request(room_id: &str, now_ms: i64) -> Frame {
    Frame::request_at(ROOM_PART, Data::new(), now_ms).with_room_id(room_id)
}

/// Replace the room's grid settings.
///
/// # Errors
///
/// Returns [`SyncError::Payload`] if the settings cannot be serialized.
pub fn settings_request(room_id: &str, settings: &GridSettings, now_ms: i64) -> Result<Frame, SyncError> {
    let data = data_with("settings", serde_json::to_value(settings)?);
    Ok(Frame::request_at(ROOM_SETTINGS, data, now_ms).with_room_id(room_id))
}

fn data_with(key: &str, value: Value) -> Data {
    let mut data = Data::new();
    data.insert(key.to_owned(), value);
    data
}

// =============================================================================
// INBOUND
// =============================================================================

/// Apply one inbound frame to the engine.
///
/// # Errors
///
/// Returns [`SyncError::Remote`] for error frames and a payload error when a
/// frame the engine consumes is malformed.
pub fn apply_frame(engine: &mut EngineCore, frame: &Frame) -> Result<Vec<Action>, SyncError> {
    if frame.status == Status::Error {
        return Err(SyncError::Remote {
            code: frame.str_field(FRAME_CODE).unwrap_or("E_UNKNOWN").to_owned(),
            message: frame.str_field(FRAME_MESSAGE).unwrap_or_default().to_owned(),
        });
    }
    let own_reply = frame.parent_id.is_some();

    match frame.syscall.as_str() {
        // Replies to create/join carry the room; peer join notices don't.
        ROOM_CREATE | ROOM_JOIN if frame.data.contains_key("room") => {
            Ok(engine.load_room(field::<Room>(frame, "room")?))
        }
        SESSION_CONNECTED => {
            let client_id = frame.str_field("client_id").ok_or(SyncError::MissingField("client_id"))?;
            engine.set_client_id(client_id);
            Ok(Vec::new())
        }
        _ if own_reply => Ok(Vec::new()),
        ROOM_JOIN | ROOM_PART => Ok(engine.apply_presence(field::<usize>(frame, "participant_count")?)),
        ROOM_DELETED => {
            let room_id = frame
                .room_id
                .as_deref()
                .or_else(|| frame.str_field("room_id"))
                .ok_or(SyncError::MissingField("room_id"))?;
            Ok(engine.room_deleted(room_id))
        }
        ROOM_SETTINGS => Ok(engine.apply_settings(field::<GridSettings>(frame, "settings")?)),
        CELL_SET => {
            let key = frame.str_field("cell").ok_or(SyncError::MissingField("cell"))?;
            let Ok(cell) = key.parse::<CellKey>() else {
                return Err(SyncError::MissingField("cell"));
            };
            Ok(engine.apply_remote_cell(cell, field::<Cell>(frame, "value")?))
        }
        STROKES_SET => Ok(engine.apply_remote_strokes(field::<CellStrokes>(frame, "strokes")?)),
        CLUE_SET => Ok(engine.apply_remote_marks(field::<BTreeSet<String>>(frame, "marked")?)),
        DRAWING_SET => Ok(engine.apply_remote_drawing(field::<Vec<Stroke>>(frame, "strokes")?)),
        _ => Ok(Vec::new()),
    }
}

fn field<T: DeserializeOwned>(frame: &Frame, key: &'static str) -> Result<T, SyncError> {
    let value = frame.data.get(key).ok_or(SyncError::MissingField(key))?;
    Ok(T::deserialize(value)?)
}
