//! WebSocket handler: bidirectional frame relay.
//!
//! DESIGN
//! ======
//! On upgrade, generates a client ID and enters a `select!` loop:
//! - Incoming client frames → parse + dispatch by syscall prefix
//! - Broadcast frames from room peers → forward to client
//!
//! Handler functions are pure business logic: they validate, mutate state,
//! and return an `Outcome`. The dispatch layer owns all outbound concerns:
//! reply to sender and broadcast to peers.
//!
//! LIFECYCLE
//! =========
//! 1. Upgrade → send `session:connected` with `client_id`
//! 2. Client sends frames → dispatch → handler returns Outcome
//! 3. Dispatch applies Outcome (reply / broadcast / both)
//! 4. Close → part room → peers get `room:part` with the new count
//!
//! Clients may speak JSON text frames or protobuf binary frames; replies and
//! forwarded broadcasts use whichever encoding the client sent last.

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use frames::{Data, ErrorCode, Frame, Status};
use grid::doc::{CellKey, CellStrokes, GridSettings, Stroke};
use serde::de::DeserializeOwned;
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::services;
use crate::services::puzzle::CellWrite;
use crate::state::AppState;

// =============================================================================
// OUTCOME
// =============================================================================

/// Result returned by handler functions. The dispatch layer uses this to
/// decide who receives what; handlers never send frames directly.
#[derive(Debug)]
enum Outcome {
    /// Send done+data to the sender and a copy (no `parent_id`) to all peers.
    Broadcast(Data),
    /// Send done+data to sender only.
    Reply(Data),
    /// Send empty done to sender only.
    Done,
    /// Reply to sender with one payload, broadcast different data to peers.
    ReplyAndBroadcast { reply: Data, broadcast: Data },
}

/// Protocol-level failures: the frame never reached a service.
#[derive(Debug, thiserror::Error)]
enum ProtocolError {
    #[error("{0} required")]
    MissingField(&'static str),
    #[error("invalid {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },
    #[error("must join a room first")]
    NotJoined,
    #[error("unknown syscall: {0}")]
    UnknownSyscall(String),
}

impl ErrorCode for ProtocolError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::MissingField(_) => "E_MISSING_FIELD",
            Self::InvalidField { .. } => "E_INVALID_FIELD",
            Self::NotJoined => "E_NOT_JOINED",
            Self::UnknownSyscall(_) => "E_UNKNOWN_SYSCALL",
        }
    }
}

/// Encoding a client last spoke.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WireFormat {
    Json,
    Binary,
}

// =============================================================================
// UPGRADE
// =============================================================================

pub async fn handle_ws(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| run_ws(socket, state))
}

// =============================================================================
// CONNECTION
// =============================================================================

async fn run_ws(mut socket: WebSocket, state: AppState) {
    let client_id = Uuid::new_v4();

    // Per-connection channel for receiving broadcast frames from peers.
    let (client_tx, mut client_rx) = mpsc::channel::<Frame>(state.client_channel_capacity);
    let mut format = WireFormat::Json;

    let welcome = Frame::request("session:connected", Data::new()).with_data("client_id", client_id.to_string());
    if send_frame(&mut socket, &welcome, format).await.is_err() {
        return;
    }

    info!(%client_id, "ws: client connected");

    // Room this client has joined.
    let mut current_room: Option<String> = None;

    loop {
        tokio::select! {
            msg = socket.recv() => {
                let Some(Ok(msg)) = msg else { break };
                let replies = match msg {
                    Message::Text(text) => {
                        format = WireFormat::Json;
                        process_inbound_text(&state, &mut current_room, client_id, &client_tx, &text).await
                    }
                    Message::Binary(bytes) => {
                        format = WireFormat::Binary;
                        process_inbound_bytes(&state, &mut current_room, client_id, &client_tx, &bytes).await
                    }
                    Message::Close(_) => break,
                    _ => continue,
                };
                for frame in replies {
                    if send_frame(&mut socket, &frame, format).await.is_err() {
                        break;
                    }
                }
            }
            Some(frame) = client_rx.recv() => {
                if send_frame(&mut socket, &frame, format).await.is_err() {
                    break;
                }
            }
        }
    }

    if let Some(code) = current_room.take() {
        leave_room(&state, &code, client_id).await;
    }
    info!(%client_id, "ws: client disconnected");
}

// =============================================================================
// FRAME DISPATCH
// =============================================================================

/// Parse and process one inbound JSON frame and return frames for the sender.
async fn process_inbound_text(
    state: &AppState,
    current_room: &mut Option<String>,
    client_id: Uuid,
    client_tx: &mpsc::Sender<Frame>,
    text: &str,
) -> Vec<Frame> {
    match frames::decode_json(text) {
        Ok(req) => process_frame(state, current_room, client_id, client_tx, req).await,
        Err(e) => {
            warn!(%client_id, error = %e, "ws: invalid inbound frame");
            vec![gateway_error(&e)]
        }
    }
}

/// Parse and process one inbound protobuf frame and return frames for the sender.
async fn process_inbound_bytes(
    state: &AppState,
    current_room: &mut Option<String>,
    client_id: Uuid,
    client_tx: &mpsc::Sender<Frame>,
    bytes: &[u8],
) -> Vec<Frame> {
    match frames::decode_frame(bytes) {
        Ok(req) => process_frame(state, current_room, client_id, client_tx, req).await,
        Err(e) => {
            warn!(%client_id, error = %e, "ws: invalid inbound frame");
            vec![gateway_error(&e)]
        }
    }
}

fn gateway_error(err: &frames::CodecError) -> Frame {
    let mut data = Data::new();
    data.insert(frames::FRAME_CODE.into(), serde_json::json!(err.error_code()));
    data.insert(frames::FRAME_MESSAGE.into(), serde_json::json!(err.to_string()));
    data.insert(frames::FRAME_RETRYABLE.into(), serde_json::json!(err.retryable()));
    let mut frame = Frame::request("gateway:error", data);
    frame.status = Status::Error;
    frame
}

/// Dispatch to a handler and apply its outcome.
async fn process_frame(
    state: &AppState,
    current_room: &mut Option<String>,
    client_id: Uuid,
    client_tx: &mpsc::Sender<Frame>,
    mut req: Frame,
) -> Vec<Frame> {
    // Stamp the connection as the origin.
    req.from = Some(client_id.to_string());
    info!(%client_id, id = %req.id, syscall = %req.syscall, status = ?req.status, "ws: recv frame");

    let result = match req.prefix() {
        "room" => handle_room(state, current_room, client_id, client_tx, &req).await,
        "cell" | "strokes" | "clue" | "drawing" => handle_puzzle(state, current_room.as_deref(), &req).await,
        _ => Err(req.error_from(&ProtocolError::UnknownSyscall(req.syscall.clone()))),
    };

    // Apply outcome: the dispatch layer owns all outbound logic.
    let room_id = current_room.clone();
    match result {
        Ok(Outcome::Broadcast(data)) => {
            let sender_frame = req.done_with(data);
            if let Some(code) = room_id {
                // Peers get a copy without parent_id (they didn't originate the request).
                let mut peer_frame = sender_frame.clone().with_room_id(code.clone());
                peer_frame.id = Uuid::new_v4().to_string();
                peer_frame.parent_id = None;
                services::room::broadcast(state, &code, &peer_frame, Some(client_id)).await;
            }
            vec![sender_frame]
        }
        Ok(Outcome::Reply(data)) => vec![req.done_with(data)],
        Ok(Outcome::Done) => vec![req.done()],
        Ok(Outcome::ReplyAndBroadcast { reply, broadcast }) => {
            let sender_frame = req.done_with(reply);
            if let Some(code) = room_id {
                let notice = Frame::request(req.syscall.clone(), broadcast).with_room_id(code.clone());
                services::room::broadcast(state, &code, &notice, Some(client_id)).await;
            }
            vec![sender_frame]
        }
        Err(err_frame) => vec![err_frame],
    }
}

// =============================================================================
// ROOM HANDLERS
// =============================================================================

async fn handle_room(
    state: &AppState,
    current_room: &mut Option<String>,
    client_id: Uuid,
    client_tx: &mpsc::Sender<Frame>,
    req: &Frame,
) -> Result<Outcome, Frame> {
    match req.op() {
        "create" => {
            let image_url = req
                .str_field("image_url")
                .ok_or_else(|| req.error_from(&ProtocolError::MissingField("image_url")))?;
            let settings: GridSettings = optional_field(req, "settings")?.unwrap_or_default();
            let room = services::room::create_room(state, image_url, settings)
                .await
                .map_err(|e| req.error_from(&e))?;
            Ok(Outcome::Reply(room_data(&room)))
        }
        "join" => {
            let raw = req
                .room_id
                .as_deref()
                .or_else(|| req.str_field("room_id"))
                .ok_or_else(|| req.error_from(&ProtocolError::MissingField("room_id")))?;
            let code = services::room::normalize_room_code(raw).map_err(|e| req.error_from(&e))?;

            // Part current room if already joined.
            if let Some(old) = current_room.take() {
                leave_room(state, &old, client_id).await;
            }

            let room = services::room::join_room(state, &code, client_id, client_tx.clone())
                .await
                .map_err(|e| req.error_from(&e))?;
            *current_room = Some(code);

            let broadcast = presence_data(client_id, room.participant_count);
            Ok(Outcome::ReplyAndBroadcast { reply: room_data(&room), broadcast })
        }
        "part" => {
            if let Some(code) = current_room.take() {
                leave_room(state, &code, client_id).await;
            }
            Ok(Outcome::Done)
        }
        "settings" => {
            let code = joined(current_room.as_deref(), req)?;
            let settings: GridSettings = required_field(req, "settings")?;
            let applied = services::puzzle::apply_settings(state, code, settings)
                .await
                .map_err(|e| req.error_from(&e))?;
            Ok(Outcome::Broadcast(single("settings", &applied)))
        }
        op => Err(req.error_from(&ProtocolError::UnknownSyscall(format!("room:{op}")))),
    }
}

/// Part a room and tell remaining peers.
async fn leave_room(state: &AppState, code: &str, client_id: Uuid) {
    let remaining = services::room::part_room(state, code, client_id).await;
    if remaining > 0 {
        let notice = Frame::request("room:part", presence_data(client_id, remaining)).with_room_id(code);
        services::room::broadcast(state, code, &notice, Some(client_id)).await;
    }
}

// =============================================================================
// PUZZLE HANDLERS
// =============================================================================

async fn handle_puzzle(state: &AppState, current_room: Option<&str>, req: &Frame) -> Result<Outcome, Frame> {
    let code = joined(current_room, req)?;
    if req.op() != "set" {
        return Err(req.error_from(&ProtocolError::UnknownSyscall(req.syscall.clone())));
    }

    let data = match req.prefix() {
        "cell" => {
            let key = req
                .str_field("cell")
                .ok_or_else(|| req.error_from(&ProtocolError::MissingField("cell")))?
                .parse::<CellKey>()
                .map_err(|e| req.error_from(&e))?;
            let write: CellWrite = required_field(req, "value")?;
            let cell = services::puzzle::set_cell(state, code, key, write)
                .await
                .map_err(|e| req.error_from(&e))?;
            let mut data = single("value", &cell);
            data.insert("cell".into(), serde_json::json!(key.to_string()));
            data
        }
        "strokes" => {
            let strokes: CellStrokes = required_field(req, "strokes")?;
            let stored = services::puzzle::set_strokes(state, code, strokes)
                .await
                .map_err(|e| req.error_from(&e))?;
            single("strokes", &stored)
        }
        "clue" => {
            let marked: Vec<String> = required_field(req, "marked")?;
            let stored = services::puzzle::set_marked_clues(state, code, &marked)
                .await
                .map_err(|e| req.error_from(&e))?;
            single("marked", &stored)
        }
        _ => {
            let strokes: Vec<Stroke> = required_field(req, "strokes")?;
            let stored = services::puzzle::set_drawing(state, code, strokes)
                .await
                .map_err(|e| req.error_from(&e))?;
            single("strokes", &stored)
        }
    };
    Ok(Outcome::Broadcast(data))
}

// =============================================================================
// HELPERS
// =============================================================================

fn joined<'a>(current_room: Option<&'a str>, req: &Frame) -> Result<&'a str, Frame> {
    current_room.ok_or_else(|| req.error_from(&ProtocolError::NotJoined))
}

fn required_field<T: DeserializeOwned>(req: &Frame, field: &'static str) -> Result<T, Frame> {
    optional_field(req, field)?.ok_or_else(|| req.error_from(&ProtocolError::MissingField(field)))
}

fn optional_field<T: DeserializeOwned>(req: &Frame, field: &'static str) -> Result<Option<T>, Frame> {
    match req.data.get(field) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(value) => serde_json::from_value(value.clone())
            .map(Some)
            .map_err(|e| req.error_from(&ProtocolError::InvalidField { field, reason: e.to_string() })),
    }
}

fn single(key: &str, value: &impl serde::Serialize) -> Data {
    let mut data = Data::new();
    data.insert(key.into(), serde_json::to_value(value).unwrap_or_default());
    data
}

fn room_data(room: &grid::doc::Room) -> Data {
    single("room", room)
}

fn presence_data(client_id: Uuid, participant_count: usize) -> Data {
    let mut data = Data::new();
    data.insert("client_id".into(), serde_json::json!(client_id));
    data.insert("participant_count".into(), serde_json::json!(participant_count));
    data
}

async fn send_frame(socket: &mut WebSocket, frame: &Frame, format: WireFormat) -> Result<(), ()> {
    if frame.status == Status::Error {
        let code = frame.str_field(frames::FRAME_CODE).unwrap_or("-");
        let message = frame.str_field(frames::FRAME_MESSAGE).unwrap_or("-");
        warn!(id = %frame.id, syscall = %frame.syscall, code, message, "ws: send frame status=Error");
    } else {
        info!(id = %frame.id, syscall = %frame.syscall, status = ?frame.status, "ws: send frame");
    }

    let message = match format {
        WireFormat::Binary => Message::Binary(frames::encode_frame(frame).into()),
        WireFormat::Json => match frames::encode_json(frame) {
            Ok(json) => Message::Text(json.into()),
            Err(e) => {
                warn!(error = %e, "ws: failed to serialize frame");
                return Err(());
            }
        },
    };
    socket.send(message).await.map_err(|_| ())
}

#[cfg(test)]
#[path = "ws_test.rs"]
mod tests;
