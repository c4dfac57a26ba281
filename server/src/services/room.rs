//! Room service: codes, create/join/part, hydration, and broadcast.
//!
//! DESIGN
//! ======
//! Rooms are created in memory and marked dirty so the persistence task
//! writes them. A room that is not in memory is hydrated from Postgres on
//! first join and kept while any client is connected.
//!
//! ERROR HANDLING
//! ==============
//! On last-client part, a dirty room is flushed before eviction. If that
//! flush fails, the room stays in memory with its dirty flag intact so the
//! persistence task can retry instead of losing edits.
//!
//! Deleting a room records a tombstone before the row is removed. Every
//! snapshot write goes through [`persist_room`], which checks the tombstone
//! after the upsert and deletes the row again if the room is gone.

use frames::{Data, ErrorCode, Frame, now_ms};
use grid::doc::{CellStrokes, DocError, GridSettings, Room, Stroke};
use rand::Rng;
use sqlx::PgPool;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::state::{AppState, RoomState};

/// Length of a room code.
pub const ROOM_CODE_LEN: usize = 6;

const ROOM_CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const MAX_CODE_ATTEMPTS: usize = 16;

/// Syscall pushed to participants when their room is deleted.
pub const ROOM_DELETED: &str = "room:deleted";

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    #[error("room not found: {0}")]
    NotFound(String),
    #[error("invalid room code: {0:?}")]
    InvalidCode(String),
    #[error("image url required")]
    MissingImage,
    #[error("invalid room: {0}")]
    Invalid(#[from] DocError),
    #[error("could not allocate a free room code")]
    CodesExhausted,
    #[error("stored room is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl ErrorCode for RoomError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "E_ROOM_NOT_FOUND",
            Self::InvalidCode(_) => "E_INVALID_ROOM_CODE",
            Self::MissingImage => "E_MISSING_IMAGE",
            Self::Invalid(e) => e.error_code(),
            Self::CodesExhausted => "E_ROOM_CODES_EXHAUSTED",
            Self::Corrupt(_) => "E_ROOM_CORRUPT",
            Self::Database(_) => "E_DATABASE",
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::Database(_) | Self::CodesExhausted)
    }
}

// =============================================================================
// CODES
// =============================================================================

/// Generate a random room code from `A-Z0-9`.
pub fn generate_room_code<R: Rng>(rng: &mut R) -> String {
    (0..ROOM_CODE_LEN)
        .map(|_| char::from(ROOM_CODE_ALPHABET[rng.random_range(0..ROOM_CODE_ALPHABET.len())]))
        .collect()
}

/// Trim and uppercase user input, then check it is a well-formed code.
///
/// # Errors
///
/// Returns [`RoomError::InvalidCode`] if the result is not six `A-Z0-9` characters.
pub fn normalize_room_code(raw: &str) -> Result<String, RoomError> {
    let code = raw.trim().to_ascii_uppercase();
    let well_formed = code.len() == ROOM_CODE_LEN && code.bytes().all(|b| ROOM_CODE_ALPHABET.contains(&b));
    if well_formed { Ok(code) } else { Err(RoomError::InvalidCode(raw.to_owned())) }
}

// =============================================================================
// CREATE / READ / DELETE
// =============================================================================

/// Create a room under a fresh code. The room is written by the next
/// persistence sweep.
///
/// # Errors
///
/// Returns an error for an empty image url, invalid settings, or when no
/// free code could be found.
pub async fn create_room(state: &AppState, image_url: &str, settings: GridSettings) -> Result<Room, RoomError> {
    let image_url = image_url.trim();
    if image_url.is_empty() {
        return Err(RoomError::MissingImage);
    }
    settings.validate()?;

    let deleted = state.deleted.read().await;
    let mut rooms = state.rooms.write().await;
    let mut code = None;
    for _ in 0..MAX_CODE_ATTEMPTS {
        let candidate = generate_room_code(&mut rand::rng());
        if !rooms.contains_key(&candidate) && !deleted.contains(&candidate) {
            code = Some(candidate);
            break;
        }
    }
    let code = code.ok_or(RoomError::CodesExhausted)?;

    let room = Room::new(code.clone(), image_url, settings, now_ms());
    let mut room_state = RoomState::new(room.clone());
    room_state.touch();
    rooms.insert(code.clone(), room_state);

    info!(room_id = %code, rows = settings.rows, cols = settings.cols, "room created");
    Ok(room)
}

/// Read a room snapshot, preferring live state over Postgres.
///
/// # Errors
///
/// Returns [`RoomError::NotFound`] when neither has it.
pub async fn get_room(state: &AppState, code: &str) -> Result<Room, RoomError> {
    {
        let rooms = state.rooms.read().await;
        if let Some(room_state) = rooms.get(code) {
            return Ok(room_state.room.clone());
        }
    }
    load_room(&state.pool, code)
        .await?
        .ok_or_else(|| RoomError::NotFound(code.to_owned()))
}

/// Delete a room from memory and Postgres, notifying connected participants.
///
/// # Errors
///
/// Returns [`RoomError::NotFound`] if the room exists nowhere, or a database error.
pub async fn delete_room(state: &AppState, code: &str) -> Result<(), RoomError> {
    // Tombstone first: a flush already in flight must see it after its upsert.
    state.deleted.write().await.insert(code.to_owned());
    let removed = match delete_row(&state.pool, code).await {
        Ok(removed) => removed,
        Err(e) => {
            state.deleted.write().await.remove(code);
            return Err(e);
        }
    };

    let evicted = state.rooms.write().await.remove(code);
    if let Some(room_state) = &evicted {
        let notice = Frame::request(ROOM_DELETED, Data::new())
            .with_room_id(code)
            .with_data("room_id", code);
        for (client_id, tx) in &room_state.clients {
            if tx.try_send(notice.clone()).is_err() {
                debug!(room_id = %code, %client_id, "delete notice dropped");
            }
        }
    }

    if evicted.is_none() && removed == 0 {
        state.deleted.write().await.remove(code);
        return Err(RoomError::NotFound(code.to_owned()));
    }
    info!(room_id = %code, "room deleted");
    Ok(())
}

// =============================================================================
// JOIN / PART
// =============================================================================

/// Join a room. Hydrates from Postgres if the room is not live.
/// Returns the room snapshot including the new participant count.
///
/// # Errors
///
/// Returns [`RoomError::NotFound`] for unknown codes, or a database error.
pub async fn join_room(
    state: &AppState,
    code: &str,
    client_id: Uuid,
    tx: mpsc::Sender<Frame>,
) -> Result<Room, RoomError> {
    if state.is_deleted(code).await {
        return Err(RoomError::NotFound(code.to_owned()));
    }
    let live = state.rooms.read().await.contains_key(code);

    // Fetch outside locks; applied only if nobody hydrated in the meantime.
    let hydrated = if live { None } else { load_room(&state.pool, code).await? };

    let mut rooms = state.rooms.write().await;
    let room_state = match rooms.entry(code.to_owned()) {
        std::collections::hash_map::Entry::Occupied(entry) => entry.into_mut(),
        std::collections::hash_map::Entry::Vacant(entry) => {
            let Some(room) = hydrated else {
                return Err(RoomError::NotFound(code.to_owned()));
            };
            info!(room_id = %code, strokes = grid::doc::stroke_count(&room.cell_strokes), "hydrated room from database");
            entry.insert(RoomState::new(room))
        }
    };

    room_state.clients.insert(client_id, tx);
    room_state.sync_participants();

    info!(room_id = %code, %client_id, clients = room_state.clients.len(), "client joined room");
    Ok(room_state.room.clone())
}

/// Leave a room. If last client, flushes a dirty room and evicts it.
/// Returns the remaining participant count.
pub async fn part_room(state: &AppState, code: &str, client_id: Uuid) -> usize {
    let mut rooms = state.rooms.write().await;
    let Some(room_state) = rooms.get_mut(code) else {
        return 0;
    };

    room_state.clients.remove(&client_id);
    room_state.sync_participants();
    let remaining = room_state.clients.len();
    info!(room_id = %code, %client_id, remaining, "client left room");

    if remaining > 0 {
        return remaining;
    }

    if !room_state.dirty {
        rooms.remove(code);
        info!(room_id = %code, "evicted room from memory");
        return 0;
    }

    // PHASE: SNAPSHOT FOR FINAL FLUSH
    // WHY: write outside the lock; keep the dirty flag until the write lands.
    let snapshot = room_state.room.clone();
    let revision = room_state.revision;
    drop(rooms);
    let flush_result = persist_room(state, &snapshot).await;

    let mut rooms = state.rooms.write().await;
    let Some(room_state) = rooms.get_mut(code) else {
        return 0;
    };
    if !room_state.clients.is_empty() {
        return room_state.clients.len();
    }

    match flush_result {
        Ok(false) => {}
        Ok(true) => {
            if room_state.ack_flush(revision) {
                rooms.remove(code);
                info!(room_id = %code, "evicted room from memory");
            } else {
                warn!(room_id = %code, "retaining room after final flush because newer edits exist");
            }
        }
        Err(e) => {
            error!(error = %e, room_id = %code, "final flush failed; room retained for retry");
        }
    }
    0
}

// =============================================================================
// BROADCAST
// =============================================================================

/// Broadcast a frame to all clients in a room, optionally excluding one.
pub async fn broadcast(state: &AppState, code: &str, frame: &Frame, exclude: Option<Uuid>) {
    let rooms = state.rooms.read().await;
    let Some(room_state) = rooms.get(code) else {
        return;
    };

    for (client_id, tx) in &room_state.clients {
        if exclude == Some(*client_id) {
            continue;
        }
        // Best-effort: a full channel drops the frame for that client.
        if tx.try_send(frame.clone()).is_err() {
            debug!(room_id = %code, %client_id, syscall = %frame.syscall, "broadcast dropped");
        }
    }
}

// =============================================================================
// STORAGE
// =============================================================================

type RoomRow = (
    String,
    String,
    serde_json::Value,
    serde_json::Value,
    serde_json::Value,
    serde_json::Value,
    serde_json::Value,
    i64,
);

/// Load a stored room by code.
///
/// # Errors
///
/// Returns a database error, or [`RoomError::Corrupt`] if a JSON column no
/// longer matches the room shape.
pub async fn load_room(pool: &PgPool, code: &str) -> Result<Option<Room>, RoomError> {
    let row = sqlx::query_as::<_, RoomRow>(
        "SELECT id, image_url, settings, grid, cell_strokes, marked_clues, shared_strokes, created_at \
         FROM rooms WHERE id = $1",
    )
    .bind(code)
    .fetch_optional(pool)
    .await?;

    let Some((id, image_url, settings, grid, cell_strokes, marked_clues, shared_strokes, created_at)) = row else {
        return Ok(None);
    };

    let settings: GridSettings = serde_json::from_value(settings)?;
    let mut room = Room::new(id, image_url, settings, created_at);
    room.grid = serde_json::from_value(grid)?;
    room.cell_strokes = serde_json::from_value::<CellStrokes>(cell_strokes)?;
    room.marked_clues = serde_json::from_value(marked_clues)?;
    room.shared_strokes = serde_json::from_value::<Vec<Stroke>>(shared_strokes)?;
    // A stored grid that disagrees with its settings is reshaped, not rejected.
    grid::doc::resize_grid(&mut room.grid, settings.rows, settings.cols);
    Ok(Some(room))
}

/// Write a room snapshot unless the room was deleted. Returns false when the
/// snapshot belongs to a deleted room and nothing was kept.
///
/// # Errors
///
/// Returns a database or serialization error from the write.
pub async fn persist_room(state: &AppState, room: &Room) -> Result<bool, RoomError> {
    if state.is_deleted(&room.id).await {
        debug!(room_id = %room.id, "skipped flush of deleted room");
        return Ok(false);
    }
    flush_room(&state.pool, room).await?;
    // EDGE: the room may have been deleted while the upsert was in flight.
    if state.is_deleted(&room.id).await {
        delete_row(&state.pool, &room.id).await?;
        warn!(room_id = %room.id, "removed row written after room deletion");
        return Ok(false);
    }
    Ok(true)
}

async fn delete_row(pool: &PgPool, code: &str) -> Result<u64, RoomError> {
    let done = sqlx::query("DELETE FROM rooms WHERE id = $1").bind(code).execute(pool).await?;
    Ok(done.rows_affected())
}

/// Upsert a room row.
///
/// # Errors
///
/// Returns a database error, or [`RoomError::Corrupt`] if serialization fails.
pub async fn flush_room(pool: &PgPool, room: &Room) -> Result<(), RoomError> {
    sqlx::query(
        "INSERT INTO rooms (id, image_url, settings, grid, cell_strokes, marked_clues, shared_strokes, created_at, updated_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, now()) \
         ON CONFLICT (id) DO UPDATE SET \
             settings = EXCLUDED.settings, grid = EXCLUDED.grid, cell_strokes = EXCLUDED.cell_strokes, \
             marked_clues = EXCLUDED.marked_clues, shared_strokes = EXCLUDED.shared_strokes, updated_at = now()",
    )
    .bind(&room.id)
    .bind(&room.image_url)
    .bind(serde_json::to_value(room.settings)?)
    .bind(serde_json::to_value(&room.grid)?)
    .bind(serde_json::to_value(&room.cell_strokes)?)
    .bind(serde_json::to_value(&room.marked_clues)?)
    .bind(serde_json::to_value(&room.shared_strokes)?)
    .bind(room.created_at)
    .execute(pool)
    .await?;
    Ok(())
}

#[cfg(test)]
#[path = "room_test.rs"]
mod tests;
