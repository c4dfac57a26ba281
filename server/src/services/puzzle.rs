//! Puzzle service: cell, stroke, clue, drawing, and settings writes.
//!
//! DESIGN
//! ======
//! Every write replaces one slice of a live room's document under the rooms
//! lock, bumps the room revision for debounced persistence, and returns the
//! canonical value for broadcast. Writes are applied in arrival order (last
//! writer wins); cell timestamps come from the server clock so peers with
//! skewed clocks still agree on ordering.

use std::collections::BTreeSet;

use frames::{ErrorCode, now_ms};
use grid::doc::{Cell, CellKey, CellStrokes, DocError, GridSettings, Room, Stroke, normalize_letter, validate_cell_strokes};
use grid::numbering::{ClueId, InvalidClueId};
use serde::Deserialize;

use crate::state::AppState;

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum PuzzleError {
    #[error("room not loaded: {0}")]
    RoomNotLoaded(String),
    #[error(transparent)]
    Doc(#[from] DocError),
    #[error(transparent)]
    Clue(#[from] InvalidClueId),
}

impl ErrorCode for PuzzleError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::RoomNotLoaded(_) => "E_ROOM_NOT_LOADED",
            Self::Doc(e) => e.error_code(),
            Self::Clue(_) => "E_INVALID_CLUE",
        }
    }
}

/// Client-supplied cell value. Any timestamp the client sends is ignored.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct CellWrite {
    #[serde(default)]
    pub letter: Option<char>,
    #[serde(default)]
    pub is_black: bool,
}

// =============================================================================
// WRITES
// =============================================================================

/// Overwrite one cell. Black cells drop their letter and strokes.
///
/// # Errors
///
/// Returns `RoomNotLoaded`, an out-of-bounds cell, or a non-letter.
pub async fn set_cell(state: &AppState, code: &str, key: CellKey, write: CellWrite) -> Result<Cell, PuzzleError> {
    let letter = match write.letter {
        Some(c) if !write.is_black => Some(normalize_letter(c)?),
        _ => None,
    };
    mutate(state, code, |room| {
        let previous = room.cell(key).map_or(0, |c| c.timestamp);
        let cell = Cell { letter, is_black: write.is_black, timestamp: now_ms().max(previous + 1) };
        room.set_cell(key, cell)?;
        Ok(cell)
    })
    .await
}

/// Replace the whole per-cell stroke map. Strokes on black cells are dropped.
///
/// # Errors
///
/// Returns `RoomNotLoaded` or the first invalid key or stroke.
pub async fn set_strokes(state: &AppState, code: &str, mut strokes: CellStrokes) -> Result<CellStrokes, PuzzleError> {
    mutate(state, code, |room| {
        validate_cell_strokes(&strokes, &room.settings)?;
        strokes.retain(|key, list| !list.is_empty() && !room.cell(*key).is_some_and(|c| c.is_black));
        room.cell_strokes = strokes;
        Ok(room.cell_strokes.clone())
    })
    .await
}

/// Replace the set of marked clues. Ids are stored canonically (`12A`).
///
/// # Errors
///
/// Returns `RoomNotLoaded` or the first malformed clue id.
pub async fn set_marked_clues(state: &AppState, code: &str, marked: &[String]) -> Result<BTreeSet<String>, PuzzleError> {
    let canonical = marked
        .iter()
        .map(|raw| raw.parse::<ClueId>().map(|id| id.to_string()))
        .collect::<Result<BTreeSet<_>, _>>()?;
    mutate(state, code, |room| {
        room.marked_clues.clone_from(&canonical);
        Ok(canonical)
    })
    .await
}

/// Replace the freehand strokes drawn over the whole image.
///
/// # Errors
///
/// Returns `RoomNotLoaded` or the first invalid stroke.
pub async fn set_drawing(state: &AppState, code: &str, strokes: Vec<Stroke>) -> Result<Vec<Stroke>, PuzzleError> {
    for stroke in &strokes {
        stroke.validate()?;
    }
    mutate(state, code, |room| {
        room.shared_strokes.clone_from(&strokes);
        Ok(strokes)
    })
    .await
}

/// Replace grid settings, resizing the grid and pruning strokes.
///
/// # Errors
///
/// Returns `RoomNotLoaded` or invalid settings.
pub async fn apply_settings(state: &AppState, code: &str, settings: GridSettings) -> Result<GridSettings, PuzzleError> {
    mutate(state, code, |room| {
        room.apply_settings(settings)?;
        Ok(room.settings)
    })
    .await
}

/// Run `apply` on a live room; on success the room is marked dirty.
async fn mutate<T, F>(state: &AppState, code: &str, apply: F) -> Result<T, PuzzleError>
where
    F: FnOnce(&mut Room) -> Result<T, PuzzleError>,
{
    let mut rooms = state.rooms.write().await;
    let room_state = rooms
        .get_mut(code)
        .ok_or_else(|| PuzzleError::RoomNotLoaded(code.to_owned()))?;
    let out = apply(&mut room_state.room)?;
    room_state.touch();
    Ok(out)
}

#[cfg(test)]
#[path = "puzzle_test.rs"]
mod tests;
