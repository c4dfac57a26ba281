//! Document model: strokes, cells, grid settings, and rooms.
//!
//! These types are shared by the browser engine and the server. They are
//! what travels on the wire (JSON inside frame payloads) and what the server
//! persists. A room owns one crossword image reference, the letter grid laid
//! over it, the handwriting strokes captured per cell, and the set of clues
//! participants have marked as done.

#[cfg(test)]
#[path = "doc_test.rs"]
mod doc_test;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::consts::{MAX_GRID_DIM, MAX_POINTS_PER_STROKE, MAX_STROKES_PER_CELL, MIN_STROKE_POINTS};

// =============================================================================
// ERRORS
// =============================================================================

/// Validation failures for document writes.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DocError {
    #[error("cell out of bounds: {row},{col}")]
    OutOfBounds { row: usize, col: usize },
    #[error("invalid letter: {0:?}")]
    InvalidLetter(char),
    #[error("invalid cell key: {0}")]
    InvalidCellKey(String),
    #[error("invalid grid settings: {0}")]
    InvalidSettings(String),
    #[error("stroke has {0} points; at least 2 required")]
    StrokeTooShort(usize),
    #[error("stroke has {0} points; too many to keep")]
    StrokeTooLong(usize),
    #[error("stroke contains a non-finite coordinate")]
    NonFinitePoint,
    #[error("cell {0} has too many strokes")]
    TooManyStrokes(CellKey),
}

impl frames::ErrorCode for DocError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::OutOfBounds { .. } => "E_CELL_OUT_OF_BOUNDS",
            Self::InvalidLetter(_) => "E_INVALID_LETTER",
            Self::InvalidCellKey(_) => "E_INVALID_CELL_KEY",
            Self::InvalidSettings(_) => "E_INVALID_SETTINGS",
            Self::StrokeTooShort(_) | Self::StrokeTooLong(_) | Self::NonFinitePoint => "E_INVALID_STROKE",
            Self::TooManyStrokes(_) => "E_TOO_MANY_STROKES",
        }
    }
}

// =============================================================================
// STROKES
// =============================================================================

/// One captured pen sample. `x`/`y` are percentages of the drawing region,
/// `t` is the capture time in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StrokePoint {
    pub x: f64,
    pub y: f64,
    pub t: i64,
}

impl StrokePoint {
    #[must_use]
    pub fn new(x: f64, y: f64, t: i64) -> Self {
        Self { x, y, t }
    }
}

/// One pen-down to pen-up gesture.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Stroke {
    pub points: Vec<StrokePoint>,
}

impl Stroke {
    #[must_use]
    pub fn new(points: Vec<StrokePoint>) -> Self {
        Self { points }
    }

    /// Whether the stroke has enough points to be kept and synced.
    #[must_use]
    pub fn is_persistable(&self) -> bool {
        self.points.len() >= MIN_STROKE_POINTS
    }

    /// Timestamp of the final point; used to order strokes for undo.
    #[must_use]
    pub fn last_timestamp(&self) -> Option<i64> {
        self.points.last().map(|p| p.t)
    }

    /// Check point count bounds and coordinate sanity.
    ///
    /// # Errors
    ///
    /// Returns the first violated constraint.
    pub fn validate(&self) -> Result<(), DocError> {
        let n = self.points.len();
        if n < MIN_STROKE_POINTS {
            return Err(DocError::StrokeTooShort(n));
        }
        if n > MAX_POINTS_PER_STROKE {
            return Err(DocError::StrokeTooLong(n));
        }
        if self.points.iter().any(|p| !p.x.is_finite() || !p.y.is_finite()) {
            return Err(DocError::NonFinitePoint);
        }
        Ok(())
    }
}

/// Row/column address of a grid cell. On the wire it is the string `"row_col"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellKey {
    pub row: usize,
    pub col: usize,
}

impl CellKey {
    #[must_use]
    pub fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }
}

impl fmt::Display for CellKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.row, self.col)
    }
}

impl FromStr for CellKey {
    type Err = DocError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || DocError::InvalidCellKey(s.to_owned());
        let (row, col) = s.split_once('_').ok_or_else(invalid)?;
        let row = row.parse().map_err(|_| invalid())?;
        let col = col.parse().map_err(|_| invalid())?;
        Ok(Self { row, col })
    }
}

impl Serialize for CellKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for CellKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Strokes captured per cell. Cells without strokes are absent.
pub type CellStrokes = BTreeMap<CellKey, Vec<Stroke>>;

/// Validate a full stroke map against the grid bounds.
///
/// # Errors
///
/// Returns the first out-of-bounds key or invalid stroke.
pub fn validate_cell_strokes(strokes: &CellStrokes, settings: &GridSettings) -> Result<(), DocError> {
    for (key, list) in strokes {
        settings.check_bounds(*key)?;
        if list.len() > MAX_STROKES_PER_CELL {
            return Err(DocError::TooManyStrokes(*key));
        }
        for stroke in list {
            stroke.validate()?;
        }
    }
    Ok(())
}

/// Total number of strokes across all cells.
#[must_use]
pub fn stroke_count(strokes: &CellStrokes) -> usize {
    strokes.values().map(Vec::len).sum()
}

// =============================================================================
// CELLS
// =============================================================================

/// One square of the crossword grid.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cell {
    /// Entered letter, uppercase ASCII.
    pub letter: Option<char>,
    /// Blocked square; takes no letters or strokes.
    pub is_black: bool,
    /// Time of the last write in milliseconds.
    pub timestamp: i64,
}

/// Normalize typed or recognized input into a grid letter.
///
/// # Errors
///
/// Returns [`DocError::InvalidLetter`] for anything other than `A-Z`/`a-z`.
pub fn normalize_letter(c: char) -> Result<char, DocError> {
    if c.is_ascii_alphabetic() {
        Ok(c.to_ascii_uppercase())
    } else {
        Err(DocError::InvalidLetter(c))
    }
}

/// Build an empty `rows × cols` grid.
#[must_use]
pub fn empty_grid(rows: usize, cols: usize) -> Vec<Vec<Cell>> {
    vec![vec![Cell::default(); cols]; rows]
}

/// Resize a grid in place, keeping cells that remain in bounds.
pub fn resize_grid(grid: &mut Vec<Vec<Cell>>, rows: usize, cols: usize) {
    grid.truncate(rows);
    for row in grid.iter_mut() {
        row.resize(cols, Cell::default());
    }
    grid.resize_with(rows, || vec![Cell::default(); cols]);
}

// =============================================================================
// SETTINGS
// =============================================================================

/// Placement of the grid overlay on the crossword image, in percentages.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Overlay {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl Default for Overlay {
    fn default() -> Self {
        Self { left: 0.0, top: 0.0, width: 100.0, height: 100.0 }
    }
}

/// Grid dimensions and overlay placement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridSettings {
    pub rows: usize,
    pub cols: usize,
    #[serde(default)]
    pub overlay: Overlay,
}

impl Default for GridSettings {
    fn default() -> Self {
        Self { rows: 15, cols: 15, overlay: Overlay::default() }
    }
}

impl GridSettings {
    /// Check dimensions and overlay sanity.
    ///
    /// # Errors
    ///
    /// Returns [`DocError::InvalidSettings`] describing the first problem.
    pub fn validate(&self) -> Result<(), DocError> {
        if self.rows == 0 || self.cols == 0 || self.rows > MAX_GRID_DIM || self.cols > MAX_GRID_DIM {
            return Err(DocError::InvalidSettings(format!(
                "grid must be between 1x1 and {MAX_GRID_DIM}x{MAX_GRID_DIM}, got {}x{}",
                self.rows, self.cols
            )));
        }
        let o = self.overlay;
        let finite = [o.left, o.top, o.width, o.height].iter().all(|v| v.is_finite());
        if !finite || o.width <= 0.0 || o.height <= 0.0 {
            return Err(DocError::InvalidSettings("overlay must have a positive finite size".into()));
        }
        Ok(())
    }

    /// Ensure a cell lies inside the grid.
    ///
    /// # Errors
    ///
    /// Returns [`DocError::OutOfBounds`] otherwise.
    pub fn check_bounds(&self, key: CellKey) -> Result<(), DocError> {
        if key.row < self.rows && key.col < self.cols {
            Ok(())
        } else {
            Err(DocError::OutOfBounds { row: key.row, col: key.col })
        }
    }
}

// =============================================================================
// ROOM
// =============================================================================

/// A shared session: one crossword image, its grid state, and participants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Room {
    /// Room code.
    pub id: String,
    /// Reference to the uploaded crossword image.
    pub image_url: String,
    pub settings: GridSettings,
    /// Letter grid, `settings.rows` rows of `settings.cols` cells.
    pub grid: Vec<Vec<Cell>>,
    #[serde(default)]
    pub cell_strokes: CellStrokes,
    #[serde(default)]
    pub marked_clues: BTreeSet<String>,
    /// Freehand strokes over the whole image, coordinates in image percentages.
    #[serde(default)]
    pub shared_strokes: Vec<Stroke>,
    #[serde(default)]
    pub participant_count: usize,
    /// Creation time in milliseconds.
    pub created_at: i64,
}

impl Room {
    /// Create an empty room. Settings are assumed validated.
    #[must_use]
    pub fn new(id: impl Into<String>, image_url: impl Into<String>, settings: GridSettings, created_at: i64) -> Self {
        Self {
            id: id.into(),
            image_url: image_url.into(),
            settings,
            grid: empty_grid(settings.rows, settings.cols),
            cell_strokes: CellStrokes::new(),
            marked_clues: BTreeSet::new(),
            shared_strokes: Vec::new(),
            participant_count: 0,
            created_at,
        }
    }

    /// Read a cell.
    #[must_use]
    pub fn cell(&self, key: CellKey) -> Option<&Cell> {
        self.grid.get(key.row).and_then(|row| row.get(key.col))
    }

    /// Overwrite a cell.
    ///
    /// # Errors
    ///
    /// Returns [`DocError::OutOfBounds`] for cells outside the grid.
    pub fn set_cell(&mut self, key: CellKey, cell: Cell) -> Result<(), DocError> {
        self.settings.check_bounds(key)?;
        let slot = self
            .grid
            .get_mut(key.row)
            .and_then(|row| row.get_mut(key.col))
            .ok_or(DocError::OutOfBounds { row: key.row, col: key.col })?;
        *slot = cell;
        if cell.is_black {
            self.cell_strokes.remove(&key);
        }
        Ok(())
    }

    /// Apply new settings, resizing the grid and dropping strokes that fall outside.
    ///
    /// # Errors
    ///
    /// Returns [`DocError::InvalidSettings`] when the settings are rejected.
    pub fn apply_settings(&mut self, settings: GridSettings) -> Result<(), DocError> {
        settings.validate()?;
        resize_grid(&mut self.grid, settings.rows, settings.cols);
        self.cell_strokes.retain(|key, _| key.row < settings.rows && key.col < settings.cols);
        self.settings = settings;
        Ok(())
    }
}
