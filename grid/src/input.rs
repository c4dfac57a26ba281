//! Input model: tools, keys, the letter cursor, and the gesture state machine.
//!
//! `Tool` captures the user's intent at the time of a pointer event.
//! `InputState` is the gesture tracked between pointer-down and pointer-up;
//! while drawing it carries the cell rect cached at pen-down so layout
//! shifts mid-gesture cannot skew the captured coordinates.

#[cfg(test)]
#[path = "input_test.rs"]
mod input_test;

use serde::{Deserialize, Serialize};

use crate::doc::{CellKey, StrokePoint};
use crate::geom::Rect;

/// Which tool is currently active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tool {
    /// Tap selects a cell; letters come from the keyboard (default).
    #[default]
    Type,
    /// Handwrite into cells.
    Draw,
    /// Tap toggles a cell between open and black.
    Block,
}

/// Mouse button identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Button {
    /// Left mouse button, pen contact, or single-finger touch.
    Primary,
    /// Middle mouse button.
    Middle,
    /// Right mouse button or pen barrel button.
    Secondary,
}

/// A keyboard key.
///
/// The inner string holds the key name as reported by the browser
/// (e.g. `"a"`, `"Backspace"`, `"ArrowLeft"`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Key(pub String);

/// Entry direction for typed letters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Across,
    Down,
}

impl Direction {
    #[must_use]
    pub fn toggled(self) -> Self {
        match self {
            Self::Across => Self::Down,
            Self::Down => Self::Across,
        }
    }

    /// Single-letter suffix used in clue ids.
    #[must_use]
    pub fn suffix(self) -> char {
        match self {
            Self::Across => 'A',
            Self::Down => 'D',
        }
    }
}

/// The selected cell and the direction letters advance in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    pub cell: CellKey,
    pub direction: Direction,
}

/// Persistent UI state visible to the host.
#[derive(Debug, Clone, Default)]
pub struct UiState {
    /// Currently active tool.
    pub tool: Tool,
    /// Letter cursor, if a cell is selected.
    pub cursor: Option<Cursor>,
}

/// Internal state for the input state machine.
#[derive(Debug, Clone, Default)]
pub enum InputState {
    /// No gesture in progress; waiting for the next pointer-down.
    #[default]
    Idle,
    /// A stroke is being drawn into one cell.
    Drawing {
        /// Cell the stroke started in. The whole stroke belongs to it.
        cell: CellKey,
        /// Cell rect captured at pen-down, in CSS pixels.
        rect: Rect,
        /// Points captured so far, in cell percentages.
        points: Vec<StrokePoint>,
    },
}

impl InputState {
    /// Cell currently being drawn into, if any.
    #[must_use]
    pub fn drawing_cell(&self) -> Option<CellKey> {
        match self {
            Self::Idle => None,
            Self::Drawing { cell, .. } => Some(*cell),
        }
    }
}
