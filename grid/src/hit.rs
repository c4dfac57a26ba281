#[cfg(test)]
#[path = "hit_test.rs"]
mod hit_test;

use crate::doc::{Cell, CellKey};
use crate::geom::{GridLayout, Point, Rect};

/// Result of a hit test against the grid overlay.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hit {
    pub cell: CellKey,
    /// Cell bounds in CSS pixels at the time of the hit.
    pub rect: Rect,
    /// The cell is black and takes no input.
    pub blocked: bool,
}

/// Resolve which cell (if any) is under `screen_pt`.
#[must_use]
pub fn hit_test(screen_pt: Point, layout: &GridLayout, grid: &[Vec<Cell>]) -> Option<Hit> {
    let cell = layout.cell_at(screen_pt)?;
    let state = grid.get(cell.row).and_then(|row| row.get(cell.col))?;
    Some(Hit { cell, rect: layout.cell_rect(cell), blocked: state.is_black })
}
