//! Per-cell stroke buffer with debounced sync and remote reconciliation.
//!
//! A drawing *session* starts at pen-down and lasts until the debounce
//! deadline fires (or undo/redo pushes state early). Several pen lifts inside
//! one session are one logical edit: each lift re-arms the deadline, and only
//! when it passes is the full stroke map handed back for syncing.
//!
//! Remote stroke maps that arrive during a session are parked, never applied,
//! so nothing under the user's pen is erased or redrawn. When the session
//! ends the parked map is applied, adopting only cells where the remote holds
//! more strokes than we do. Outside a session the remote map is authoritative.

#[cfg(test)]
#[path = "strokes_test.rs"]
mod strokes_test;

use std::collections::BTreeSet;

use crate::consts::MAX_STROKES_PER_CELL;
use crate::doc::{CellKey, CellStrokes, Stroke};

/// Result of a debounce deadline passing.
#[derive(Debug, Clone, PartialEq)]
pub struct Flush {
    /// Full local stroke map to push to the shared store.
    pub strokes: CellStrokes,
    /// Cells that received strokes during the session.
    pub touched: BTreeSet<CellKey>,
    /// Cells redrawn because parked remote state was applied.
    pub redraw: Vec<CellKey>,
}

/// Local stroke state for every cell plus the sync bookkeeping around it.
#[derive(Debug, Clone, Default)]
pub struct StrokeStore {
    cells: CellStrokes,
    redo: Vec<(CellKey, Stroke)>,
    pending_flush_at: Option<i64>,
    session_active: bool,
    parked_remote: Option<CellStrokes>,
    touched: BTreeSet<CellKey>,
}

impl StrokeStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // --- Queries ---

    /// Strokes of one cell, oldest first.
    #[must_use]
    pub fn strokes(&self, cell: CellKey) -> &[Stroke] {
        self.cells.get(&cell).map_or(&[], Vec::as_slice)
    }

    /// The full local stroke map.
    #[must_use]
    pub fn all(&self) -> &CellStrokes {
        &self.cells
    }

    #[must_use]
    pub fn is_session_active(&self) -> bool {
        self.session_active
    }

    #[must_use]
    pub fn pending_flush_at(&self) -> Option<i64> {
        self.pending_flush_at
    }

    #[must_use]
    pub fn has_parked_remote(&self) -> bool {
        self.parked_remote.is_some()
    }

    #[must_use]
    pub fn can_undo(&self) -> bool {
        !self.cells.is_empty()
    }

    #[must_use]
    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    /// Whether the cell already holds the most strokes the store accepts.
    #[must_use]
    pub fn is_full(&self, cell: CellKey) -> bool {
        self.strokes(cell).len() >= MAX_STROKES_PER_CELL
    }

    // --- Snapshot ---

    /// Replace everything with a server snapshot. Drops history and parked state.
    pub fn load(&mut self, strokes: CellStrokes) {
        *self = Self { cells: strokes, ..Self::default() };
    }

    // --- Local capture ---

    /// Mark the start of a gesture.
    pub fn begin_session(&mut self) {
        self.session_active = true;
    }

    /// Keep a finished stroke. Returns the new debounce deadline, or `None`
    /// when the stroke was discarded: too short, or the cell is full.
    pub fn commit(&mut self, cell: CellKey, stroke: Stroke, now_ms: i64, debounce_ms: i64) -> Option<i64> {
        if !stroke.is_persistable() || self.is_full(cell) {
            return None;
        }
        self.cells.entry(cell).or_default().push(stroke);
        self.redo.clear();
        self.touched.insert(cell);
        self.session_active = true;
        let deadline = now_ms.saturating_add(debounce_ms);
        self.pending_flush_at = Some(deadline);
        Some(deadline)
    }

    /// Close a gesture that produced nothing to keep. If no flush is pending
    /// the session is over and parked remote state is applied; returns the
    /// cells that need a redraw. With a flush pending the session goes on and
    /// the caller must re-arm the host timer from [`StrokeStore::pending_flush_at`].
    pub fn abandon_gesture(&mut self) -> Vec<CellKey> {
        if self.pending_flush_at.is_some() {
            return Vec::new();
        }
        self.end_session()
    }

    /// Fire the debounce deadline if it has passed.
    pub fn flush_due(&mut self, now_ms: i64) -> Option<Flush> {
        let deadline = self.pending_flush_at?;
        if now_ms < deadline {
            return None;
        }
        let strokes = self.cells.clone();
        let touched = self.take_touched();
        let redraw = self.end_session();
        Some(Flush { strokes, touched, redraw })
    }

    /// Remove every stroke from a cell. Returns false if it had none.
    pub fn clear_cell(&mut self, cell: CellKey) -> bool {
        self.redo.retain(|(c, _)| *c != cell);
        self.cells.remove(&cell).is_some()
    }

    /// Drop strokes (and redo entries) for cells outside a resized grid.
    pub fn retain_within(&mut self, rows: usize, cols: usize) {
        let inside = |c: &CellKey| c.row < rows && c.col < cols;
        self.cells.retain(|c, _| inside(c));
        self.redo.retain(|(c, _)| inside(c));
        self.touched.retain(|c| inside(c));
    }

    // --- Undo / redo ---

    /// Remove the most recent stroke across all cells (by its last point's
    /// timestamp). Cancels any pending flush and ends the session.
    pub fn undo(&mut self) -> Option<CellKey> {
        let cell = self
            .cells
            .iter()
            .filter_map(|(cell, list)| list.last().and_then(Stroke::last_timestamp).map(|t| (t, *cell)))
            .max_by_key(|(t, cell)| (*t, *cell))
            .map(|(_, cell)| cell)?;
        let list = self.cells.get_mut(&cell)?;
        let stroke = list.pop()?;
        if list.is_empty() {
            self.cells.remove(&cell);
        }
        self.redo.push((cell, stroke));
        self.cancel_pending();
        Some(cell)
    }

    /// Restore the most recently undone stroke into its cell. A stroke whose
    /// cell has since filled up is dropped.
    pub fn redo(&mut self) -> Option<CellKey> {
        let (cell, stroke) = self.redo.pop()?;
        if self.is_full(cell) {
            return None;
        }
        self.cells.entry(cell).or_default().push(stroke);
        self.cancel_pending();
        Some(cell)
    }

    /// Cells written during the current session, leaving the set empty.
    pub fn take_touched(&mut self) -> BTreeSet<CellKey> {
        std::mem::take(&mut self.touched)
    }

    /// Drop the pending deadline and end the session without applying parked
    /// remote state; callers push local state first, then call
    /// [`StrokeStore::apply_parked`] and [`StrokeStore::take_touched`].
    fn cancel_pending(&mut self) {
        self.pending_flush_at = None;
        self.session_active = false;
    }

    // --- Remote reconciliation ---

    /// Accept the authoritative stroke map from the shared store.
    ///
    /// While a gesture or session is active the map is parked (latest wins)
    /// and nothing is redrawn. Otherwise it replaces local state; returns the
    /// cells whose strokes changed.
    pub fn receive_remote(&mut self, remote: CellStrokes, gesture_active: bool) -> Vec<CellKey> {
        if gesture_active || self.session_active {
            self.parked_remote = Some(remote);
            return Vec::new();
        }
        self.parked_remote = None;
        let changed: Vec<CellKey> = self
            .cells
            .keys()
            .chain(remote.keys())
            .copied()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .filter(|cell| self.cells.get(cell) != remote.get(cell))
            .collect();
        self.cells = remote;
        changed
    }

    /// Apply parked remote state after a session, adopting only cells where
    /// the remote has more strokes than the local copy.
    pub fn apply_parked(&mut self) -> Vec<CellKey> {
        let Some(remote) = self.parked_remote.take() else {
            return Vec::new();
        };
        let mut redraw = Vec::new();
        for (cell, list) in remote {
            if list.len() > self.strokes(cell).len() {
                self.cells.insert(cell, list);
                redraw.push(cell);
            }
        }
        redraw
    }

    fn end_session(&mut self) -> Vec<CellKey> {
        self.pending_flush_at = None;
        self.session_active = false;
        self.apply_parked()
    }
}
