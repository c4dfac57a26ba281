use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::consts::{DEFAULT_DEBOUNCE_MS, MAX_POINTS_PER_STROKE};
use crate::doc::{
    Cell, CellKey, CellStrokes, GridSettings, Room, Stroke, StrokePoint, empty_grid, normalize_letter, resize_grid,
};
use crate::geom::{GridLayout, Point, Rect, to_backing, to_percent};
use crate::hit::hit_test;
use crate::input::{Button, Cursor, Direction, InputState, Key, Tool, UiState};
use crate::numbering::{Clue, ClueId, completed_clues, number_grid};
use crate::recognize::{Recognition, Recognizer, RecognizerKind};
use crate::strokes::StrokeStore;

#[cfg(test)]
#[path = "engine_test.rs"]
mod engine_test;

/// Actions returned from input handlers for the host to process.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    /// Draw one line segment of the stroke in progress, in cell-local device pixels.
    DrawSegment { cell: CellKey, from: Point, to: Point },
    /// Re-render every stroke of a cell from [`EngineCore::strokes`].
    RedrawCell { cell: CellKey },
    /// Call [`EngineCore::tick`] at (or after) this time.
    ScheduleFlush { at_ms: i64 },
    /// Push the full stroke map to the shared store.
    SyncStrokes { strokes: CellStrokes },
    /// Write one cell to the shared store.
    SetCell { cell: CellKey, value: Cell },
    /// A handwritten glyph was recognized.
    LetterRecognized { cell: CellKey, recognition: Recognition },
    /// Push the marked clue set to the shared store.
    SetMarkedClues { marked: BTreeSet<String> },
    /// Push the freehand drawing over the whole image to the shared store.
    SyncDrawing { strokes: Vec<Stroke> },
    /// Re-render the freehand drawing from [`EngineCore::shared_strokes`].
    RedrawDrawing,
    /// The number of people in the room changed.
    ParticipantsChanged { count: usize },
    /// The room was deleted; the host should leave it.
    RoomDeleted { room_id: String },
    /// The letter cursor moved or was cleared.
    CursorMoved { cursor: Option<Cursor> },
    /// Letters, numbering, or layout changed; repaint the grid.
    RenderNeeded,
}

/// Engine tuning chosen by the host at construction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Quiet period after the last pen lift before strokes sync.
    pub debounce_ms: i64,
    /// Recognition backend.
    pub recognizer: RecognizerKind,
    /// Write recognized letters into the grid.
    pub auto_fill: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { debounce_ms: DEFAULT_DEBOUNCE_MS, recognizer: RecognizerKind::Disabled, auto_fill: false }
    }
}

/// Core engine state: everything that doesn't depend on the browser.
///
/// Every entry point takes the host clock as `now_ms`; the engine never reads
/// time itself, which keeps it deterministic under test.
pub struct EngineCore {
    pub config: EngineConfig,
    /// Connection id assigned by the server.
    pub client_id: Option<String>,
    pub room_id: Option<String>,
    pub participant_count: usize,
    pub settings: GridSettings,
    pub cells: Vec<Vec<Cell>>,
    pub marked_clues: BTreeSet<String>,
    /// Freehand strokes over the whole image, not tied to a cell.
    pub shared_strokes: Vec<Stroke>,
    pub strokes: StrokeStore,
    pub ui: UiState,
    pub input: InputState,
    pub image_rect: Option<Rect>,
    pub dpr: f64,
    recognizer: Option<Box<dyn Recognizer>>,
}

impl Default for EngineCore {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl EngineCore {
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        let settings = GridSettings::default();
        Self {
            config,
            client_id: None,
            room_id: None,
            participant_count: 0,
            settings,
            cells: empty_grid(settings.rows, settings.cols),
            marked_clues: BTreeSet::new(),
            shared_strokes: Vec::new(),
            strokes: StrokeStore::new(),
            ui: UiState::default(),
            input: InputState::default(),
            image_rect: None,
            dpr: 1.0,
            recognizer: None,
        }
    }

    /// Install the recognition backend built from `config.recognizer`.
    pub fn set_recognizer(&mut self, recognizer: Option<Box<dyn Recognizer>>) {
        self.recognizer = recognizer;
    }

    // --- Data inputs ---

    /// Hydrate from a room snapshot. Discards any local gesture and history.
    pub fn load_room(&mut self, room: Room) -> Vec<Action> {
        self.room_id = Some(room.id);
        self.settings = room.settings;
        self.cells = room.grid;
        resize_grid(&mut self.cells, self.settings.rows, self.settings.cols);
        self.marked_clues = room.marked_clues;
        self.shared_strokes = room.shared_strokes;
        self.participant_count = room.participant_count;
        self.strokes.load(room.cell_strokes);
        self.input = InputState::Idle;
        self.ui.cursor = None;
        vec![
            Action::CursorMoved { cursor: None },
            Action::RenderNeeded,
            Action::RedrawDrawing,
            Action::ParticipantsChanged { count: self.participant_count },
        ]
    }

    /// Remember the id the server gave this connection.
    pub fn set_client_id(&mut self, client_id: impl Into<String>) {
        self.client_id = Some(client_id.into());
    }

    /// Someone joined or left; `count` is the room's new head count.
    pub fn apply_presence(&mut self, count: usize) -> Vec<Action> {
        if count == self.participant_count {
            return Vec::new();
        }
        self.participant_count = count;
        vec![Action::ParticipantsChanged { count }]
    }

    /// The room was deleted on the server. Drops the room and any unsynced
    /// state so nothing more is written to it.
    pub fn room_deleted(&mut self, room_id: &str) -> Vec<Action> {
        if self.room_id.as_deref() != Some(room_id) {
            return Vec::new();
        }
        self.room_id = None;
        self.participant_count = 0;
        self.strokes.load(CellStrokes::new());
        self.input = InputState::Idle;
        vec![Action::RoomDeleted { room_id: room_id.to_owned() }]
    }

    /// Apply new grid settings from the store.
    pub fn apply_settings(&mut self, settings: GridSettings) -> Vec<Action> {
        if settings.validate().is_err() {
            return Vec::new();
        }
        self.settings = settings;
        resize_grid(&mut self.cells, settings.rows, settings.cols);
        self.strokes.retain_within(settings.rows, settings.cols);
        if let InputState::Drawing { cell, .. } = &self.input {
            if settings.check_bounds(*cell).is_err() {
                self.input = InputState::Idle;
            }
        }
        let mut actions = Vec::new();
        if self.ui.cursor.is_some_and(|c| settings.check_bounds(c.cell).is_err()) {
            self.ui.cursor = None;
            actions.push(Action::CursorMoved { cursor: None });
        }
        actions.push(Action::RenderNeeded);
        actions
    }

    /// Apply a remote cell write. Last write observed wins.
    pub fn apply_remote_cell(&mut self, cell: CellKey, value: Cell) -> Vec<Action> {
        let Some(slot) = self.cells.get_mut(cell.row).and_then(|row| row.get_mut(cell.col)) else {
            return Vec::new();
        };
        *slot = value;
        let mut actions = vec![Action::RenderNeeded];
        // The cell under the pen keeps its strokes until the gesture ends.
        if value.is_black && self.input.drawing_cell() != Some(cell) && self.strokes.clear_cell(cell) {
            actions.push(Action::RedrawCell { cell });
        }
        actions
    }

    /// Apply the authoritative stroke map from the store.
    pub fn apply_remote_strokes(&mut self, remote: CellStrokes) -> Vec<Action> {
        let gesture_active = self.input.drawing_cell().is_some();
        self.strokes
            .receive_remote(remote, gesture_active)
            .into_iter()
            .map(|cell| Action::RedrawCell { cell })
            .collect()
    }

    /// Apply the marked clue set from the store.
    pub fn apply_remote_marks(&mut self, marked: BTreeSet<String>) -> Vec<Action> {
        self.marked_clues = marked;
        vec![Action::RenderNeeded]
    }

    /// Apply the freehand drawing from the store.
    pub fn apply_remote_drawing(&mut self, strokes: Vec<Stroke>) -> Vec<Action> {
        if strokes == self.shared_strokes {
            return Vec::new();
        }
        self.shared_strokes = strokes;
        vec![Action::RedrawDrawing]
    }

    /// Replace the freehand drawing locally and push it. Strokes that could
    /// never be stored are dropped first.
    pub fn set_drawing(&mut self, strokes: Vec<Stroke>) -> Vec<Action> {
        self.shared_strokes = strokes.into_iter().filter(|s| s.validate().is_ok()).collect();
        vec![Action::RedrawDrawing, Action::SyncDrawing { strokes: self.shared_strokes.clone() }]
    }

    // --- Tool / viewport ---

    pub fn set_tool(&mut self, tool: Tool) {
        self.ui.tool = tool;
    }

    /// Record where the crossword image is drawn and the device pixel ratio.
    pub fn set_viewport(&mut self, image_rect: Rect, dpr: f64) {
        self.image_rect = Some(image_rect);
        self.dpr = if dpr.is_finite() && dpr > 0.0 { dpr } else { 1.0 };
    }

    /// Current overlay layout, if the viewport is known.
    #[must_use]
    pub fn layout(&self) -> Option<GridLayout> {
        self.image_rect.map(|image| GridLayout::from_image(image, &self.settings))
    }

    // --- Pointer input ---

    pub fn on_pointer_down(&mut self, screen_pt: Point, button: Button, now_ms: i64) -> Vec<Action> {
        if button != Button::Primary || !matches!(self.input, InputState::Idle) {
            return Vec::new();
        }
        let Some(layout) = self.layout() else {
            return Vec::new();
        };
        let Some(hit) = hit_test(screen_pt, &layout, &self.cells) else {
            return Vec::new();
        };

        match self.ui.tool {
            Tool::Draw => {
                if hit.blocked {
                    return Vec::new();
                }
                let Some(pct) = to_percent(screen_pt, hit.rect) else {
                    return Vec::new();
                };
                self.strokes.begin_session();
                self.input = InputState::Drawing {
                    cell: hit.cell,
                    rect: hit.rect,
                    points: vec![StrokePoint::new(pct.x, pct.y, now_ms)],
                };
                Vec::new()
            }
            Tool::Type => {
                if hit.blocked {
                    return Vec::new();
                }
                let direction = match self.ui.cursor {
                    Some(c) if c.cell == hit.cell => c.direction.toggled(),
                    Some(c) => c.direction,
                    None => Direction::Across,
                };
                self.move_cursor(Cursor { cell: hit.cell, direction })
            }
            Tool::Block => self.toggle_black(hit.cell, now_ms),
        }
    }

    pub fn on_pointer_move(&mut self, screen_pt: Point, now_ms: i64) -> Vec<Action> {
        let dpr = self.dpr;
        let InputState::Drawing { cell, rect, points } = &mut self.input else {
            return Vec::new();
        };
        append_point(*cell, *rect, points, screen_pt, now_ms, dpr).into_iter().collect()
    }

    pub fn on_pointer_up(&mut self, screen_pt: Point, button: Button, now_ms: i64) -> Vec<Action> {
        if button != Button::Primary {
            return Vec::new();
        }
        let dpr = self.dpr;
        let InputState::Drawing { cell, rect, mut points } = std::mem::take(&mut self.input) else {
            return Vec::new();
        };
        let mut actions: Vec<Action> = append_point(cell, rect, &mut points, screen_pt, now_ms, dpr)
            .into_iter()
            .collect();

        match self.strokes.commit(cell, Stroke::new(points), now_ms, self.config.debounce_ms) {
            Some(at_ms) => actions.push(Action::ScheduleFlush { at_ms }),
            // A dot, or a stroke into a full cell, never persists.
            None => actions.extend(self.close_empty_gesture(cell, now_ms)),
        }
        actions
    }

    /// Abort the gesture in progress (pointer cancel / lost capture).
    pub fn on_pointer_cancel(&mut self, now_ms: i64) -> Vec<Action> {
        let InputState::Drawing { cell, .. } = std::mem::take(&mut self.input) else {
            return Vec::new();
        };
        self.close_empty_gesture(cell, now_ms)
    }

    /// Wipe the feedback of a gesture that kept nothing. A flush still
    /// pending from earlier strokes is re-armed, since the host timer may
    /// have fired (and been ignored) while the gesture was in progress.
    fn close_empty_gesture(&mut self, cell: CellKey, now_ms: i64) -> Vec<Action> {
        let mut actions = vec![Action::RedrawCell { cell }];
        actions.extend(self.strokes.abandon_gesture().into_iter().map(|cell| Action::RedrawCell { cell }));
        if let Some(deadline) = self.strokes.pending_flush_at() {
            actions.push(Action::ScheduleFlush { at_ms: deadline.max(now_ms) });
        }
        actions
    }

    // --- Timers ---

    /// Fire the debounce if it is due: push strokes, apply parked remote
    /// state, then run recognition on the cells written this session.
    pub fn tick(&mut self, now_ms: i64) -> Vec<Action> {
        if self.input.drawing_cell().is_some() {
            return Vec::new();
        }
        let Some(flush) = self.strokes.flush_due(now_ms) else {
            return Vec::new();
        };
        let mut actions = vec![Action::SyncStrokes { strokes: flush.strokes }];
        actions.extend(flush.redraw.into_iter().map(|cell| Action::RedrawCell { cell }));
        for cell in flush.touched {
            actions.extend(self.recognize_cell(cell, now_ms));
        }
        actions
    }

    fn recognize_cell(&mut self, cell: CellKey, now_ms: i64) -> Vec<Action> {
        let Some(recognizer) = &self.recognizer else {
            return Vec::new();
        };
        let Some(current) = self.cell(cell).copied() else {
            return Vec::new();
        };
        if current.is_black {
            return Vec::new();
        }
        let Some(recognition) = recognizer.recognize(self.strokes.strokes(cell)) else {
            return Vec::new();
        };
        let Ok(letter) = normalize_letter(recognition.letter) else {
            return Vec::new();
        };
        let recognition = Recognition { letter, ..recognition };
        let mut actions = vec![Action::LetterRecognized { cell, recognition }];
        if self.config.auto_fill && current.letter != Some(letter) {
            actions.extend(self.write_cell(cell, Some(letter), now_ms));
        }
        actions
    }

    // --- History ---

    /// Remove the most recent stroke across all cells and push state now.
    pub fn undo(&mut self, now_ms: i64) -> Vec<Action> {
        if self.input.drawing_cell().is_some() {
            return Vec::new();
        }
        let Some(cell) = self.strokes.undo() else {
            return Vec::new();
        };
        self.after_history_change(cell, now_ms)
    }

    /// Restore the most recently undone stroke and push state now.
    pub fn redo(&mut self, now_ms: i64) -> Vec<Action> {
        if self.input.drawing_cell().is_some() {
            return Vec::new();
        }
        let Some(cell) = self.strokes.redo() else {
            return Vec::new();
        };
        self.after_history_change(cell, now_ms)
    }

    /// Undo and redo end the session early: push, apply parked remote
    /// state, then recognize what the cut-short session wrote.
    fn after_history_change(&mut self, cell: CellKey, now_ms: i64) -> Vec<Action> {
        let mut actions = vec![Action::RedrawCell { cell }, Action::SyncStrokes { strokes: self.strokes.all().clone() }];
        actions.extend(self.strokes.apply_parked().into_iter().map(|cell| Action::RedrawCell { cell }));
        for touched in self.strokes.take_touched() {
            actions.extend(self.recognize_cell(touched, now_ms));
        }
        actions
    }

    #[must_use]
    pub fn can_undo(&self) -> bool {
        self.strokes.can_undo()
    }

    #[must_use]
    pub fn can_redo(&self) -> bool {
        self.strokes.can_redo()
    }

    /// Local strokes are waiting on the debounce, or remote strokes are
    /// parked until the session ends.
    #[must_use]
    pub fn is_sync_pending(&self) -> bool {
        self.strokes.pending_flush_at().is_some() || self.strokes.has_parked_remote()
    }

    /// Erase every stroke in one cell and push state now.
    pub fn clear_strokes(&mut self, cell: CellKey) -> Vec<Action> {
        if self.input.drawing_cell() == Some(cell) || !self.strokes.clear_cell(cell) {
            return Vec::new();
        }
        vec![Action::RedrawCell { cell }, Action::SyncStrokes { strokes: self.strokes.all().clone() }]
    }

    // --- Letters ---

    pub fn on_key_down(&mut self, key: &Key, now_ms: i64) -> Vec<Action> {
        let Some(cursor) = self.ui.cursor else {
            return Vec::new();
        };
        let name = key.0.as_str();
        let mut chars = name.chars();
        if let (Some(c), None) = (chars.next(), chars.next()) {
            if c == ' ' {
                return self.move_cursor(Cursor { direction: cursor.direction.toggled(), ..cursor });
            }
            let Ok(letter) = normalize_letter(c) else {
                return Vec::new();
            };
            let mut actions = self.write_cell(cursor.cell, Some(letter), now_ms);
            if let Some(next) = self.step(cursor.cell, cursor.direction, true) {
                actions.extend(self.move_cursor(Cursor { cell: next, ..cursor }));
            }
            return actions;
        }

        match name {
            "Backspace" => {
                let has_letter = self.cell(cursor.cell).is_some_and(|c| c.letter.is_some());
                if has_letter {
                    return self.write_cell(cursor.cell, None, now_ms);
                }
                let Some(prev) = self.step(cursor.cell, cursor.direction, false) else {
                    return Vec::new();
                };
                let mut actions = self.move_cursor(Cursor { cell: prev, ..cursor });
                actions.extend(self.write_cell(prev, None, now_ms));
                actions
            }
            "Delete" => self.write_cell(cursor.cell, None, now_ms),
            "Tab" => self.move_cursor(Cursor { direction: cursor.direction.toggled(), ..cursor }),
            "ArrowLeft" | "ArrowRight" | "ArrowUp" | "ArrowDown" => {
                let (axis, forward) = match name {
                    "ArrowLeft" => (Direction::Across, false),
                    "ArrowRight" => (Direction::Across, true),
                    "ArrowUp" => (Direction::Down, false),
                    _ => (Direction::Down, true),
                };
                if axis != cursor.direction {
                    return self.move_cursor(Cursor { direction: axis, ..cursor });
                }
                match self.step(cursor.cell, axis, forward) {
                    Some(cell) => self.move_cursor(Cursor { cell, ..cursor }),
                    None => Vec::new(),
                }
            }
            _ => Vec::new(),
        }
    }

    /// Select a cell directly (e.g. from a clue list).
    pub fn select_cell(&mut self, cell: CellKey, direction: Direction) -> Vec<Action> {
        if self.cell(cell).is_none_or(|c| c.is_black) {
            return Vec::new();
        }
        self.move_cursor(Cursor { cell, direction })
    }

    fn move_cursor(&mut self, cursor: Cursor) -> Vec<Action> {
        self.ui.cursor = Some(cursor);
        vec![Action::CursorMoved { cursor: Some(cursor) }]
    }

    /// Next open cell from `from` along `direction`, skipping black cells.
    fn step(&self, from: CellKey, direction: Direction, forward: bool) -> Option<CellKey> {
        let (rows, cols) = (self.settings.rows, self.settings.cols);
        let mut cur = from;
        loop {
            cur = match (direction, forward) {
                (Direction::Across, true) if cur.col + 1 < cols => CellKey::new(cur.row, cur.col + 1),
                (Direction::Across, false) if cur.col > 0 => CellKey::new(cur.row, cur.col - 1),
                (Direction::Down, true) if cur.row + 1 < rows => CellKey::new(cur.row + 1, cur.col),
                (Direction::Down, false) if cur.row > 0 => CellKey::new(cur.row - 1, cur.col),
                _ => return None,
            };
            if self.cell(cur).is_some_and(|c| !c.is_black) {
                return Some(cur);
            }
        }
    }

    fn write_cell(&mut self, cell: CellKey, letter: Option<char>, now_ms: i64) -> Vec<Action> {
        let Some(slot) = self.cells.get_mut(cell.row).and_then(|row| row.get_mut(cell.col)) else {
            return Vec::new();
        };
        if slot.is_black {
            return Vec::new();
        }
        slot.letter = letter;
        slot.timestamp = now_ms;
        vec![Action::SetCell { cell, value: *slot }, Action::RenderNeeded]
    }

    fn toggle_black(&mut self, cell: CellKey, now_ms: i64) -> Vec<Action> {
        let Some(slot) = self.cells.get_mut(cell.row).and_then(|row| row.get_mut(cell.col)) else {
            return Vec::new();
        };
        *slot = Cell { letter: None, is_black: !slot.is_black, timestamp: now_ms };
        let value = *slot;
        let mut actions = vec![Action::SetCell { cell, value }, Action::RenderNeeded];
        if value.is_black {
            if self.strokes.clear_cell(cell) {
                actions.push(Action::RedrawCell { cell });
            }
            if self.ui.cursor.is_some_and(|c| c.cell == cell) {
                self.ui.cursor = None;
                actions.push(Action::CursorMoved { cursor: None });
            }
        }
        actions
    }

    // --- Clues ---

    /// Mark or unmark a clue as done and push the set.
    pub fn toggle_clue_mark(&mut self, id: &ClueId) -> Vec<Action> {
        let key = id.to_string();
        if !self.marked_clues.remove(&key) {
            self.marked_clues.insert(key);
        }
        vec![Action::SetMarkedClues { marked: self.marked_clues.clone() }, Action::RenderNeeded]
    }

    // --- Queries ---

    #[must_use]
    pub fn cell(&self, cell: CellKey) -> Option<&Cell> {
        self.cells.get(cell.row).and_then(|row| row.get(cell.col))
    }

    #[must_use]
    pub fn strokes(&self, cell: CellKey) -> &[Stroke] {
        self.strokes.strokes(cell)
    }

    #[must_use]
    pub fn cursor(&self) -> Option<Cursor> {
        self.ui.cursor
    }

    #[must_use]
    pub fn is_drawing(&self) -> bool {
        self.input.drawing_cell().is_some()
    }

    #[must_use]
    pub fn clues(&self) -> Vec<Clue> {
        number_grid(&self.cells)
    }

    #[must_use]
    pub fn completed_clues(&self) -> BTreeSet<String> {
        completed_clues(&self.cells)
    }
}

/// Capture one pointer position into the stroke in progress and return the
/// feedback segment. Repeated positions are ignored.
fn append_point(
    cell: CellKey,
    rect: Rect,
    points: &mut Vec<StrokePoint>,
    screen_pt: Point,
    now_ms: i64,
    dpr: f64,
) -> Option<Action> {
    let pct = to_percent(screen_pt, rect)?;
    let last = points.last().copied();
    if last.is_some_and(|p| p.x == pct.x && p.y == pct.y) {
        return None;
    }
    if points.len() >= MAX_POINTS_PER_STROKE {
        return None;
    }
    points.push(StrokePoint::new(pct.x, pct.y, now_ms));
    let last = last?;
    Some(Action::DrawSegment {
        cell,
        from: to_backing(Point::new(last.x, last.y), rect, dpr),
        to: to_backing(pct, rect, dpr),
    })
}
