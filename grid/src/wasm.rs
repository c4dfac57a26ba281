//! Browser facade over [`EngineCore`].
//!
//! Everything crosses the boundary as JSON strings. Each input method returns
//! an `Output` with the actions the host must perform (draw, redraw, arm a
//! timer) and the frames it must send on the websocket.

use serde::Serialize;
use serde_json::json;
use wasm_bindgen::prelude::*;

use crate::doc::{CellKey, GridSettings, Room, Stroke};
use crate::engine::{Action, EngineConfig, EngineCore};
use crate::geom::{Point, Rect};
use crate::input::{Button, Direction, Key, Tool};
use crate::numbering::ClueId;
use crate::recognize::{Template, build_recognizer};
use crate::sync;

#[derive(Serialize)]
struct Output {
    actions: Vec<Action>,
    frames: Vec<frames::Frame>,
}

/// Host clock in milliseconds.
fn clock() -> i64 {
    #[allow(clippy::cast_possible_truncation)]
    let now = js_sys::Date::now() as i64;
    now
}

fn button(code: u16) -> Button {
    match code {
        1 => Button::Middle,
        2 => Button::Secondary,
        _ => Button::Primary,
    }
}

#[wasm_bindgen]
pub struct GridEngine {
    core: EngineCore,
    /// Recognizer templates, kept so the host can add samples and export them.
    templates: Vec<Template>,
}

impl GridEngine {
    fn emit(&self, actions: Vec<Action>) -> Result<String, JsError> {
        let frames = match &self.core.room_id {
            Some(room_id) => sync::actions_to_frames(room_id, &actions, clock())?,
            None => Vec::new(),
        };
        Ok(serde_json::to_string(&Output { actions, frames })?)
    }

    fn current_room(&self) -> Result<&str, JsError> {
        self.core.room_id.as_deref().ok_or_else(|| JsError::new("not in a room"))
    }
}

#[wasm_bindgen]
impl GridEngine {
    /// `config_json` is an `EngineConfig`; `templates_json` a list of
    /// recognizer templates (may be `"[]"`).
    #[wasm_bindgen(constructor)]
    pub fn new(config_json: &str, templates_json: &str) -> Result<GridEngine, JsError> {
        let config: EngineConfig = serde_json::from_str(config_json)?;
        let templates: Vec<Template> = serde_json::from_str(templates_json)?;
        let mut core = EngineCore::new(config);
        core.set_recognizer(build_recognizer(config.recognizer, templates.clone()));
        Ok(Self { core, templates })
    }

    // --- Recognition ---

    /// Label the strokes in a cell as `letter` and rebuild the recognizer.
    /// Returns false when the cell has nothing to learn from.
    pub fn train(&mut self, row: usize, col: usize, letter: char) -> Result<bool, JsError> {
        let Some(template) = Template::from_strokes(letter, self.core.strokes(CellKey::new(row, col)))? else {
            return Ok(false);
        };
        self.templates.push(template);
        self.core.set_recognizer(build_recognizer(self.core.config.recognizer, self.templates.clone()));
        Ok(true)
    }

    /// Every recognizer template, for the host to store.
    pub fn templates(&self) -> Result<String, JsError> {
        Ok(serde_json::to_string(&self.templates)?)
    }

    // --- Room ---

    #[wasm_bindgen(js_name = loadRoom)]
    pub fn load_room(&mut self, room_json: &str) -> Result<String, JsError> {
        let room: Room = serde_json::from_str(room_json)?;
        let actions = self.core.load_room(room);
        self.emit(actions)
    }

    /// Apply one frame received from the server.
    pub fn receive(&mut self, frame_json: &str) -> Result<String, JsError> {
        let frame = frames::decode_json(frame_json)?;
        let actions = sync::apply_frame(&mut self.core, &frame)?;
        self.emit(actions)
    }

    #[wasm_bindgen(js_name = createRequest)]
    pub fn create_request(&self, image_url: &str, settings_json: &str) -> Result<String, JsError> {
        let settings: GridSettings = serde_json::from_str(settings_json)?;
        Ok(frames::encode_json(&sync::create_request(image_url, &settings, clock())?)?)
    }

    #[wasm_bindgen(js_name = joinRequest)]
    pub fn join_request(&self, room_id: &str) -> Result<String, JsError> {
        Ok(frames::encode_json(&sync::join_request(room_id, clock()))?)
    }

    #[wasm_bindgen(js_name = partRequest)]
    pub fn part_request(&self) -> Result<String, JsError> {
        Ok(frames::encode_json(&sync::part_request(self.current_room()?, clock()))?)
    }

    #[wasm_bindgen(js_name = settingsRequest)]
    pub fn settings_request(&self, settings_json: &str) -> Result<String, JsError> {
        let settings: GridSettings = serde_json::from_str(settings_json)?;
        Ok(frames::encode_json(&sync::settings_request(self.current_room()?, &settings, clock())?)?)
    }

    /// Replace the freehand drawing over the whole image.
    #[wasm_bindgen(js_name = setDrawing)]
    pub fn set_drawing(&mut self, strokes_json: &str) -> Result<String, JsError> {
        let strokes: Vec<Stroke> = serde_json::from_str(strokes_json)?;
        let actions = self.core.set_drawing(strokes);
        self.emit(actions)
    }

    // --- Viewport / tool ---

    /// Bounding client rect of the crossword image and the device pixel ratio.
    #[wasm_bindgen(js_name = setViewport)]
    pub fn set_viewport(&mut self, x: f64, y: f64, width: f64, height: f64, dpr: f64) {
        self.core.set_viewport(Rect::new(x, y, width, height), dpr);
    }

    #[wasm_bindgen(js_name = setTool)]
    pub fn set_tool(&mut self, tool: &str) -> Result<(), JsError> {
        let tool: Tool = serde_json::from_value(json!(tool))?;
        self.core.set_tool(tool);
        Ok(())
    }

    // --- Input ---

    #[wasm_bindgen(js_name = pointerDown)]
    pub fn pointer_down(&mut self, x: f64, y: f64, button_code: u16) -> Result<String, JsError> {
        let actions = self.core.on_pointer_down(Point::new(x, y), button(button_code), clock());
        self.emit(actions)
    }

    #[wasm_bindgen(js_name = pointerMove)]
    pub fn pointer_move(&mut self, x: f64, y: f64) -> Result<String, JsError> {
        let actions = self.core.on_pointer_move(Point::new(x, y), clock());
        self.emit(actions)
    }

    #[wasm_bindgen(js_name = pointerUp)]
    pub fn pointer_up(&mut self, x: f64, y: f64, button_code: u16) -> Result<String, JsError> {
        let actions = self.core.on_pointer_up(Point::new(x, y), button(button_code), clock());
        self.emit(actions)
    }

    #[wasm_bindgen(js_name = pointerCancel)]
    pub fn pointer_cancel(&mut self) -> Result<String, JsError> {
        let actions = self.core.on_pointer_cancel(clock());
        self.emit(actions)
    }

    #[wasm_bindgen(js_name = keyDown)]
    pub fn key_down(&mut self, key: &str) -> Result<String, JsError> {
        let actions = self.core.on_key_down(&Key(key.to_owned()), clock());
        self.emit(actions)
    }

    #[wasm_bindgen(js_name = selectCell)]
    pub fn select_cell(&mut self, row: usize, col: usize, direction: &str) -> Result<String, JsError> {
        let direction: Direction = serde_json::from_value(json!(direction))?;
        let actions = self.core.select_cell(CellKey::new(row, col), direction);
        self.emit(actions)
    }

    /// Fire the debounce timer armed by a `schedule_flush` action.
    pub fn tick(&mut self) -> Result<String, JsError> {
        let actions = self.core.tick(clock());
        self.emit(actions)
    }

    pub fn undo(&mut self) -> Result<String, JsError> {
        let actions = self.core.undo(clock());
        self.emit(actions)
    }

    pub fn redo(&mut self) -> Result<String, JsError> {
        let actions = self.core.redo(clock());
        self.emit(actions)
    }

    #[wasm_bindgen(js_name = clearStrokes)]
    pub fn clear_strokes(&mut self, row: usize, col: usize) -> Result<String, JsError> {
        let actions = self.core.clear_strokes(CellKey::new(row, col));
        self.emit(actions)
    }

    #[wasm_bindgen(js_name = toggleClue)]
    pub fn toggle_clue(&mut self, id: &str) -> Result<String, JsError> {
        let id: ClueId = id.parse()?;
        let actions = self.core.toggle_clue_mark(&id);
        self.emit(actions)
    }

    // --- Queries ---

    /// Strokes of one cell, for redraws.
    pub fn strokes(&self, row: usize, col: usize) -> Result<String, JsError> {
        Ok(serde_json::to_string(self.core.strokes(CellKey::new(row, col)))?)
    }

    /// Every clue with its cells, in numbering order.
    pub fn clues(&self) -> Result<String, JsError> {
        let clues: Vec<_> = self
            .core
            .clues()
            .iter()
            .map(|c| json!({ "id": c.id.to_string(), "cells": c.cells }))
            .collect();
        Ok(serde_json::to_string(&clues)?)
    }

    #[wasm_bindgen(js_name = completedClues)]
    pub fn completed_clues(&self) -> Result<String, JsError> {
        Ok(serde_json::to_string(&self.core.completed_clues())?)
    }

    #[wasm_bindgen(js_name = markedClues)]
    pub fn marked_clues(&self) -> Result<String, JsError> {
        Ok(serde_json::to_string(&self.core.marked_clues)?)
    }

    pub fn grid(&self) -> Result<String, JsError> {
        Ok(serde_json::to_string(&self.core.cells)?)
    }

    #[wasm_bindgen(js_name = isDrawing)]
    pub fn is_drawing(&self) -> bool {
        self.core.is_drawing()
    }

    #[wasm_bindgen(js_name = canUndo)]
    pub fn can_undo(&self) -> bool {
        self.core.can_undo()
    }

    #[wasm_bindgen(js_name = canRedo)]
    pub fn can_redo(&self) -> bool {
        self.core.can_redo()
    }

    /// Strokes are waiting to sync, or remote strokes are held back.
    #[wasm_bindgen(js_name = isSyncPending)]
    pub fn is_sync_pending(&self) -> bool {
        self.core.is_sync_pending()
    }

    #[wasm_bindgen(js_name = participantCount)]
    pub fn participant_count(&self) -> usize {
        self.core.participant_count
    }

    #[wasm_bindgen(js_name = clientId)]
    pub fn client_id(&self) -> Option<String> {
        self.core.client_id.clone()
    }

    /// Freehand strokes over the whole image, for redraws.
    #[wasm_bindgen(js_name = sharedStrokes)]
    pub fn shared_strokes(&self) -> Result<String, JsError> {
        Ok(serde_json::to_string(&self.core.shared_strokes)?)
    }
}
