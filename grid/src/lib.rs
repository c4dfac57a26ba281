//! Client engine for the collaborative crossword grid.
//!
//! This crate is compiled to WebAssembly and runs in the browser, and is also
//! the shared data model the server persists. It turns raw pointer and key
//! input over a crossword image into cell letters and per-cell handwriting
//! strokes, debounces stroke syncing, reconciles remote updates without
//! disturbing a stroke in progress, and translates store writes to and from
//! wire frames. The host JavaScript layer wires DOM events to
//! [`wasm::GridEngine`], draws what the returned [`engine::Action`]s ask for,
//! arms the flush timer, and sends the frames.
//!
//! ## Module layout
//!
//! | Module | Role |
//! |--------|------|
//! | [`engine`] | Testable [`engine::EngineCore`] and its actions |
//! | [`doc`] | Rooms, cells, strokes, and grid settings |
//! | [`geom`] | Points, rects, and pixel/percent conversion |
//! | [`input`] | Tools, keys, the cursor, and the gesture state machine |
//! | [`hit`] | Screen point to cell resolution |
//! | [`strokes`] | Stroke buffer, debounce, undo/redo, remote reconciliation |
//! | [`numbering`] | Clue numbering and completion |
//! | [`recognize`] | Pluggable handwriting recognition |
//! | [`sync`] | Action/frame translation |
//! | [`wasm`] | `wasm-bindgen` facade |
//! | [`consts`] | Shared numeric limits |

pub mod consts;
pub mod doc;
pub mod engine;
pub mod geom;
pub mod hit;
pub mod input;
pub mod numbering;
pub mod recognize;
pub mod strokes;
pub mod sync;
pub mod wasm;
