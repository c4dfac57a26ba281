//! Shared numeric constants for the grid crate.

// ── Strokes ─────────────────────────────────────────────────────

/// Minimum number of points a stroke needs before it is kept or synced.
pub const MIN_STROKE_POINTS: usize = 2;

/// Quiet period after the last pen lift before strokes are pushed, in ms.
/// Long enough to group the pen lifts of one glyph into a single edit.
pub const DEFAULT_DEBOUNCE_MS: i64 = 800;

/// Upper bound on points accepted for a single stroke.
pub const MAX_POINTS_PER_STROKE: usize = 2000;

/// Upper bound on strokes kept per cell.
pub const MAX_STROKES_PER_CELL: usize = 64;

// ── Coordinates ─────────────────────────────────────────────────

/// Stroke coordinates are stored as percentages of the region size.
pub const PERCENT_SCALE: f64 = 100.0;

// ── Grid ────────────────────────────────────────────────────────

/// Largest accepted row or column count.
pub const MAX_GRID_DIM: usize = 50;

/// Shortest run of open cells that forms a clue entry.
pub const MIN_ENTRY_LEN: usize = 2;

// ── Recognition ─────────────────────────────────────────────────

/// Number of points a glyph is resampled to before template matching.
pub const RESAMPLE_POINTS: usize = 32;

/// Default maximum mean point distance (unit-square space) for a match.
pub const DEFAULT_MATCH_DISTANCE: f64 = 0.18;
