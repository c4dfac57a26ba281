//! Coordinate model: screen points, region rects, and percentage conversion.
//!
//! Pointer input arrives in CSS pixels relative to the page. Strokes are
//! stored as percentages (0–100) of the cell they were drawn in, so they are
//! independent of resolution, zoom, and device. Local feedback is drawn into
//! a backing store scaled by the device pixel ratio.

#[cfg(test)]
#[path = "geom_test.rs"]
mod geom_test;

use serde::{Deserialize, Serialize};

use crate::consts::PERCENT_SCALE;
use crate::doc::{CellKey, GridSettings};

/// A point in CSS pixels, percentage space, or device pixels depending on context.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    #[must_use]
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned rectangle in CSS pixels (a bounding client rect).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    #[must_use]
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    /// Whether the rect has a usable (positive, finite) area.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.width.is_finite() && self.height.is_finite() && self.width > 0.0 && self.height > 0.0
    }

    /// Whether `p` lies inside the rect. Right and bottom edges are exclusive.
    #[must_use]
    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.x && p.y >= self.y && p.x < self.x + self.width && p.y < self.y + self.height
    }
}

/// Convert a CSS-pixel point into percentages of `rect`.
///
/// Returns `None` for degenerate rects. Points outside the rect are not
/// clamped; a stroke may leave its cell.
#[must_use]
pub fn to_percent(p: Point, rect: Rect) -> Option<Point> {
    if !rect.is_valid() {
        return None;
    }
    Some(Point {
        x: (p.x - rect.x) / rect.width * PERCENT_SCALE,
        y: (p.y - rect.y) / rect.height * PERCENT_SCALE,
    })
}

/// Convert a percentage point back into CSS pixels within `rect`.
#[must_use]
pub fn from_percent(pct: Point, rect: Rect) -> Point {
    Point {
        x: rect.x + pct.x / PERCENT_SCALE * rect.width,
        y: rect.y + pct.y / PERCENT_SCALE * rect.height,
    }
}

/// Convert a percentage point into region-local device pixels.
///
/// This is where a host canvas sized `rect.width * dpr` by
/// `rect.height * dpr` expects to draw.
#[must_use]
pub fn to_backing(pct: Point, rect: Rect, dpr: f64) -> Point {
    Point {
        x: pct.x / PERCENT_SCALE * rect.width * dpr,
        y: pct.y / PERCENT_SCALE * rect.height * dpr,
    }
}

/// Screen placement of the grid overlay, used to map pointer positions to cells.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridLayout {
    /// Overlay bounds in CSS pixels.
    pub overlay: Rect,
    pub rows: usize,
    pub cols: usize,
}

impl GridLayout {
    /// Place the overlay over an image that is currently shown at `image`.
    /// Overlay settings are percentages of the image.
    #[must_use]
    pub fn from_image(image: Rect, settings: &GridSettings) -> Self {
        let o = settings.overlay;
        Self {
            overlay: Rect {
                x: image.x + o.left / PERCENT_SCALE * image.width,
                y: image.y + o.top / PERCENT_SCALE * image.height,
                width: o.width / PERCENT_SCALE * image.width,
                height: o.height / PERCENT_SCALE * image.height,
            },
            rows: settings.rows,
            cols: settings.cols,
        }
    }

    /// The cell under `p`, if any.
    #[must_use]
    pub fn cell_at(&self, p: Point) -> Option<CellKey> {
        if self.rows == 0 || self.cols == 0 || !self.overlay.is_valid() || !self.overlay.contains(p) {
            return None;
        }
        let fx = (p.x - self.overlay.x) / self.overlay.width;
        let fy = (p.y - self.overlay.y) / self.overlay.height;
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
        let col = ((fx * self.cols as f64).floor() as usize).min(self.cols - 1);
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
        let row = ((fy * self.rows as f64).floor() as usize).min(self.rows - 1);
        Some(CellKey::new(row, col))
    }

    /// Bounding rect of a cell in CSS pixels.
    #[must_use]
    pub fn cell_rect(&self, cell: CellKey) -> Rect {
        #[allow(clippy::cast_precision_loss)]
        let (cw, ch) = (
            self.overlay.width / self.cols.max(1) as f64,
            self.overlay.height / self.rows.max(1) as f64,
        );
        #[allow(clippy::cast_precision_loss)]
        let (x, y) = (self.overlay.x + cell.col as f64 * cw, self.overlay.y + cell.row as f64 * ch);
        Rect { x, y, width: cw, height: ch }
    }
}
