//! Handwriting recognition behind one pluggable interface.
//!
//! The engine asks a [`Recognizer`] for a letter after a drawing session
//! ends. Backends are picked by [`RecognizerKind`] in the engine config.
//! Recognition never errors: empty input or a weak match yields `None` and
//! the grid is left alone.
//!
//! The built-in [`NearestNeighbor`] backend matches a glyph against letter
//! templates supplied by the host. A glyph's signature is every stroke's
//! points joined in drawing order, scaled uniformly into the unit square,
//! and resampled to a fixed count of equidistant points.

#[cfg(test)]
#[path = "recognize_test.rs"]
mod recognize_test;

use serde::{Deserialize, Serialize};

use crate::consts::{DEFAULT_MATCH_DISTANCE, RESAMPLE_POINTS};
use crate::doc::{DocError, Stroke, normalize_letter};
use crate::geom::Point;

/// A recognized letter and how sure the backend is (0.0–1.0).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Recognition {
    pub letter: char,
    pub confidence: f64,
}

/// Turns the strokes of one cell into at most one letter.
pub trait Recognizer {
    fn recognize(&self, strokes: &[Stroke]) -> Option<Recognition>;
}

/// Backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecognizerKind {
    /// No recognition; strokes stay strokes.
    #[default]
    Disabled,
    /// Template matching with a maximum mean point distance.
    NearestNeighbor {
        #[serde(default = "default_match_distance")]
        max_distance: f64,
    },
}

fn default_match_distance() -> f64 {
    DEFAULT_MATCH_DISTANCE
}

/// Build the configured backend. `Disabled` yields `None`.
#[must_use]
pub fn build_recognizer(kind: RecognizerKind, templates: Vec<Template>) -> Option<Box<dyn Recognizer>> {
    match kind {
        RecognizerKind::Disabled => None,
        RecognizerKind::NearestNeighbor { max_distance } => {
            Some(Box::new(NearestNeighbor::from_templates(templates, max_distance)))
        }
    }
}

/// One labelled glyph signature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    pub letter: char,
    pub points: Vec<Point>,
}

impl Template {
    /// Label a drawn glyph. Returns `None` when the strokes have no extent.
    ///
    /// # Errors
    ///
    /// Returns [`DocError::InvalidLetter`] for non-letters.
    pub fn from_strokes(letter: char, strokes: &[Stroke]) -> Result<Option<Self>, DocError> {
        let letter = normalize_letter(letter)?;
        Ok(signature(strokes).map(|points| Self { letter, points }))
    }
}

/// Nearest-neighbour template matcher.
#[derive(Debug, Clone, Default)]
pub struct NearestNeighbor {
    templates: Vec<Template>,
    max_distance: f64,
}

impl NearestNeighbor {
    /// Rebuild from stored templates, skipping any with the wrong point count.
    #[must_use]
    pub fn from_templates(templates: Vec<Template>, max_distance: f64) -> Self {
        let templates = templates
            .into_iter()
            .filter(|t| t.points.len() == RESAMPLE_POINTS)
            .collect();
        Self { templates, max_distance }
    }
}

impl Recognizer for NearestNeighbor {
    fn recognize(&self, strokes: &[Stroke]) -> Option<Recognition> {
        let probe = signature(strokes)?;
        let (best, distance) = self
            .templates
            .iter()
            .map(|t| (t, mean_distance(&probe, &t.points)))
            .min_by(|a, b| a.1.total_cmp(&b.1))?;
        if distance > self.max_distance || self.max_distance <= 0.0 {
            return None;
        }
        Some(Recognition { letter: best.letter, confidence: (1.0 - distance / self.max_distance).clamp(0.0, 1.0) })
    }
}

/// Normalized, resampled signature of a glyph, or `None` if it has no extent.
#[must_use]
pub fn signature(strokes: &[Stroke]) -> Option<Vec<Point>> {
    let raw: Vec<Point> = strokes
        .iter()
        .flat_map(|s| s.points.iter().map(|p| Point::new(p.x, p.y)))
        .collect();
    let first = raw.first()?;
    let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
    for p in &raw {
        min_x = min_x.min(p.x);
        min_y = min_y.min(p.y);
        max_x = max_x.max(p.x);
        max_y = max_y.max(p.y);
    }
    let side = (max_x - min_x).max(max_y - min_y);
    if side <= f64::EPSILON || !side.is_finite() {
        return None;
    }
    // Center the glyph in the unit square so aspect ratio survives scaling.
    let off_x = (side - (max_x - min_x)) / 2.0;
    let off_y = (side - (max_y - min_y)) / 2.0;
    let scaled: Vec<Point> = raw
        .iter()
        .map(|p| Point::new((p.x - min_x + off_x) / side, (p.y - min_y + off_y) / side))
        .collect();
    Some(resample(&scaled, RESAMPLE_POINTS))
}

fn dist(a: Point, b: Point) -> f64 {
    (a.x - b.x).hypot(a.y - b.y)
}

fn resample(points: &[Point], n: usize) -> Vec<Point> {
    let Some(&first) = points.first() else {
        return Vec::new();
    };
    let total: f64 = points.windows(2).map(|w| dist(w[0], w[1])).sum();
    #[allow(clippy::cast_precision_loss)]
    let interval = total / (n.saturating_sub(1).max(1)) as f64;

    let mut out = vec![first];
    let mut prev = first;
    let mut acc = 0.0;
    let mut rest = points.iter().skip(1).copied().collect::<std::collections::VecDeque<_>>();
    while let Some(next) = rest.pop_front() {
        if out.len() >= n {
            break;
        }
        let d = dist(prev, next);
        if d > 0.0 && acc + d >= interval {
            let t = (interval - acc) / d;
            let q = Point::new(prev.x + t * (next.x - prev.x), prev.y + t * (next.y - prev.y));
            out.push(q);
            rest.push_front(next);
            prev = q;
            acc = 0.0;
        } else {
            acc += d;
            prev = next;
        }
    }
    let last = points.last().copied().unwrap_or(first);
    while out.len() < n {
        out.push(last);
    }
    out
}

fn mean_distance(a: &[Point], b: &[Point]) -> f64 {
    if a.is_empty() || a.len() != b.len() {
        return f64::INFINITY;
    }
    #[allow(clippy::cast_precision_loss)]
    let n = a.len() as f64;
    a.iter().zip(b).map(|(p, q)| dist(*p, *q)).sum::<f64>() / n
}
