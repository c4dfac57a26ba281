#![allow(clippy::clone_on_copy, clippy::float_cmp)]

use super::*;
use crate::doc::Overlay;

const EPSILON: f64 = 1e-9;

fn approx_eq(a: f64, b: f64) -> bool {
    (a - b).abs() < EPSILON
}

fn point_approx_eq(a: Point, b: Point) -> bool {
    approx_eq(a.x, b.x) && approx_eq(a.y, b.y)
}

fn settings(rows: usize, cols: usize) -> GridSettings {
    GridSettings { rows, cols, overlay: Overlay::default() }
}

// --- Rect ---

#[test]
fn rect_validity() {
    assert!(Rect::new(0.0, 0.0, 10.0, 10.0).is_valid());
    assert!(!Rect::new(0.0, 0.0, 0.0, 10.0).is_valid());
    assert!(!Rect::new(0.0, 0.0, 10.0, -1.0).is_valid());
    assert!(!Rect::new(0.0, 0.0, f64::NAN, 10.0).is_valid());
}

#[test]
fn rect_contains_excludes_far_edges() {
    let r = Rect::new(10.0, 20.0, 30.0, 40.0);
    assert!(r.contains(Point::new(10.0, 20.0)));
    assert!(r.contains(Point::new(39.9, 59.9)));
    assert!(!r.contains(Point::new(40.0, 30.0)));
    assert!(!r.contains(Point::new(20.0, 60.0)));
    assert!(!r.contains(Point::new(9.9, 30.0)));
}

// --- Percent conversion ---

#[test]
fn to_percent_origin_and_far_corner() {
    let r = Rect::new(100.0, 50.0, 40.0, 20.0);
    assert!(point_approx_eq(to_percent(Point::new(100.0, 50.0), r).unwrap(), Point::new(0.0, 0.0)));
    assert!(point_approx_eq(to_percent(Point::new(140.0, 70.0), r).unwrap(), Point::new(100.0, 100.0)));
    assert!(point_approx_eq(to_percent(Point::new(120.0, 55.0), r).unwrap(), Point::new(50.0, 25.0)));
}

#[test]
fn to_percent_does_not_clamp() {
    let r = Rect::new(0.0, 0.0, 10.0, 10.0);
    let p = to_percent(Point::new(15.0, -5.0), r).unwrap();
    assert!(point_approx_eq(p, Point::new(150.0, -50.0)));
}

#[test]
fn to_percent_rejects_degenerate_rect() {
    assert!(to_percent(Point::new(1.0, 1.0), Rect::new(0.0, 0.0, 0.0, 10.0)).is_none());
}

#[test]
fn percent_round_trip_within_rect() {
    let r = Rect::new(37.5, 12.25, 41.0, 39.0);
    for p in [Point::new(37.5, 12.25), Point::new(50.0, 30.0), Point::new(78.4, 51.2)] {
        let back = from_percent(to_percent(p, r).unwrap(), r);
        assert!(point_approx_eq(back, p), "{p:?} -> {back:?}");
    }
}

#[test]
fn to_backing_scales_by_dpr_and_is_region_local() {
    let r = Rect::new(500.0, 500.0, 40.0, 30.0);
    let p = to_backing(Point::new(50.0, 100.0), r, 2.0);
    assert!(point_approx_eq(p, Point::new(40.0, 60.0)));
}

// --- GridLayout ---

#[test]
fn layout_full_image_overlay() {
    let layout = GridLayout::from_image(Rect::new(0.0, 0.0, 150.0, 150.0), &settings(15, 15));
    assert_eq!(layout.overlay, Rect::new(0.0, 0.0, 150.0, 150.0));
    assert_eq!(layout.cell_at(Point::new(5.0, 5.0)), Some(CellKey::new(0, 0)));
    assert_eq!(layout.cell_at(Point::new(25.0, 15.0)), Some(CellKey::new(1, 2)));
    assert_eq!(layout.cell_at(Point::new(149.9, 149.9)), Some(CellKey::new(14, 14)));
}

#[test]
fn layout_applies_overlay_percentages() {
    let s = GridSettings { rows: 2, cols: 2, overlay: Overlay { left: 10.0, top: 20.0, width: 50.0, height: 50.0 } };
    let layout = GridLayout::from_image(Rect::new(100.0, 100.0, 200.0, 100.0), &s);
    assert!(approx_eq(layout.overlay.x, 120.0));
    assert!(approx_eq(layout.overlay.y, 120.0));
    assert!(approx_eq(layout.overlay.width, 100.0));
    assert!(approx_eq(layout.overlay.height, 50.0));
}

#[test]
fn layout_cell_at_outside_overlay_is_none() {
    let layout = GridLayout::from_image(Rect::new(0.0, 0.0, 100.0, 100.0), &settings(5, 5));
    assert_eq!(layout.cell_at(Point::new(-1.0, 5.0)), None);
    assert_eq!(layout.cell_at(Point::new(100.0, 5.0)), None);
}

#[test]
fn layout_cell_rect_matches_cell_at() {
    let layout = GridLayout::from_image(Rect::new(10.0, 10.0, 100.0, 50.0), &settings(5, 10));
    let rect = layout.cell_rect(CellKey::new(2, 3));
    assert!(approx_eq(rect.x, 40.0));
    assert!(approx_eq(rect.y, 30.0));
    assert!(approx_eq(rect.width, 10.0));
    assert!(approx_eq(rect.height, 10.0));
    let center = Point::new(rect.x + rect.width / 2.0, rect.y + rect.height / 2.0);
    assert_eq!(layout.cell_at(center), Some(CellKey::new(2, 3)));
}
