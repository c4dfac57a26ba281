use super::*;
use crate::doc::{GridSettings, empty_grid};

fn layout() -> GridLayout {
    GridLayout::from_image(Rect::new(0.0, 0.0, 150.0, 150.0), &GridSettings::default())
}

#[test]
fn hit_open_cell() {
    let grid = empty_grid(15, 15);
    let hit = hit_test(Point::new(15.0, 25.0), &layout(), &grid).unwrap();
    assert_eq!(hit.cell, CellKey::new(2, 1));
    assert_eq!(hit.rect, Rect::new(10.0, 20.0, 10.0, 10.0));
    assert!(!hit.blocked);
}

#[test]
fn hit_black_cell_is_blocked() {
    let mut grid = empty_grid(15, 15);
    grid[0][0].is_black = true;
    let hit = hit_test(Point::new(1.0, 1.0), &layout(), &grid).unwrap();
    assert!(hit.blocked);
}

#[test]
fn miss_outside_overlay() {
    let grid = empty_grid(15, 15);
    assert!(hit_test(Point::new(200.0, 1.0), &layout(), &grid).is_none());
}

#[test]
fn miss_when_grid_shorter_than_layout() {
    let grid = empty_grid(1, 1);
    assert!(hit_test(Point::new(75.0, 75.0), &layout(), &grid).is_none());
}
