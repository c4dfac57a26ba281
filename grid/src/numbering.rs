//! Clue numbering and completion.
//!
//! Numbers follow the usual crossword convention: scanning row-major, an open
//! cell gets the next number when it starts an across or a down entry of at
//! least [`MIN_ENTRY_LEN`] cells. Clue ids render as `"12A"` / `"5D"` and are
//! what the room's marked-clue set stores.

#[cfg(test)]
#[path = "numbering_test.rs"]
mod numbering_test;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use crate::consts::MIN_ENTRY_LEN;
use crate::doc::{Cell, CellKey};
use crate::input::Direction;

/// Identity of one clue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClueId {
    pub number: u32,
    pub direction: Direction,
}

impl fmt::Display for ClueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.number, self.direction.suffix())
    }
}

/// Error for clue ids that are not `<number><A|D>`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid clue id: {0}")]
pub struct InvalidClueId(pub String);

impl FromStr for ClueId {
    type Err = InvalidClueId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidClueId(s.to_owned());
        let s_trim = s.trim();
        let suffix = s_trim.chars().last().ok_or_else(invalid)?;
        let direction = match suffix.to_ascii_uppercase() {
            'A' => Direction::Across,
            'D' => Direction::Down,
            _ => return Err(invalid()),
        };
        let digits = &s_trim[..s_trim.len() - suffix.len_utf8()];
        let number = digits.parse::<u32>().map_err(|_| invalid())?;
        if number == 0 {
            return Err(invalid());
        }
        Ok(Self { number, direction })
    }
}

/// One entry of the grid: its id and the cells it covers in reading order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clue {
    pub id: ClueId,
    pub cells: Vec<CellKey>,
}

impl Clue {
    /// Whether every cell of the entry holds a letter.
    #[must_use]
    pub fn is_complete(&self, grid: &[Vec<Cell>]) -> bool {
        self.cells
            .iter()
            .all(|k| cell_at(grid, *k).is_some_and(|c| c.letter.is_some()))
    }
}

fn cell_at(grid: &[Vec<Cell>], key: CellKey) -> Option<&Cell> {
    grid.get(key.row).and_then(|row| row.get(key.col))
}

fn is_open(grid: &[Vec<Cell>], row: usize, col: usize) -> bool {
    cell_at(grid, CellKey::new(row, col)).is_some_and(|c| !c.is_black)
}

fn run_from(grid: &[Vec<Cell>], start: CellKey, direction: Direction) -> Vec<CellKey> {
    let mut cells = Vec::new();
    let mut cur = start;
    while is_open(grid, cur.row, cur.col) {
        cells.push(cur);
        cur = match direction {
            Direction::Across => CellKey::new(cur.row, cur.col + 1),
            Direction::Down => CellKey::new(cur.row + 1, cur.col),
        };
    }
    cells
}

/// Number the grid and list every clue, ordered by number, across before down.
#[must_use]
pub fn number_grid(grid: &[Vec<Cell>]) -> Vec<Clue> {
    let mut clues = Vec::new();
    let mut next = 1;
    for (row, cells) in grid.iter().enumerate() {
        for col in 0..cells.len() {
            if !is_open(grid, row, col) {
                continue;
            }
            let key = CellKey::new(row, col);
            let mut numbered = false;
            let starts_across = col == 0 || !is_open(grid, row, col - 1);
            let starts_down = row == 0 || !is_open(grid, row - 1, col);
            for (starts, direction) in [(starts_across, Direction::Across), (starts_down, Direction::Down)] {
                if !starts {
                    continue;
                }
                let run = run_from(grid, key, direction);
                if run.len() >= MIN_ENTRY_LEN {
                    clues.push(Clue { id: ClueId { number: next, direction }, cells: run });
                    numbered = true;
                }
            }
            if numbered {
                next += 1;
            }
        }
    }
    clues
}

/// Number printed in each numbered cell.
#[must_use]
pub fn cell_numbers(clues: &[Clue]) -> BTreeMap<CellKey, u32> {
    clues
        .iter()
        .filter_map(|c| c.cells.first().map(|k| (*k, c.id.number)))
        .collect()
}

/// Clues passing through `cell`.
#[must_use]
pub fn clues_at(clues: &[Clue], cell: CellKey) -> Vec<&Clue> {
    clues.iter().filter(|c| c.cells.contains(&cell)).collect()
}

/// Ids of every fully-filled clue.
#[must_use]
pub fn completed_clues(grid: &[Vec<Cell>]) -> BTreeSet<String> {
    number_grid(grid)
        .iter()
        .filter(|c| c.is_complete(grid))
        .map(|c| c.id.to_string())
        .collect()
}
