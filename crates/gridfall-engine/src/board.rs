//! The board grid and piece colors.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Number of rows on the board. Row 0 is the top row.
pub const ROWS: usize = 6;

/// Number of columns on the board.
pub const COLS: usize = 7;

/// The four win axes as (row, column) steps: horizontal, vertical,
/// and the two diagonals. Each axis is scanned in both directions
/// from the landing cell.
const AXES: [(isize, isize); 4] = [(0, 1), (1, 0), (1, 1), (1, -1)];

/// A player's piece color.
///
/// Red is the designated opening color: the first move of every game
/// must be red, and colors strictly alternate from there.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Color {
    /// The color that plays the first move.
    Red,
    /// The color that plays the second move.
    Yellow,
}

impl Color {
    /// The color that opens every game.
    pub const OPENING: Color = Color::Red;

    /// The opposing color.
    pub fn other(self) -> Self {
        match self {
            Color::Red => Color::Yellow,
            Color::Yellow => Color::Red,
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Color::Red => write!(f, "red"),
            Color::Yellow => write!(f, "yellow"),
        }
    }
}

/// The 6×7 grid. `None` is an empty cell.
///
/// Cells only transition empty→occupied, never back. Serializes as a
/// row-major array of arrays (`null` / `"red"` / `"yellow"`), row 0
/// first, which is the shape the `foundGame` payload carries.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Board {
    cells: [[Option<Color>; COLS]; ROWS],
}

impl Board {
    /// An empty board.
    pub fn new() -> Self {
        Self::default()
    }

    /// The cell at (row, column). Panics on out-of-range indices,
    /// which the engine has already rejected.
    pub fn cell(&self, row: usize, col: usize) -> Option<Color> {
        self.cells[row][col]
    }

    /// Whether the column's topmost cell is occupied.
    pub fn is_column_full(&self, col: usize) -> bool {
        self.cells[0][col].is_some()
    }

    /// The lowest empty row in the column, or `None` when full.
    pub(crate) fn drop_row(&self, col: usize) -> Option<usize> {
        (0..ROWS).rev().find(|&row| self.cells[row][col].is_none())
    }

    pub(crate) fn set(&mut self, row: usize, col: usize, color: Color) {
        debug_assert!(self.cells[row][col].is_none());
        self.cells[row][col] = Some(color);
    }

    /// Whether the run of `color` passing through (row, col) reaches
    /// four on any of the four axes.
    pub(crate) fn wins_through(&self, row: usize, col: usize, color: Color) -> bool {
        AXES.iter()
            .any(|&(dr, dc)| self.run_length(row, col, dr, dc, color) >= 4)
    }

    /// Length of the contiguous same-color run through (row, col)
    /// along the axis (dr, dc), counting both directions.
    fn run_length(&self, row: usize, col: usize, dr: isize, dc: isize, color: Color) -> usize {
        1 + self.count_dir(row, col, dr, dc, color) + self.count_dir(row, col, -dr, -dc, color)
    }

    fn count_dir(&self, row: usize, col: usize, dr: isize, dc: isize, color: Color) -> usize {
        let mut count = 0;
        let (mut r, mut c) = (row as isize + dr, col as isize + dc);
        while r >= 0 && r < ROWS as isize && c >= 0 && c < COLS as isize {
            if self.cells[r as usize][c as usize] != Some(color) {
                break;
            }
            count += 1;
            r += dr;
            c += dc;
        }
        count
    }

    /// Compact textual snapshot for the finished-game record:
    /// one line per row, `.` / `R` / `Y` per cell.
    pub fn render(&self) -> String {
        let mut out = String::with_capacity(ROWS * (COLS + 1));
        for (i, row) in self.cells.iter().enumerate() {
            if i > 0 {
                out.push('\n');
            }
            for cell in row {
                out.push(match cell {
                    None => '.',
                    Some(Color::Red) => 'R',
                    Some(Color::Yellow) => 'Y',
                });
            }
        }
        out
    }
}
