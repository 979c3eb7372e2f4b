//! Move application: validation order, gravity, and the move log.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::board::{Board, COLS, Color, ROWS};

/// A single dropped piece.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Move {
    /// Target column, 0-based from the left.
    pub column: u8,
    /// The color claiming the move.
    pub color: Color,
}

/// Outcome of a successfully applied move.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Applied {
    /// The row the piece settled into under gravity.
    pub row: u8,
    /// Whether this move completed a four-in-a-row.
    pub winning: bool,
}

/// Rule violations surfaced to the submitting player only.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum GameError {
    /// The claimed color is not the one whose turn it is.
    #[error("not {0}'s turn")]
    WrongTurn(Color),
    /// The target column's topmost cell is already occupied.
    #[error("column {0} is full")]
    ColumnFull(u8),
    /// The column index is outside the board. Callers validate this
    /// too; the engine rejects it rather than indexing out of bounds.
    #[error("column {0} is out of range")]
    ColumnOutOfRange(u8),
}

/// Authoritative game state: the board plus the ordered move log.
///
/// `apply` is the only mutation. Validation order: opening color,
/// turn alternation, column capacity.
#[derive(Clone, Debug, Default)]
pub struct Game {
    board: Board,
    moves: Vec<Move>,
}

impl Game {
    /// A fresh game with an empty board.
    pub fn new() -> Self {
        Self::default()
    }

    /// The current board.
    pub fn board(&self) -> &Board {
        &self.board
    }

    /// Every accepted move, in play order.
    pub fn moves(&self) -> &[Move] {
        &self.moves
    }

    /// Color of the most recent accepted move, `None` before the first.
    pub fn last_color(&self) -> Option<Color> {
        self.moves.last().map(|m| m.color)
    }

    /// Number of accepted moves.
    pub fn move_count(&self) -> usize {
        self.moves.len()
    }

    /// Whether every cell is occupied. The caller signals a draw when
    /// the board fills with no winning move; the engine never does.
    pub fn is_full(&self) -> bool {
        self.moves.len() == ROWS * COLS
    }

    /// Validate and apply one move under exclusive access.
    ///
    /// On success the piece lands in the lowest empty row of the
    /// column and the move is appended to the log. The board is never
    /// mutated on rejection.
    pub fn apply(&mut self, mv: Move) -> Result<Applied, GameError> {
        let col = usize::from(mv.column);
        if col >= COLS {
            return Err(GameError::ColumnOutOfRange(mv.column));
        }
        match self.last_color() {
            None if mv.color != Color::OPENING => return Err(GameError::WrongTurn(mv.color)),
            Some(last) if mv.color == last => return Err(GameError::WrongTurn(mv.color)),
            _ => {}
        }
        let Some(row) = self.board.drop_row(col) else {
            return Err(GameError::ColumnFull(mv.column));
        };
        self.board.set(row, col, mv.color);
        self.moves.push(mv);
        let winning = self.board.wins_through(row, col, mv.color);
        Ok(Applied {
            row: row as u8,
            winning,
        })
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use proptest::prelude::*;

    use super::*;

    fn mv(column: u8, color: Color) -> Move {
        Move { column, color }
    }

    #[test]
    fn first_move_must_be_opening_color() {
        let mut game = Game::new();
        assert_matches!(
            game.apply(mv(3, Color::Yellow)),
            Err(GameError::WrongTurn(Color::Yellow))
        );
        assert_eq!(game.move_count(), 0);
        assert_matches!(
            game.apply(mv(3, Color::Red)),
            Ok(Applied { row: 5, winning: false })
        );
    }

    #[test]
    fn colors_strictly_alternate() {
        let mut game = Game::new();
        let _ = game.apply(mv(0, Color::Red)).unwrap();
        assert_matches!(
            game.apply(mv(1, Color::Red)),
            Err(GameError::WrongTurn(Color::Red))
        );
        let _ = game.apply(mv(1, Color::Yellow)).unwrap();
        assert_matches!(
            game.apply(mv(2, Color::Yellow)),
            Err(GameError::WrongTurn(Color::Yellow))
        );
    }

    #[test]
    fn pieces_stack_under_gravity() {
        let mut game = Game::new();
        assert_eq!(game.apply(mv(3, Color::Red)).unwrap().row, 5);
        assert_eq!(game.apply(mv(3, Color::Yellow)).unwrap().row, 4);
        assert_eq!(game.apply(mv(3, Color::Red)).unwrap().row, 3);
    }

    #[test]
    fn full_column_rejected_without_mutation() {
        let mut game = Game::new();
        let mut color = Color::Red;
        // Fill column 2 (six pieces), alternating to stay legal.
        for _ in 0..ROWS {
            let _ = game.apply(mv(2, color)).unwrap();
            color = color.other();
        }
        let before = game.board().clone();
        let count = game.move_count();
        assert_matches!(game.apply(mv(2, color)), Err(GameError::ColumnFull(2)));
        assert_eq!(game.board(), &before);
        assert_eq!(game.move_count(), count);
        // The turn does not pass on a rejected move.
        assert_matches!(game.apply(mv(3, color)), Ok(_));
    }

    #[test]
    fn out_of_range_column_rejected() {
        let mut game = Game::new();
        assert_matches!(
            game.apply(mv(COLS as u8, Color::Red)),
            Err(GameError::ColumnOutOfRange(_))
        );
        assert_matches!(
            game.apply(mv(u8::MAX, Color::Red)),
            Err(GameError::ColumnOutOfRange(_))
        );
    }

    #[test]
    fn horizontal_win_on_bottom_row_detected_on_fourth_piece() {
        let mut game = Game::new();
        // Red builds [R,R,R,R,_,_,_] on row 5; yellow stacks on column 6.
        for col in 0..3u8 {
            assert!(!game.apply(mv(col, Color::Red)).unwrap().winning);
            assert!(!game.apply(mv(6, Color::Yellow)).unwrap().winning);
        }
        let applied = game.apply(mv(3, Color::Red)).unwrap();
        assert!(applied.winning);
        assert_eq!(applied.row, 5);
    }

    #[test]
    fn vertical_win_detected() {
        let mut game = Game::new();
        for _ in 0..3 {
            assert!(!game.apply(mv(3, Color::Red)).unwrap().winning);
            assert!(!game.apply(mv(4, Color::Yellow)).unwrap().winning);
        }
        assert!(game.apply(mv(3, Color::Red)).unwrap().winning);
    }

    #[test]
    fn win_through_middle_of_run() {
        let mut game = Game::new();
        // Red plays columns 0,1,3 then completes the run at 2.
        for col in [0u8, 1, 3] {
            let _ = game.apply(mv(col, Color::Red)).unwrap();
            let _ = game.apply(mv(col, Color::Yellow)).unwrap();
        }
        assert!(game.apply(mv(2, Color::Red)).unwrap().winning);
    }

    #[test]
    fn board_fills_after_forty_two_accepted_moves() {
        let mut game = Game::new();
        let mut color = Color::Red;
        for i in 0..ROWS * COLS {
            // Round-robin over columns keeps every move legal.
            let col = (i % COLS) as u8;
            let _ = game.apply(mv(col, color)).unwrap();
            color = color.other();
        }
        assert!(game.is_full());
        assert_eq!(game.move_count(), ROWS * COLS);
        for col in 0..COLS as u8 {
            assert_matches!(game.apply(mv(col, color)), Err(GameError::ColumnFull(_)));
        }
    }

    proptest! {
        /// Gravity invariant: every accepted move lands in what was the
        /// lowest unoccupied row of its column before the move.
        #[test]
        fn accepted_moves_respect_gravity(columns in prop::collection::vec(0u8..COLS as u8, 1..42)) {
            let mut game = Game::new();
            let mut heights = [0usize; COLS];
            let mut color = Color::Red;
            for col in columns {
                match game.apply(mv(col, color)) {
                    Ok(applied) => {
                        let expected_row = ROWS - 1 - heights[usize::from(col)];
                        prop_assert_eq!(usize::from(applied.row), expected_row);
                        heights[usize::from(col)] += 1;
                        color = color.other();
                    }
                    Err(GameError::ColumnFull(c)) => {
                        prop_assert_eq!(c, col);
                        prop_assert_eq!(heights[usize::from(col)], ROWS);
                    }
                    Err(e) => return Err(TestCaseError::fail(format!("unexpected error: {e}"))),
                }
            }
        }

        /// The move log never holds two consecutive moves of one color.
        #[test]
        fn move_log_alternates(columns in prop::collection::vec(0u8..COLS as u8, 1..42)) {
            let mut game = Game::new();
            let mut color = Color::Red;
            for col in columns {
                if game.apply(mv(col, color)).is_ok() {
                    color = color.other();
                }
            }
            for pair in game.moves().windows(2) {
                prop_assert_ne!(pair[0].color, pair[1].color);
            }
        }
    }
}
