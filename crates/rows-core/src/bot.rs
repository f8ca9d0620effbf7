//! Move selection for the single-player bot.
//!
//! The bot works on a copy of the board and never sees the room lock.

use crate::board::{Board, COLS, Seat};

/// Columns tried in order when no tactical move exists: centre first.
pub const COLUMN_PREFERENCE: [usize; COLS] = [3, 2, 4, 1, 5, 0, 6];

/// Chooses a column for the side opposing `opponent`.
pub trait MoveSelector: Send + Sync {
    /// Column to play, or `None` when the board is full.
    fn best_move(&self, board: &Board, opponent: Seat) -> Option<usize>;
}

/// Win if possible, else block, else prefer the centre.
#[derive(Clone, Copy, Debug, Default)]
pub struct HeuristicBot;

impl HeuristicBot {
    fn winning_column(board: &Board, seat: Seat) -> Option<usize> {
        board.valid_columns().into_iter().find(|&col| {
            let mut probe = *board;
            probe
                .drop_piece(col, seat)
                .is_some_and(|row| probe.check_win(row, col, seat).is_some())
        })
    }
}

impl MoveSelector for HeuristicBot {
    fn best_move(&self, board: &Board, opponent: Seat) -> Option<usize> {
        let me = opponent.other();
        Self::winning_column(board, me)
            .or_else(|| Self::winning_column(board, opponent))
            .or_else(|| {
                COLUMN_PREFERENCE
                    .into_iter()
                    .find(|&col| !board.is_column_full(col))
            })
    }
}
