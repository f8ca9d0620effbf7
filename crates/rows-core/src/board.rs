//! The game grid and its rules.
//!
//! The grid is [`ROWS`] x [`COLS`] with row 0 at the top. Pieces only ever
//! land in the lowest empty cell of a column, so a cell is occupied only if
//! every cell below it is occupied too.
//!
//! [`Board`] is `Copy`: callers that need a stable view (the bot, snapshots)
//! take a copy instead of borrowing a locked room.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of rows in the grid.
pub const ROWS: usize = 6;
/// Number of columns in the grid.
pub const COLS: usize = 7;
/// Contiguous pieces needed to win.
pub const WIN_LENGTH: usize = 4;

/// Axes scanned by [`Board::check_win`]: horizontal, vertical, and both diagonals.
const AXES: [(isize, isize); 4] = [(0, 1), (1, 0), (1, 1), (1, -1)];

// ─────────────────────────────────────────────────────────────────────────────
// Seat
// ─────────────────────────────────────────────────────────────────────────────

/// One of the two player slots in a room.
///
/// Serialized as its wire number (`1` or `2`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Seat {
    /// Seat 1, the room creator. Always moves first.
    One,
    /// Seat 2, the joiner or the bot.
    Two,
}

/// A seat number outside `1..=2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid seat number: {0}")]
pub struct InvalidSeat(pub u8);

impl Seat {
    /// Both seats in order.
    pub const ALL: [Seat; 2] = [Seat::One, Seat::Two];

    /// Wire number of this seat.
    pub const fn number(self) -> u8 {
        match self {
            Seat::One => 1,
            Seat::Two => 2,
        }
    }

    /// Seat for a wire number, if valid.
    pub const fn from_number(n: u8) -> Option<Self> {
        match n {
            1 => Some(Seat::One),
            2 => Some(Seat::Two),
            _ => None,
        }
    }

    /// The opposing seat.
    pub const fn other(self) -> Self {
        match self {
            Seat::One => Seat::Two,
            Seat::Two => Seat::One,
        }
    }

    /// Zero-based slot index.
    pub const fn index(self) -> usize {
        match self {
            Seat::One => 0,
            Seat::Two => 1,
        }
    }
}

impl From<Seat> for u8 {
    fn from(seat: Seat) -> Self {
        seat.number()
    }
}

impl TryFrom<u8> for Seat {
    type Error = InvalidSeat;

    fn try_from(n: u8) -> Result<Self, Self::Error> {
        Seat::from_number(n).ok_or(InvalidSeat(n))
    }
}

impl std::fmt::Display for Seat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.number())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Board
// ─────────────────────────────────────────────────────────────────────────────

/// A grid position, used for win highlighting.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CellPos {
    /// Row index, 0 at the top.
    pub row: usize,
    /// Column index, 0 at the left.
    pub col: usize,
}

/// Wire/storage form of the grid: `0` empty, `1`/`2` seat numbers.
pub type CellGrid = [[u8; COLS]; ROWS];

/// The game grid.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "CellGrid", try_from = "CellGrid")]
pub struct Board {
    cells: [[Option<Seat>; COLS]; ROWS],
}

impl Board {
    /// An empty board.
    pub fn new() -> Self {
        Self::default()
    }

    /// Occupant of a cell. Out-of-range positions read as empty.
    pub fn get(&self, row: usize, col: usize) -> Option<Seat> {
        self.cells.get(row).and_then(|r| r.get(col)).copied().flatten()
    }

    /// Whether a column accepts no more pieces. Out-of-range columns count as full.
    pub fn is_column_full(&self, col: usize) -> bool {
        col >= COLS || self.cells[0][col].is_some()
    }

    /// Row a piece would land in, without placing it.
    pub fn landing_row(&self, col: usize) -> Option<usize> {
        if col >= COLS {
            return None;
        }
        (0..ROWS).rev().find(|&row| self.cells[row][col].is_none())
    }

    /// Drop a piece into a column.
    ///
    /// Returns the landing row, or `None` (and leaves the grid untouched)
    /// when the column is out of range or full.
    pub fn drop_piece(&mut self, col: usize, seat: Seat) -> Option<usize> {
        let row = self.landing_row(col)?;
        self.cells[row][col] = Some(seat);
        Some(row)
    }

    /// Columns that still accept a piece, left to right.
    pub fn valid_columns(&self) -> Vec<usize> {
        (0..COLS).filter(|&col| !self.is_column_full(col)).collect()
    }

    /// Check whether the piece at `(row, col)` completes a line for `seat`.
    ///
    /// Each axis through the cell is extended in both directions while cells
    /// match. The first axis reaching [`WIN_LENGTH`] wins and its full run
    /// (sorted top-left first) is returned.
    pub fn check_win(&self, row: usize, col: usize, seat: Seat) -> Option<Vec<CellPos>> {
        if self.get(row, col) != Some(seat) {
            return None;
        }

        for (dr, dc) in AXES {
            let mut line = vec![CellPos { row, col }];
            line.extend(self.run_from(row, col, dr, dc, seat));
            line.extend(self.run_from(row, col, -dr, -dc, seat));
            if line.len() >= WIN_LENGTH {
                line.sort_unstable();
                return Some(line);
            }
        }
        None
    }

    /// Matching cells walking away from `(row, col)`, origin excluded.
    fn run_from(&self, row: usize, col: usize, dr: isize, dc: isize, seat: Seat) -> Vec<CellPos> {
        let mut run = Vec::new();
        let mut r = row.checked_add_signed(dr);
        let mut c = col.checked_add_signed(dc);
        while let (Some(rr), Some(cc)) = (r, c) {
            if self.get(rr, cc) != Some(seat) {
                break;
            }
            run.push(CellPos { row: rr, col: cc });
            r = rr.checked_add_signed(dr);
            c = cc.checked_add_signed(dc);
        }
        run
    }

    /// True iff the top row is full, i.e. no column accepts another piece.
    pub fn is_draw(&self) -> bool {
        self.cells[0].iter().all(Option::is_some)
    }

    /// Whether no piece has been dropped yet.
    pub fn is_empty(&self) -> bool {
        self.cells.iter().flatten().all(Option::is_none)
    }

    /// Number of pieces on the board.
    pub fn piece_count(&self) -> usize {
        self.cells.iter().flatten().filter(|c| c.is_some()).count()
    }

    /// Numeric form for the wire and for storage.
    pub fn to_numbers(&self) -> CellGrid {
        let mut out = [[0u8; COLS]; ROWS];
        for (row, cells) in self.cells.iter().enumerate() {
            for (col, cell) in cells.iter().enumerate() {
                out[row][col] = cell.map_or(0, Seat::number);
            }
        }
        out
    }
}

impl From<Board> for CellGrid {
    fn from(board: Board) -> Self {
        board.to_numbers()
    }
}

impl TryFrom<CellGrid> for Board {
    type Error = InvalidSeat;

    fn try_from(grid: CellGrid) -> Result<Self, Self::Error> {
        let mut board = Board::new();
        for (row, cells) in grid.iter().enumerate() {
            for (col, &n) in cells.iter().enumerate() {
                board.cells[row][col] = match n {
                    0 => None,
                    n => Some(Seat::try_from(n)?),
                };
            }
        }
        Ok(board)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
