//! A single match: two seats, one board, one lock.
//!
//! Lifecycle: waiting for the second player, in progress, terminal (win or
//! draw), then back to in progress through [`Room::reset_game`].
//!
//! All gameplay mutation goes through [`Room::make_move`], which drops the
//! piece, checks the outcome, and advances the turn under a single lock
//! acquisition. Rooms never contend with each other.

use std::fmt;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::board::{Board, CellPos, Seat};
use crate::code::RoomCode;
use crate::errors::{GameError, RegistryError};
use crate::ids::ClientId;

/// Display name given to the bot.
pub const BOT_NAME: &str = "Bot";

/// Occupant of a seat.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerSlot {
    /// Stable identity (connection ID, or `bot`).
    pub id: ClientId,
    /// Display name, possibly empty.
    pub name: String,
    /// Whether the occupant's transport is live.
    pub connected: bool,
}

impl PlayerSlot {
    /// A connected human player.
    pub fn new(id: ClientId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            connected: true,
        }
    }

    /// The synthetic bot player.
    pub fn bot() -> Self {
        Self::new(ClientId::bot(), BOT_NAME)
    }
}

/// How a game ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GameOutcome {
    /// Four (or more) in a row.
    Win {
        /// Seat that completed the line.
        winner: Seat,
        /// Every cell of the winning run.
        cells: Vec<CellPos>,
    },
    /// Board filled with no line.
    Draw,
}

/// Result of an accepted move.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MoveOutcome {
    /// Column played.
    pub column: usize,
    /// Row the piece landed in.
    pub row: usize,
    /// Seat that moved.
    pub seat: Seat,
    /// Turn marker after the move. Unchanged when the move ended the game.
    pub next_turn: Seat,
    /// Set when this move ended the game.
    pub outcome: Option<GameOutcome>,
    /// Time since the current game began.
    pub elapsed: Duration,
}

impl MoveOutcome {
    /// Whether this move ended the game.
    pub fn is_terminal(&self) -> bool {
        self.outcome.is_some()
    }
}

/// Rematch vote tally after a vote.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RematchStatus {
    /// Only one seat has voted.
    Waiting,
    /// Both seats have voted since the last reset.
    BothReady,
}

/// Immutable copy of a room's state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomSnapshot {
    /// Room code.
    pub code: RoomCode,
    /// Seat occupants, indexed by [`Seat::index`].
    pub players: [Option<PlayerSlot>; 2],
    /// Copy of the grid.
    pub board: Board,
    /// Seat holding the turn.
    pub current_turn: Seat,
    /// Whether both seats are filled and play has begun.
    pub started: bool,
    /// Whether the game reached a win or draw.
    pub game_over: bool,
    /// Winning seat; `None` with `game_over` means draw.
    pub winner: Option<Seat>,
    /// Whether seat 2 is the bot.
    pub is_bot_game: bool,
}

impl RoomSnapshot {
    /// Display name of a seat's occupant, empty when vacant.
    pub fn player_name(&self, seat: Seat) -> &str {
        self.players[seat.index()]
            .as_ref()
            .map_or("", |p| p.name.as_str())
    }

    /// Whether the game ended without a winner.
    pub fn is_draw(&self) -> bool {
        self.game_over && self.winner.is_none()
    }
}

struct RoomState {
    players: [Option<PlayerSlot>; 2],
    board: Board,
    current_turn: Seat,
    started: bool,
    game_over: bool,
    winner: Option<Seat>,
    rematch_votes: [bool; 2],
    game_started_at: Instant,
}

/// One game's state behind its own lock.
pub struct Room {
    code: RoomCode,
    is_bot_game: bool,
    created_at: DateTime<Utc>,
    state: Mutex<RoomState>,
    /// Held across every store write for this room. `true` once retired.
    retired: Mutex<bool>,
}

impl Room {
    /// A room with seat 1 filled, waiting for a second player.
    pub fn new(code: RoomCode, owner: PlayerSlot) -> Self {
        Self::build(code, owner, None)
    }

    /// A room with the bot in seat 2, already started.
    pub fn new_bot_game(code: RoomCode, owner: PlayerSlot) -> Self {
        Self::build(code, owner, Some(PlayerSlot::bot()))
    }

    fn build(code: RoomCode, owner: PlayerSlot, second: Option<PlayerSlot>) -> Self {
        let is_bot_game = second.is_some();
        Self {
            code,
            is_bot_game,
            created_at: Utc::now(),
            state: Mutex::new(RoomState {
                started: is_bot_game,
                players: [Some(owner), second],
                board: Board::new(),
                current_turn: Seat::One,
                game_over: false,
                winner: None,
                rematch_votes: [false; 2],
                game_started_at: Instant::now(),
            }),
            retired: Mutex::new(false),
        }
    }

    /// Room code.
    pub fn code(&self) -> &RoomCode {
        &self.code
    }

    /// Whether seat 2 is the bot.
    pub fn is_bot_game(&self) -> bool {
        self.is_bot_game
    }

    /// When the room was created.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Seat held by `id`, if any.
    pub fn seat_of(&self, id: &ClientId) -> Option<Seat> {
        let state = self.state.lock();
        Seat::ALL
            .into_iter()
            .find(|seat| state.players[seat.index()].as_ref().is_some_and(|p| &p.id == id))
    }

    /// Fill seat 2 and start the game.
    pub(crate) fn seat_second_player(&self, player: PlayerSlot) -> Result<(), RegistryError> {
        let mut state = self.state.lock();
        let already_seated = state.players.iter().flatten().any(|p| p.id == player.id);
        if state.players[Seat::Two.index()].is_some() || already_seated {
            return Err(RegistryError::RoomFull(self.code.clone()));
        }
        state.players[Seat::Two.index()] = Some(player);
        state.started = true;
        state.game_started_at = Instant::now();
        Ok(())
    }

    /// Apply a move for `seat`.
    ///
    /// Rejections leave the room untouched. On success the turn passes to
    /// the other seat unless the move won or filled the board.
    pub fn make_move(&self, column: usize, seat: Seat) -> Result<MoveOutcome, GameError> {
        let mut state = self.state.lock();
        if !state.started {
            return Err(GameError::NotStarted);
        }
        if state.current_turn != seat {
            return Err(GameError::NotYourTurn);
        }
        if state.game_over {
            return Err(GameError::GameOver);
        }
        if column >= crate::board::COLS {
            return Err(GameError::ColumnOutOfRange(column));
        }
        let row = state
            .board
            .drop_piece(column, seat)
            .ok_or(GameError::ColumnFull(column))?;

        let outcome = if let Some(cells) = state.board.check_win(row, column, seat) {
            state.game_over = true;
            state.winner = Some(seat);
            Some(GameOutcome::Win {
                winner: seat,
                cells,
            })
        } else if state.board.is_draw() {
            state.game_over = true;
            Some(GameOutcome::Draw)
        } else {
            state.current_turn = seat.other();
            None
        };

        Ok(MoveOutcome {
            column,
            row,
            seat,
            next_turn: state.current_turn,
            outcome,
            elapsed: state.game_started_at.elapsed(),
        })
    }

    /// Record a rematch vote for `seat`.
    ///
    /// Votes are kept until [`Self::reset_game`]. Voting twice from the
    /// same seat does not count as the other seat's vote.
    pub fn request_rematch(&self, seat: Seat) -> Result<RematchStatus, GameError> {
        let mut state = self.state.lock();
        if !state.game_over {
            return Err(GameError::GameNotOver);
        }
        state.rematch_votes[seat.index()] = true;
        if state.rematch_votes.iter().all(|&v| v) {
            Ok(RematchStatus::BothReady)
        } else {
            Ok(RematchStatus::Waiting)
        }
    }

    /// Clear the board, outcome, and votes; seat 1 moves first again.
    pub fn reset_game(&self) {
        let mut state = self.state.lock();
        state.board = Board::new();
        state.current_turn = Seat::One;
        state.game_over = false;
        state.winner = None;
        state.rematch_votes = [false; 2];
        state.game_started_at = Instant::now();
    }

    /// Whether the room has been removed from its registry.
    pub fn is_retired(&self) -> bool {
        *self.retired.lock()
    }

    /// Run `write` unless the room is retired. Returns whether it ran.
    ///
    /// Writes and [`Self::retire`] are mutually exclusive, so a write that
    /// starts before retirement finishes before the retire hook runs.
    pub(crate) fn write_unless_retired(&self, write: impl FnOnce()) -> bool {
        let retired = self.retired.lock();
        if *retired {
            return false;
        }
        write();
        true
    }

    /// Mark the room retired, then run `hook` while still excluding writes.
    pub(crate) fn retire(&self, hook: impl FnOnce()) {
        let mut retired = self.retired.lock();
        *retired = true;
        hook();
    }

    /// Deep copy of the current state.
    pub fn snapshot(&self) -> RoomSnapshot {
        let state = self.state.lock();
        RoomSnapshot {
            code: self.code.clone(),
            players: state.players.clone(),
            board: state.board,
            current_turn: state.current_turn,
            started: state.started,
            game_over: state.game_over,
            winner: state.winner,
            is_bot_game: self.is_bot_game,
        }
    }
}

impl fmt::Debug for Room {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Room")
            .field("code", &self.code)
            .field("is_bot_game", &self.is_bot_game)
            .field("started", &state.started)
            .field("game_over", &state.game_over)
            .field("current_turn", &state.current_turn)
            .field("pieces", &state.board.piece_count())
            .finish_non_exhaustive()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
