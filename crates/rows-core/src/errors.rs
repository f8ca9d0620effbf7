//! Error types for game rules, room lifecycle, and collaborators.
//!
//! [`GameError`] and [`RegistryError`] are recoverable and never leave
//! state half-mutated. [`PersistenceError`] is what storage collaborators
//! report; callers in this crate log it and carry on.

use thiserror::Error;

use crate::code::RoomCode;

/// A rejected gameplay operation. No room state changed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GameError {
    /// The room is still waiting for its second player.
    #[error("game has not started")]
    NotStarted,

    /// The acting seat does not hold the turn.
    #[error("not your turn")]
    NotYourTurn,

    /// The game already reached a win or a draw.
    #[error("game is over")]
    GameOver,

    /// Column index is outside the grid.
    #[error("column {0} is out of range")]
    ColumnOutOfRange(usize),

    /// Column has no empty cell left.
    #[error("column {0} is full")]
    ColumnFull(usize),

    /// Rematch requested before the game ended.
    #[error("game is still in progress")]
    GameNotOver,
}

impl GameError {
    /// Whether this is a turn-order violation rather than an illegal drop.
    pub fn is_turn_violation(&self) -> bool {
        matches!(self, Self::NotYourTurn)
    }
}

/// A rejected room lifecycle operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// No live room with this code.
    #[error("room not found")]
    RoomNotFound(RoomCode),

    /// Seat 2 is already taken (or the caller already sits in the room).
    #[error("room is full")]
    RoomFull(RoomCode),
}

/// Failure reported by a storage collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{operation} failed: {message}")]
pub struct PersistenceError {
    /// Which store operation failed (`upsert`, `fetch`, ...).
    pub operation: &'static str,
    /// Underlying error text.
    pub message: String,
}

impl PersistenceError {
    /// Build from an operation name and any displayable cause.
    pub fn new(operation: &'static str, cause: impl std::fmt::Display) -> Self {
        Self {
            operation,
            message: cause.to_string(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
