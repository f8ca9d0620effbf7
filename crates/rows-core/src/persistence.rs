//! Collaborator interfaces for durable room storage and game analytics.
//!
//! Both are optional. The core keeps working with neither configured, and
//! neither can fail a gameplay operation: store errors are logged by the
//! registry, and [`GameEventSink::publish`] has no error to return.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::board::Seat;
use crate::code::RoomCode;
use crate::errors::PersistenceError;
use crate::room::RoomSnapshot;

/// Durable copy of a room, keyed by code.
///
/// Implementations must be cheap enough to call on every move; they run on
/// the caller's thread.
pub trait RoomStore: Send + Sync {
    /// Insert or replace the stored copy of a room.
    fn upsert(&self, snapshot: &RoomSnapshot) -> Result<(), PersistenceError>;

    /// Stored copy of a room, if any.
    fn fetch(&self, code: &RoomCode) -> Result<Option<StoredRoom>, PersistenceError>;

    /// Drop the stored copy. Deleting an unknown code is not an error.
    fn delete(&self, code: &RoomCode) -> Result<(), PersistenceError>;

    /// Bump the room's last-activity timestamp.
    fn touch_activity(&self, code: &RoomCode) -> Result<(), PersistenceError>;
}

/// A room as read back from storage.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StoredRoom {
    /// State at the last save.
    pub snapshot: RoomSnapshot,
    /// When the room was first stored.
    pub created_at: DateTime<Utc>,
    /// Last save or activity bump.
    pub last_activity: DateTime<Utc>,
}

/// Fire-and-forget sink for finished games.
pub trait GameEventSink: Send + Sync {
    /// Hand off an event. Must not block.
    fn publish(&self, event: GameCompletedEvent);
}

/// Event type tag carried by [`GameCompletedEvent`].
pub const GAME_COMPLETED: &str = "game_completed";

/// Summary of a finished game.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameCompletedEvent {
    /// Always [`GAME_COMPLETED`].
    #[serde(rename = "type")]
    pub event_type: String,
    /// Room the game was played in.
    pub room_code: RoomCode,
    /// Seat 1 display name.
    pub player1_name: String,
    /// Seat 2 display name.
    pub player2_name: String,
    /// Winning seat number, `0` for a draw.
    pub winner: u8,
    /// Whether seat 2 was the bot.
    pub is_bot_game: bool,
    /// Wall time of the game.
    pub duration_seconds: u64,
    /// When the game ended.
    pub timestamp: DateTime<Utc>,
}

impl GameCompletedEvent {
    /// Build from the room state right after the final move.
    pub fn from_snapshot(snapshot: &RoomSnapshot, duration: Duration) -> Self {
        Self {
            event_type: GAME_COMPLETED.to_owned(),
            room_code: snapshot.code.clone(),
            player1_name: snapshot.player_name(Seat::One).to_owned(),
            player2_name: snapshot.player_name(Seat::Two).to_owned(),
            winner: snapshot.winner.map_or(0, Seat::number),
            is_bot_game: snapshot.is_bot_game,
            duration_seconds: duration.as_secs(),
            timestamp: Utc::now(),
        }
    }

    /// Whether the game ended in a draw.
    pub fn is_draw(&self) -> bool {
        self.winner == 0
    }

    /// Display name of the winner, if any.
    pub fn winner_name(&self) -> Option<&str> {
        match Seat::from_number(self.winner)? {
            Seat::One => Some(&self.player1_name),
            Seat::Two => Some(&self.player2_name),
        }
    }
}
