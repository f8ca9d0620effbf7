//! `/health`: liveness plus a summary of rooms, seats, and storage.

use std::time::Instant;

use rows_core::Room;
use serde::Serialize;

/// Rooms in the registry, split by phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RoomPhases {
    /// Waiting for a second player.
    pub waiting: usize,
    /// Game in progress.
    pub playing: usize,
    /// Game ended, rematch not yet agreed.
    pub finished: usize,
    /// Of the above, rooms played against the bot.
    pub bot_games: usize,
}

impl RoomPhases {
    /// Tally the phases of `rooms`.
    pub fn tally<'a>(rooms: impl IntoIterator<Item = &'a Room>) -> Self {
        rooms.into_iter().fold(Self::default(), |mut phases, room| {
            let snapshot = room.snapshot();
            if !snapshot.started {
                phases.waiting += 1;
            } else if snapshot.game_over {
                phases.finished += 1;
            } else {
                phases.playing += 1;
            }
            if snapshot.is_bot_game {
                phases.bot_games += 1;
            }
            phases
        })
    }

    /// Total rooms counted.
    pub fn total(&self) -> usize {
        self.waiting + self.playing + self.finished
    }
}

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// `"ok"`, or `"full"` once new upgrades are being refused.
    pub status: &'static str,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Live WebSocket connections.
    pub connections: usize,
    /// Connection limit.
    pub max_connections: usize,
    /// Rooms in the registry.
    pub active_rooms: usize,
    /// Registry rooms by phase.
    pub rooms: RoomPhases,
    /// Rooms with at least one attached connection.
    pub attended_rooms: usize,
    /// `"durable"` when rooms are mirrored to `SQLite`, else `"memory"`.
    pub storage: &'static str,
    /// Whether `/api/*` has an analytics store behind it.
    pub analytics: bool,
}

/// Inputs for [`health_check`], gathered by the handler.
#[derive(Debug, Clone, Copy)]
pub struct HealthInputs {
    /// When the server started.
    pub start_time: Instant,
    /// Live connections.
    pub connections: usize,
    /// Connection limit.
    pub max_connections: usize,
    /// Registry rooms by phase.
    pub rooms: RoomPhases,
    /// Rooms with attached connections.
    pub attended_rooms: usize,
    /// Whether the registry has a durable store.
    pub durable: bool,
    /// Whether analytics are enabled.
    pub analytics: bool,
}

/// Build the response body.
pub fn health_check(inputs: HealthInputs) -> HealthResponse {
    HealthResponse {
        status: if inputs.connections >= inputs.max_connections {
            "full"
        } else {
            "ok"
        },
        uptime_secs: inputs.start_time.elapsed().as_secs(),
        connections: inputs.connections,
        max_connections: inputs.max_connections,
        active_rooms: inputs.rooms.total(),
        rooms: inputs.rooms,
        attended_rooms: inputs.attended_rooms,
        storage: if inputs.durable { "durable" } else { "memory" },
        analytics: inputs.analytics,
    }
}
