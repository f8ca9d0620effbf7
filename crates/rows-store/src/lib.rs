//! # rows-store
//!
//! `SQLite` persistence for the rows game server.
//!
//! - [`connection`]: r2d2 pool with WAL pragmas
//! - [`migrations`]: embedded, versioned schema
//! - [`rooms`]: [`SqliteRoomStore`], the durable [`rows_core::RoomStore`],
//!   plus the inactive-room cleanup task
//! - [`analytics`]: finished-game history, daily totals, and the leaderboard
//! - [`sink`]: [`AnalyticsSink`], a non-blocking [`rows_core::GameEventSink`]
//!   backed by a background writer
//! - [`writer`]: [`QueuedRoomStore`], which moves room writes off the
//!   caller's thread

#![deny(unsafe_code)]

pub mod analytics;
pub mod connection;
pub mod errors;
pub mod migrations;
pub mod rooms;
pub mod sink;
pub mod writer;

pub use analytics::{AnalyticsStore, DailyStats, GameRecord, LeaderboardEntry};
pub use connection::{ConnectionConfig, ConnectionPool, new_file, new_in_memory};
pub use errors::{Result, StoreError};
pub use migrations::run_migrations;
pub use rooms::{SqliteRoomStore, spawn_cleanup_task};
pub use sink::AnalyticsSink;
pub use writer::QueuedRoomStore;

/// Open a pool (file or in-memory) and bring its schema up to date.
pub fn open(path: Option<&str>, config: &ConnectionConfig) -> Result<ConnectionPool> {
    let pool = match path {
        Some(path) => new_file(path, config)?,
        None => new_in_memory(config)?,
    };
    {
        let conn = pool.get()?;
        let _ = run_migrations(&conn)?;
    }
    Ok(pool)
}
