//! # rows-server
//!
//! Axum HTTP + `WebSocket` server for two-player rows games.
//!
//! - `WebSocket` gateway: per-connection inbound and outbound pumps, heartbeat
//! - Hub: live connections and room membership for fan-out
//! - Dispatcher: client messages to room, registry, and bot operations
//! - HTTP endpoints: health, metrics, leaderboard, daily stats, room lookup
//! - Graceful shutdown via `tokio::signal` + `CancellationToken`

#![deny(unsafe_code)]

pub mod api;
pub mod config;
pub mod context;
pub mod health;
pub mod metrics;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use config::ServerConfig;
pub use context::GameContext;
pub use server::{AppState, RowsServer};
pub use shutdown::ShutdownCoordinator;
pub use websocket::session::SessionConfig;
