//! # rows-core
//!
//! Game rules and room state for the rows server.
//!
//! - [`board`]: the 6x7 grid, gravity drops, win and draw detection
//! - [`room`]: one match behind its own lock (turns, outcome, rematch votes)
//! - [`registry`]: code -> room map, collision-free codes, room lifecycle
//! - [`bot`]: move selection for single-player games
//! - [`persistence`]: collaborator traits for durable rooms and analytics
//!
//! Nothing in this crate performs I/O. Storage and transport live in
//! `rows-store` and `rows-server`.

#![deny(unsafe_code)]

pub mod board;
pub mod bot;
pub mod code;
pub mod errors;
pub mod ids;
pub mod logging;
pub mod persistence;
pub mod registry;
pub mod room;

pub use board::{Board, CellPos, COLS, ROWS, Seat, WIN_LENGTH};
pub use bot::{HeuristicBot, MoveSelector};
pub use code::{CodeGenerator, RoomCode};
pub use errors::{GameError, PersistenceError, RegistryError};
pub use ids::ClientId;
pub use persistence::{GameCompletedEvent, GameEventSink, RoomStore, StoredRoom};
pub use registry::RoomRegistry;
pub use room::{GameOutcome, MoveOutcome, PlayerSlot, RematchStatus, Room, RoomSnapshot};
