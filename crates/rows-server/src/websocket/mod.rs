//! WebSocket connections, room fan-out, message dispatch, and session pumps.

pub mod connection;
pub mod handler;
pub mod hub;
pub mod protocol;
pub mod session;
