//! WebSocket client connection state.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use metrics::counter;
use parking_lot::Mutex;
use rows_core::{ClientId, RoomCode};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

use super::protocol::ServerMessage;
use crate::metrics::WS_OUTBOUND_DROPS_TOTAL;

/// A connected WebSocket client as seen by the hub and dispatcher.
///
/// Holds the sending half of the outbound queue. The session's outbound
/// pump owns the receiving half.
pub struct ClientConnection {
    /// Unique connection ID, also the player identity.
    pub id: ClientId,
    /// Room this client is bound to.
    room: Mutex<Option<RoomCode>>,
    /// Outbound queue. `None` once closed.
    tx: Mutex<Option<mpsc::Sender<Arc<str>>>>,
    /// When this connection was established.
    pub connected_at: Instant,
    /// Count of messages dropped because the queue was full.
    pub dropped_messages: AtomicU64,
}

impl ClientConnection {
    /// Create a connection feeding `tx`.
    pub fn new(id: ClientId, tx: mpsc::Sender<Arc<str>>) -> Self {
        Self {
            id,
            room: Mutex::new(None),
            tx: Mutex::new(Some(tx)),
            connected_at: Instant::now(),
            dropped_messages: AtomicU64::new(0),
        }
    }

    /// Bind this connection to a room, replacing any previous binding.
    pub fn bind_room(&self, code: RoomCode) {
        *self.room.lock() = Some(code);
    }

    /// The bound room code.
    pub fn room_code(&self) -> Option<RoomCode> {
        self.room.lock().clone()
    }

    /// Clear and return the bound room code.
    pub fn take_room(&self) -> Option<RoomCode> {
        self.room.lock().take()
    }

    /// Queue a pre-serialized frame without waiting.
    ///
    /// Returns `false` when the queue is full or closed. A full queue drops
    /// the new frame and counts it.
    pub fn send(&self, text: Arc<str>) -> bool {
        let guard = self.tx.lock();
        let Some(tx) = guard.as_ref() else {
            return false;
        };
        match tx.try_send(text) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                let dropped = self.dropped_messages.fetch_add(1, Ordering::Relaxed) + 1;
                counter!(WS_OUTBOUND_DROPS_TOTAL).increment(1);
                warn!(client_id = %self.id, dropped, "outbound queue full, dropping message");
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    /// Serialize and queue a message.
    pub fn send_message(&self, message: &ServerMessage) -> bool {
        match message.to_json() {
            Ok(json) => self.send(json),
            Err(e) => {
                warn!(client_id = %self.id, kind = message.kind(), error = %e, "failed to serialize message");
                false
            }
        }
    }

    /// Close the outbound queue. The pump flushes what is queued, then
    /// writes a Close frame.
    pub fn close(&self) {
        if self.tx.lock().take().is_some() {
            debug!(client_id = %self.id, "outbound queue closed");
        }
    }

    /// Whether [`Self::close`] has run.
    pub fn is_closed(&self) -> bool {
        self.tx.lock().is_none()
    }

    /// Total messages dropped for this connection.
    pub fn drop_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}
