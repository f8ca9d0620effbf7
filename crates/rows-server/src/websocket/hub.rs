//! Live connections and per-room membership: the fan-out point.
//!
//! Each attended room also carries a turn gate. Handlers hold it from a
//! state change until its broadcast is queued, so members see a room's
//! messages in the order the room applied them.

use std::collections::HashMap;
use std::sync::Arc;

use rows_core::{ClientId, RoomCode};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::{debug, warn};

use super::connection::ClientConnection;
use super::protocol::ServerMessage;

#[derive(Default)]
struct HubState {
    connections: HashMap<ClientId, Arc<ClientConnection>>,
    rooms: HashMap<RoomCode, HashMap<ClientId, Arc<ClientConnection>>>,
    turns: HashMap<RoomCode, Arc<Mutex<()>>>,
}

impl HubState {
    fn drop_room(&mut self, code: &RoomCode) {
        let _ = self.rooms.remove(code);
        let _ = self.turns.remove(code);
    }
}

/// Connection set plus room code -> member set. Empty member sets are pruned.
#[derive(Default)]
pub struct Hub {
    state: RwLock<HubState>,
}

impl Hub {
    /// Create an empty hub.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a live connection.
    pub async fn register(&self, connection: Arc<ClientConnection>) {
        let mut state = self.state.write().await;
        let _ = state.connections.insert(connection.id.clone(), connection);
    }

    /// Remove a connection, drop it from every room, and close its queue.
    pub async fn unregister(&self, id: &ClientId) {
        let removed = {
            let mut state = self.state.write().await;
            let removed = state.connections.remove(id);
            state.rooms.retain(|_, members| {
                let _ = members.remove(id);
                !members.is_empty()
            });
            let HubState { rooms, turns, .. } = &mut *state;
            turns.retain(|code, _| rooms.contains_key(code));
            removed
        };
        if let Some(connection) = removed {
            connection.close();
        }
    }

    /// Add a connection to a room's member set.
    pub async fn attach(&self, code: &RoomCode, connection: Arc<ClientConnection>) {
        let mut state = self.state.write().await;
        let _ = state
            .rooms
            .entry(code.clone())
            .or_default()
            .insert(connection.id.clone(), connection);
        let _ = state.turns.entry(code.clone()).or_default();
    }

    /// Remove a connection from a room's member set.
    pub async fn detach(&self, code: &RoomCode, id: &ClientId) {
        let mut state = self.state.write().await;
        if let Some(members) = state.rooms.get_mut(code) {
            let _ = members.remove(id);
            if members.is_empty() {
                state.drop_room(code);
            }
        }
    }

    /// Drop a room's member set entirely.
    pub async fn close_room(&self, code: &RoomCode) {
        self.state.write().await.drop_room(code);
    }

    /// Take a room's turn gate, waiting for the current holder.
    ///
    /// `None` when nobody is attached to the room.
    pub async fn lock_turn(&self, code: &RoomCode) -> Option<OwnedMutexGuard<()>> {
        let gate = self.state.read().await.turns.get(code).cloned()?;
        Some(gate.lock_owned().await)
    }

    /// Queue a message for each member of a room.
    ///
    /// `build` runs once per member; `None` skips that member. Frames are
    /// only queued, never written, so the read lock is held briefly.
    /// Returns how many members were sent a frame.
    pub async fn broadcast<F>(&self, code: &RoomCode, build: F) -> usize
    where
        F: Fn(&ClientConnection) -> Option<ServerMessage>,
    {
        let state = self.state.read().await;
        let Some(members) = state.rooms.get(code) else {
            debug!(room_code = %code, "broadcast to room with no members");
            return 0;
        };

        let mut sent = 0;
        for member in members.values() {
            let Some(message) = build(member) else {
                continue;
            };
            if member.send_message(&message) {
                sent += 1;
            } else {
                warn!(client_id = %member.id, room_code = %code, kind = message.kind(), "failed to queue message");
            }
        }
        sent
    }

    /// Number of live connections.
    pub async fn connection_count(&self) -> usize {
        self.state.read().await.connections.len()
    }

    /// Identities attached to a room.
    pub async fn room_members(&self, code: &RoomCode) -> Vec<ClientId> {
        let state = self.state.read().await;
        state
            .rooms
            .get(code)
            .map(|members| members.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of rooms with at least one member.
    pub async fn room_count(&self) -> usize {
        self.state.read().await.rooms.len()
    }

    /// A live connection by identity.
    pub async fn connection(&self, id: &ClientId) -> Option<Arc<ClientConnection>> {
        self.state.read().await.connections.get(id).cloned()
    }
}
