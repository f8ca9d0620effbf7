//! Process-wide room registry.
//!
//! One [`RwLock`] guards the code -> room map. Lookups take the read side;
//! create, join, and remove take the write side. Gameplay never touches
//! this lock: once a caller holds an `Arc<Room>` it works through the
//! room's own lock. The lock order is registry then room, never the reverse.
//!
//! Persistence is best-effort. Store calls happen outside the registry lock
//! and their failures are logged, never returned. Each room serialises its
//! own store writes against its removal, so once a room is removed no
//! later save can bring its row back. Handlers call in from async tasks, so
//! a blocking store belongs behind a queue (see `rows_store::QueuedRoomStore`).

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::board::Seat;
use crate::code::{CodeGenerator, RoomCode};
use crate::errors::{PersistenceError, RegistryError};
use crate::ids::ClientId;
use crate::persistence::{RoomStore, StoredRoom};
use crate::room::{PlayerSlot, Room};

/// Maps room codes to live rooms.
pub struct RoomRegistry {
    rooms: RwLock<HashMap<RoomCode, Arc<Room>>>,
    codes: CodeGenerator,
    store: Option<Arc<dyn RoomStore>>,
}

impl RoomRegistry {
    /// In-memory registry with no durable store.
    pub fn new() -> Self {
        Self::with_parts(CodeGenerator::new(), None)
    }

    /// Registry that mirrors room state into `store`.
    pub fn with_store(store: Arc<dyn RoomStore>) -> Self {
        Self::with_parts(CodeGenerator::new(), Some(store))
    }

    /// Registry with an explicit code generator (for deterministic tests).
    pub fn with_parts(codes: CodeGenerator, store: Option<Arc<dyn RoomStore>>) -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
            codes,
            store,
        }
    }

    /// Create a room with `owner` in seat 1.
    pub fn create_room(&self, owner: ClientId, name: impl Into<String>) -> Arc<Room> {
        self.insert_new(|code| Room::new(code, PlayerSlot::new(owner, name)))
    }

    /// Create a started room with `owner` in seat 1 and the bot in seat 2.
    pub fn create_bot_room(&self, owner: ClientId, name: impl Into<String>) -> Arc<Room> {
        self.insert_new(|code| Room::new_bot_game(code, PlayerSlot::new(owner, name)))
    }

    fn insert_new(&self, build: impl FnOnce(RoomCode) -> Room) -> Arc<Room> {
        let room = {
            let mut rooms = self.rooms.write();
            let code = self.codes.generate_unique(|c| rooms.contains_key(c));
            let room = Arc::new(build(code.clone()));
            let _ = rooms.insert(code, Arc::clone(&room));
            room
        };
        info!(
            room_code = %room.code(),
            bot = room.is_bot_game(),
            "room created"
        );
        self.persist(&room);
        room
    }

    /// Seat `id` in seat 2 of the room with `code`.
    pub fn join_room(
        &self,
        code: &RoomCode,
        id: ClientId,
        name: impl Into<String>,
    ) -> Result<Arc<Room>, RegistryError> {
        let room = {
            let rooms = self.rooms.write();
            let room = rooms
                .get(code)
                .cloned()
                .ok_or_else(|| RegistryError::RoomNotFound(code.clone()))?;
            room.seat_second_player(PlayerSlot::new(id, name))?;
            room
        };
        info!(room_code = %code, "player joined room");
        self.persist(&room);
        Ok(room)
    }

    /// Live room for `code`.
    pub fn get_room(&self, code: &RoomCode) -> Option<Arc<Room>> {
        self.rooms.read().get(code).cloned()
    }

    /// Remove a room and drop its durable copy.
    pub fn remove_room(&self, code: &RoomCode) -> Option<Arc<Room>> {
        let removed = self.rooms.write().remove(code);
        if let Some(room) = &removed {
            info!(room_code = %code, "room removed");
            self.retire(room);
        }
        removed
    }

    /// Remove the room under `code` only if `id` holds a seat in it.
    ///
    /// Guards against removing a newer room that reused the code of one the
    /// caller has already left.
    pub fn remove_room_for(&self, code: &RoomCode, id: &ClientId) -> bool {
        let removed = {
            let mut rooms = self.rooms.write();
            match rooms.get(code) {
                Some(room) if room.seat_of(id).is_some() => rooms.remove(code),
                _ => None,
            }
        };
        let Some(room) = removed else {
            return false;
        };
        info!(room_code = %code, client_id = %id, "room removed after player left");
        self.retire(&room);
        true
    }

    /// Seat held by `id` in `room`.
    pub fn seat_number_of(&self, room: &Room, id: &ClientId) -> Option<Seat> {
        room.seat_of(id)
    }

    /// Number of live rooms.
    pub fn room_count(&self) -> usize {
        self.rooms.read().len()
    }

    /// All live rooms.
    pub fn rooms(&self) -> Vec<Arc<Room>> {
        self.rooms.read().values().cloned().collect()
    }

    /// Whether room state is mirrored into a store.
    pub fn is_durable(&self) -> bool {
        self.store.is_some()
    }

    /// Mirror a room's current state into the store.
    ///
    /// Skipped once the room has been removed, so a late write cannot
    /// resurrect it.
    pub fn save_room_state(&self, room: &Room) {
        self.persist(room);
    }

    /// Durable copy of a room, if a store is configured and has one.
    pub fn stored_room(&self, code: &RoomCode) -> Result<Option<StoredRoom>, PersistenceError> {
        match &self.store {
            Some(store) => store.fetch(code),
            None => Ok(None),
        }
    }

    fn persist(&self, room: &Room) {
        let Some(store) = &self.store else { return };
        let written = room.write_unless_retired(|| {
            let snapshot = room.snapshot();
            if let Err(e) = store.upsert(&snapshot) {
                warn!(room_code = %room.code(), error = %e, "failed to save room state");
                return;
            }
            if let Err(e) = store.touch_activity(room.code()) {
                warn!(room_code = %room.code(), error = %e, "failed to update room activity");
            }
        });
        if !written {
            debug!(room_code = %room.code(), "skipping save for removed room");
        }
    }

    /// Retire a room that has left the map and drop its stored copy.
    fn retire(&self, room: &Room) {
        room.retire(|| {
            let Some(store) = &self.store else { return };
            if let Err(e) = store.delete(room.code()) {
                warn!(room_code = %room.code(), error = %e, "failed to delete stored room");
            }
        });
    }
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::GameError;
    use crate::room::RoomSnapshot;
    use assert_matches::assert_matches;
    use parking_lot::Mutex;

    /// Records store calls; optionally fails every call.
    #[derive(Default)]
    struct RecordingStore {
        rooms: Mutex<HashMap<RoomCode, RoomSnapshot>>,
        calls: Mutex<Vec<String>>,
        fail: bool,
    }

    impl RecordingStore {
        fn failing() -> Self {
            Self {
                fail: true,
                ..Self::default()
            }
        }

        fn record(&self, call: &str, code: &RoomCode) -> Result<(), PersistenceError> {
            self.calls.lock().push(format!("{call}:{code}"));
            if self.fail {
                Err(PersistenceError::new("test", "store offline"))
            } else {
                Ok(())
            }
        }
    }

    impl RoomStore for RecordingStore {
        fn upsert(&self, snapshot: &RoomSnapshot) -> Result<(), PersistenceError> {
            self.record("upsert", &snapshot.code)?;
            let _ = self.rooms.lock().insert(snapshot.code.clone(), snapshot.clone());
            Ok(())
        }

        fn fetch(&self, code: &RoomCode) -> Result<Option<StoredRoom>, PersistenceError> {
            self.record("fetch", code)?;
            Ok(self.rooms.lock().get(code).map(|s| StoredRoom {
                snapshot: s.clone(),
                created_at: chrono::Utc::now(),
                last_activity: chrono::Utc::now(),
            }))
        }

        fn delete(&self, code: &RoomCode) -> Result<(), PersistenceError> {
            self.record("delete", code)?;
            let _ = self.rooms.lock().remove(code);
            Ok(())
        }

        fn touch_activity(&self, code: &RoomCode) -> Result<(), PersistenceError> {
            self.record("touch", code)
        }
    }

    #[test]
    fn create_registers_room_with_owner_in_seat_one() {
        let registry = RoomRegistry::new();
        let alice = ClientId::new();
        let room = registry.create_room(alice.clone(), "alice");
        assert_eq!(registry.room_count(), 1);
        assert!(Arc::ptr_eq(&registry.get_room(room.code()).unwrap(), &room));
        assert_eq!(registry.seat_number_of(&room, &alice), Some(Seat::One));
        assert!(!room.snapshot().started);
    }

    #[test]
    fn created_codes_are_unique() {
        let registry = RoomRegistry::new();
        let mut codes: Vec<RoomCode> = (0..100)
            .map(|_| registry.create_room(ClientId::new(), "").code().clone())
            .collect();
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), 100);
        assert_eq!(registry.room_count(), 100);
    }

    #[test]
    fn seeded_registry_draws_from_its_generator() {
        let expected = CodeGenerator::seeded(9).generate();
        let registry = RoomRegistry::with_parts(CodeGenerator::seeded(9), None);
        let room = registry.create_room(ClientId::new(), "");
        assert_eq!(room.code(), &expected);
        let second = registry.create_room(ClientId::new(), "");
        assert_ne!(second.code(), &expected);
    }

    #[test]
    fn bot_room_is_started_with_bot_in_seat_two() {
        let registry = RoomRegistry::new();
        let room = registry.create_bot_room(ClientId::new(), "alice");
        let snap = room.snapshot();
        assert!(snap.started);
        assert_eq!(registry.seat_number_of(&room, &ClientId::bot()), Some(Seat::Two));
    }

    #[test]
    fn join_fills_seat_two_and_starts() {
        let registry = RoomRegistry::new();
        let room = registry.create_room(ClientId::new(), "alice");
        let bob = ClientId::new();
        let joined = registry.join_room(room.code(), bob.clone(), "bob").unwrap();
        assert!(Arc::ptr_eq(&joined, &room));
        assert!(room.snapshot().started);
        assert_eq!(registry.seat_number_of(&room, &bob), Some(Seat::Two));
    }

    #[test]
    fn join_unknown_code_fails() {
        let registry = RoomRegistry::new();
        let code = RoomCode::parse("NOPE99").unwrap();
        assert_matches!(
            registry.join_room(&code, ClientId::new(), ""),
            Err(RegistryError::RoomNotFound(c)) if c == code
        );
    }

    #[test]
    fn join_full_room_fails() {
        let registry = RoomRegistry::new();
        let room = registry.create_room(ClientId::new(), "");
        let _ = registry.join_room(room.code(), ClientId::new(), "").unwrap();
        assert_matches!(
            registry.join_room(room.code(), ClientId::new(), ""),
            Err(RegistryError::RoomFull(_))
        );
    }

    #[test]
    fn join_bot_room_fails() {
        let registry = RoomRegistry::new();
        let room = registry.create_bot_room(ClientId::new(), "");
        assert_matches!(
            registry.join_room(room.code(), ClientId::new(), ""),
            Err(RegistryError::RoomFull(_))
        );
    }

    #[test]
    fn remove_room_makes_code_unknown() {
        let registry = RoomRegistry::new();
        let room = registry.create_room(ClientId::new(), "");
        let code = room.code().clone();
        assert!(registry.remove_room(&code).is_some());
        assert!(registry.get_room(&code).is_none());
        assert!(registry.remove_room(&code).is_none());
    }

    #[test]
    fn remove_room_for_requires_participant() {
        let registry = RoomRegistry::new();
        let alice = ClientId::new();
        let room = registry.create_room(alice.clone(), "");
        assert!(!registry.remove_room_for(room.code(), &ClientId::new()));
        assert_eq!(registry.room_count(), 1);
        assert!(registry.remove_room_for(room.code(), &alice));
        assert_eq!(registry.room_count(), 0);
    }

    #[test]
    fn store_mirrors_lifecycle() {
        let store = Arc::new(RecordingStore::default());
        let registry = RoomRegistry::with_store(store.clone());
        let room = registry.create_room(ClientId::new(), "alice");
        let code = room.code().clone();
        let _ = registry.join_room(&code, ClientId::new(), "bob").unwrap();
        let _ = room.make_move(2, Seat::One).unwrap();
        registry.save_room_state(&room);

        let stored = registry.stored_room(&code).unwrap().unwrap();
        assert_eq!(stored.snapshot.board.piece_count(), 1);
        assert_eq!(stored.snapshot.player_name(Seat::Two), "bob");

        let _ = registry.remove_room(&code);
        assert!(registry.stored_room(&code).unwrap().is_none());

        let calls = store.calls.lock().clone();
        assert_eq!(calls.first().unwrap(), &format!("upsert:{code}"));
        assert!(calls.contains(&format!("touch:{code}")));
        assert!(calls.contains(&format!("delete:{code}")));
    }

    #[test]
    fn save_skips_removed_rooms() {
        let store = Arc::new(RecordingStore::default());
        let registry = RoomRegistry::with_store(store.clone());
        let room = registry.create_room(ClientId::new(), "");
        let code = room.code().clone();
        let _ = registry.remove_room(&code);
        store.calls.lock().clear();

        registry.save_room_state(&room);
        assert!(store.calls.lock().is_empty());
    }

    /// Store whose first upsert parks until released.
    struct GatedStore {
        inner: RecordingStore,
        entered: Mutex<Option<std::sync::mpsc::Sender<()>>>,
        release: Mutex<Option<std::sync::mpsc::Receiver<()>>>,
    }

    impl RoomStore for GatedStore {
        fn upsert(&self, snapshot: &RoomSnapshot) -> Result<(), PersistenceError> {
            let entered = self.entered.lock().take();
            let release = self.release.lock().take();
            if let (Some(entered), Some(release)) = (entered, release) {
                let _ = entered.send(());
                let _ = release.recv();
            }
            self.inner.upsert(snapshot)
        }

        fn fetch(&self, code: &RoomCode) -> Result<Option<StoredRoom>, PersistenceError> {
            self.inner.fetch(code)
        }

        fn delete(&self, code: &RoomCode) -> Result<(), PersistenceError> {
            self.inner.delete(code)
        }

        fn touch_activity(&self, code: &RoomCode) -> Result<(), PersistenceError> {
            self.inner.touch_activity(code)
        }
    }

    #[test]
    fn removal_waits_for_inflight_save() {
        let (entered_tx, entered_rx) = std::sync::mpsc::channel();
        let (release_tx, release_rx) = std::sync::mpsc::channel();
        let store = Arc::new(GatedStore {
            inner: RecordingStore::default(),
            entered: Mutex::new(None),
            release: Mutex::new(None),
        });
        let registry = Arc::new(RoomRegistry::with_store(store.clone()));
        let room = registry.create_room(ClientId::new(), "alice");
        let code = room.code().clone();

        *store.entered.lock() = Some(entered_tx);
        *store.release.lock() = Some(release_rx);

        let saver = {
            let registry = Arc::clone(&registry);
            let room = Arc::clone(&room);
            std::thread::spawn(move || registry.save_room_state(&room))
        };
        entered_rx.recv().unwrap();

        let remover = {
            let registry = Arc::clone(&registry);
            let code = code.clone();
            std::thread::spawn(move || registry.remove_room(&code).is_some())
        };
        std::thread::sleep(std::time::Duration::from_millis(50));
        release_tx.send(()).unwrap();

        saver.join().unwrap();
        assert!(remover.join().unwrap());
        assert!(room.is_retired());
        assert!(registry.get_room(&code).is_none());
        assert!(registry.stored_room(&code).unwrap().is_none());

        let calls = store.inner.calls.lock().clone();
        let last_upsert = calls.iter().rposition(|c| c.starts_with("upsert:")).unwrap();
        let delete = calls.iter().rposition(|c| c.starts_with("delete:")).unwrap();
        assert!(last_upsert < delete, "{calls:?}");
    }

    #[test]
    fn remove_room_for_retires_room() {
        let store = Arc::new(RecordingStore::default());
        let registry = RoomRegistry::with_store(store.clone());
        let alice = ClientId::new();
        let room = registry.create_room(alice.clone(), "");
        let code = room.code().clone();
        assert!(registry.remove_room_for(&code, &alice));
        assert!(room.is_retired());

        registry.save_room_state(&room);
        assert!(registry.stored_room(&code).unwrap().is_none());
    }

    #[test]
    fn rooms_lists_live_rooms() {
        let registry = RoomRegistry::new();
        assert!(!registry.is_durable());
        let a = registry.create_room(ClientId::new(), "");
        let _ = registry.create_bot_room(ClientId::new(), "");
        let _ = registry.remove_room(a.code());
        let rooms = registry.rooms();
        assert_eq!(rooms.len(), 1);
        assert!(rooms[0].is_bot_game());
        assert!(RoomRegistry::with_store(Arc::new(RecordingStore::default())).is_durable());
    }

    #[test]
    fn failing_store_never_breaks_gameplay() {
        let registry = RoomRegistry::with_store(Arc::new(RecordingStore::failing()));
        let room = registry.create_room(ClientId::new(), "");
        let code = room.code().clone();
        let _ = registry.join_room(&code, ClientId::new(), "").unwrap();
        assert_matches!(room.make_move(0, Seat::Two), Err(GameError::NotYourTurn));
        let _ = room.make_move(0, Seat::One).unwrap();
        registry.save_room_state(&room);
        assert!(registry.stored_room(&code).is_err());
        assert!(registry.remove_room(&code).is_some());
    }

    #[test]
    fn stored_room_without_store_is_none() {
        let registry = RoomRegistry::new();
        let code = RoomCode::parse("ABCDEF").unwrap();
        assert_eq!(registry.stored_room(&code).unwrap(), None);
    }

    #[test]
    fn concurrent_creates_and_joins() {
        let registry = Arc::new(RoomRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        let room = registry.create_room(ClientId::new(), "");
                        let _ = registry.join_room(room.code(), ClientId::new(), "").unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(registry.room_count(), 400);
    }
}
