//! Durable room copies in the `rooms` table.
//!
//! The in-memory registry is authoritative; this table mirrors it so room
//! state survives for inspection and is swept once idle.

use std::time::Duration;

use chrono::{DateTime, SecondsFormat, TimeDelta, Utc};
use rows_core::board::Board;
use rows_core::{ClientId, PersistenceError, PlayerSlot, RoomCode, RoomSnapshot, RoomStore, Seat, StoredRoom};
use rusqlite::{OptionalExtension, Row, params};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::connection::ConnectionPool;
use crate::errors::{Result, StoreError};

/// Current time in the fixed-width form stored in timestamp columns.
///
/// Fixed width and a `Z` suffix keep string comparison chronological.
pub(crate) fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub(crate) fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("bad timestamp {raw:?}: {e}")))
}

/// `SQLite`-backed [`RoomStore`].
#[derive(Clone)]
pub struct SqliteRoomStore {
    pool: ConnectionPool,
}

impl SqliteRoomStore {
    /// Wrap a migrated pool.
    pub fn new(pool: ConnectionPool) -> Self {
        Self { pool }
    }

    /// Insert or replace a room. `created_at` is kept from the first insert.
    pub fn save(&self, snapshot: &RoomSnapshot) -> Result<()> {
        let conn = self.pool.get()?;
        let board = serde_json::to_string(&snapshot.board)?;
        let now = timestamp(Utc::now());
        let slot = |seat: Seat| snapshot.players[seat.index()].as_ref();
        let _ = conn.execute(
            "INSERT INTO rooms (code, player1_id, player1_name, player2_id, player2_name, board,
                                current_turn, game_started, game_over, winner, is_bot_game,
                                created_at, last_activity)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?12)
             ON CONFLICT(code) DO UPDATE SET
                player1_id = excluded.player1_id,
                player1_name = excluded.player1_name,
                player2_id = excluded.player2_id,
                player2_name = excluded.player2_name,
                board = excluded.board,
                current_turn = excluded.current_turn,
                game_started = excluded.game_started,
                game_over = excluded.game_over,
                winner = excluded.winner,
                is_bot_game = excluded.is_bot_game,
                last_activity = excluded.last_activity",
            params![
                snapshot.code.as_str(),
                slot(Seat::One).map_or("", |p| p.id.as_str()),
                slot(Seat::One).map_or("", |p| p.name.as_str()),
                slot(Seat::Two).map_or("", |p| p.id.as_str()),
                slot(Seat::Two).map_or("", |p| p.name.as_str()),
                board,
                snapshot.current_turn.number(),
                snapshot.started,
                snapshot.game_over,
                snapshot.winner.map_or(0, Seat::number),
                snapshot.is_bot_game,
                now,
            ],
        )?;
        Ok(())
    }

    /// Read a room back.
    pub fn load(&self, code: &RoomCode) -> Result<Option<StoredRoom>> {
        let conn = self.pool.get()?;
        let raw = conn
            .query_row(
                "SELECT code, player1_id, player1_name, player2_id, player2_name, board,
                        current_turn, game_started, game_over, winner, is_bot_game,
                        created_at, last_activity
                 FROM rooms WHERE code = ?1",
                params![code.as_str()],
                RawRoom::from_row,
            )
            .optional()?;
        raw.map(RawRoom::into_stored).transpose()
    }

    /// Delete a room. Returns whether a row existed.
    pub fn remove(&self, code: &RoomCode) -> Result<bool> {
        let conn = self.pool.get()?;
        let deleted = conn.execute("DELETE FROM rooms WHERE code = ?1", params![code.as_str()])?;
        Ok(deleted > 0)
    }

    /// Set `last_activity` to now.
    pub fn touch(&self, code: &RoomCode) -> Result<()> {
        let conn = self.pool.get()?;
        let _ = conn.execute(
            "UPDATE rooms SET last_activity = ?1 WHERE code = ?2",
            params![timestamp(Utc::now()), code.as_str()],
        )?;
        Ok(())
    }

    /// Delete rooms idle for longer than `max_age`. Returns how many went.
    pub fn delete_inactive(&self, max_age: Duration) -> Result<usize> {
        let Some(cutoff) = TimeDelta::from_std(max_age)
            .ok()
            .and_then(|age| Utc::now().checked_sub_signed(age))
        else {
            return Ok(0);
        };
        let conn = self.pool.get()?;
        let deleted = conn.execute(
            "DELETE FROM rooms WHERE last_activity < ?1",
            params![timestamp(cutoff)],
        )?;
        Ok(deleted)
    }

    /// Number of stored rooms.
    pub fn count(&self) -> Result<usize> {
        let conn = self.pool.get()?;
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM rooms", [], |row| row.get(0))?;
        Ok(usize::try_from(n).unwrap_or_default())
    }
}

impl RoomStore for SqliteRoomStore {
    fn upsert(&self, snapshot: &RoomSnapshot) -> std::result::Result<(), PersistenceError> {
        self.save(snapshot).map_err(|e| e.into_persistence("upsert"))
    }

    fn fetch(&self, code: &RoomCode) -> std::result::Result<Option<StoredRoom>, PersistenceError> {
        self.load(code).map_err(|e| e.into_persistence("fetch"))
    }

    fn delete(&self, code: &RoomCode) -> std::result::Result<(), PersistenceError> {
        self.remove(code)
            .map(|_| ())
            .map_err(|e| e.into_persistence("delete"))
    }

    fn touch_activity(&self, code: &RoomCode) -> std::result::Result<(), PersistenceError> {
        self.touch(code).map_err(|e| e.into_persistence("touch_activity"))
    }
}

/// Column values as read, before validation.
struct RawRoom {
    code: String,
    player_ids: [String; 2],
    player_names: [String; 2],
    board: String,
    current_turn: u8,
    started: bool,
    game_over: bool,
    winner: u8,
    is_bot_game: bool,
    created_at: String,
    last_activity: String,
}

impl RawRoom {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            code: row.get(0)?,
            player_ids: [row.get(1)?, row.get(3)?],
            player_names: [row.get(2)?, row.get(4)?],
            board: row.get(5)?,
            current_turn: row.get(6)?,
            started: row.get(7)?,
            game_over: row.get(8)?,
            winner: row.get(9)?,
            is_bot_game: row.get(10)?,
            created_at: row.get(11)?,
            last_activity: row.get(12)?,
        })
    }

    fn into_stored(self) -> Result<StoredRoom> {
        let code = RoomCode::parse(&self.code)
            .ok_or_else(|| StoreError::Corrupt(format!("bad room code {:?}", self.code)))?;
        let board: Board = serde_json::from_str(&self.board)?;
        let current_turn = Seat::try_from(self.current_turn)
            .map_err(|e| StoreError::Corrupt(e.to_string()))?;
        let winner = match self.winner {
            0 => None,
            n => Some(Seat::try_from(n).map_err(|e| StoreError::Corrupt(e.to_string()))?),
        };
        let [id1, id2] = self.player_ids;
        let [name1, name2] = self.player_names;
        let slot = |id: String, name: String| {
            (!id.is_empty()).then(|| PlayerSlot {
                id: ClientId::from_string(id),
                name,
                connected: false,
            })
        };

        Ok(StoredRoom {
            snapshot: RoomSnapshot {
                code,
                players: [slot(id1, name1), slot(id2, name2)],
                board,
                current_turn,
                started: self.started,
                game_over: self.game_over,
                winner,
                is_bot_game: self.is_bot_game,
            },
            created_at: parse_timestamp(&self.created_at)?,
            last_activity: parse_timestamp(&self.last_activity)?,
        })
    }
}

/// Periodically delete rooms idle for longer than `max_age`.
///
/// The first sweep runs one `interval` after start. Stops when `cancel` fires.
pub fn spawn_cleanup_task(
    store: SqliteRoomStore,
    interval: Duration,
    max_age: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let _ = ticker.tick().await;

        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    debug!("room cleanup task stopping");
                    break;
                }
                _ = ticker.tick() => {
                    let store = store.clone();
                    match tokio::task::spawn_blocking(move || store.delete_inactive(max_age)).await {
                        Ok(Ok(0)) => {}
                        Ok(Ok(deleted)) => info!(deleted, "cleaned up inactive rooms"),
                        Ok(Err(e)) => warn!(error = %e, "room cleanup failed"),
                        Err(e) => warn!(error = %e, "room cleanup task failed to run"),
                    }
                }
            }
        }
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ConnectionConfig;
    use rows_core::Room;

    fn store() -> SqliteRoomStore {
        let pool = crate::open(None, &ConnectionConfig::in_memory()).unwrap();
        SqliteRoomStore::new(pool)
    }

    fn sample_room() -> Room {
        Room::new(
            RoomCode::parse("SAVE12").unwrap(),
            PlayerSlot::new(ClientId::new(), "alice"),
        )
    }

    fn backdate(store: &SqliteRoomStore, code: &RoomCode, age: TimeDelta) {
        let conn = store.pool.get().unwrap();
        let _ = conn
            .execute(
                "UPDATE rooms SET last_activity = ?1 WHERE code = ?2",
                params![timestamp(Utc::now() - age), code.as_str()],
            )
            .unwrap();
    }

    #[test]
    fn save_and_load_round_trip() {
        let store = store();
        let room = sample_room();
        let snapshot = room.snapshot();
        store.save(&snapshot).unwrap();

        let stored = store.load(room.code()).unwrap().unwrap();
        assert_eq!(stored.snapshot.code, snapshot.code);
        assert_eq!(stored.snapshot.player_name(Seat::One), "alice");
        assert!(stored.snapshot.players[1].is_none());
        assert_eq!(stored.snapshot.board, snapshot.board);
        assert!(!stored.snapshot.started);
        assert!(stored.created_at <= stored.last_activity);
    }

    #[test]
    fn upsert_updates_state_and_keeps_created_at() {
        let store = store();
        let room = Room::new_bot_game(
            RoomCode::parse("BOT123").unwrap(),
            PlayerSlot::new(ClientId::new(), "alice"),
        );
        store.save(&room.snapshot()).unwrap();
        let first = store.load(room.code()).unwrap().unwrap();

        for col in 0..3 {
            let _ = room.make_move(col, Seat::One).unwrap();
            let _ = room.make_move(col, Seat::Two).unwrap();
        }
        let _ = room.make_move(3, Seat::One).unwrap();
        store.save(&room.snapshot()).unwrap();

        let second = store.load(room.code()).unwrap().unwrap();
        assert_eq!(second.created_at, first.created_at);
        assert!(second.snapshot.game_over);
        assert_eq!(second.snapshot.winner, Some(Seat::One));
        assert!(second.snapshot.is_bot_game);
        assert_eq!(second.snapshot.board.get(5, 3), Some(Seat::One));
        assert_eq!(second.snapshot.board.check_win(5, 3, Seat::One).map(|c| c.len()), Some(4));
        assert_eq!(second.snapshot.player_name(Seat::Two), "Bot");
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn load_missing_is_none() {
        let store = store();
        assert!(store.load(&RoomCode::parse("NONE00").unwrap()).unwrap().is_none());
    }

    #[test]
    fn remove_reports_existence() {
        let store = store();
        let room = sample_room();
        store.save(&room.snapshot()).unwrap();
        assert!(store.remove(room.code()).unwrap());
        assert!(!store.remove(room.code()).unwrap());
        assert!(store.load(room.code()).unwrap().is_none());
    }

    #[test]
    fn touch_moves_last_activity_forward() {
        let store = store();
        let room = sample_room();
        store.save(&room.snapshot()).unwrap();
        backdate(&store, room.code(), TimeDelta::hours(1));
        let before = store.load(room.code()).unwrap().unwrap().last_activity;
        store.touch(room.code()).unwrap();
        let after = store.load(room.code()).unwrap().unwrap().last_activity;
        assert!(after > before);
    }

    #[test]
    fn delete_inactive_only_removes_stale_rooms() {
        let store = store();
        let stale = sample_room();
        let fresh = Room::new(
            RoomCode::parse("FRESH2").unwrap(),
            PlayerSlot::new(ClientId::new(), "bob"),
        );
        store.save(&stale.snapshot()).unwrap();
        store.save(&fresh.snapshot()).unwrap();
        backdate(&store, stale.code(), TimeDelta::hours(3));

        assert_eq!(store.delete_inactive(Duration::from_secs(2 * 60 * 60)).unwrap(), 1);
        assert!(store.load(stale.code()).unwrap().is_none());
        assert!(store.load(fresh.code()).unwrap().is_some());
    }

    #[test]
    fn trait_methods_delegate() {
        let store = store();
        let room = sample_room();
        let dyn_store: &dyn RoomStore = &store;
        dyn_store.upsert(&room.snapshot()).unwrap();
        dyn_store.touch_activity(room.code()).unwrap();
        assert!(dyn_store.fetch(room.code()).unwrap().is_some());
        dyn_store.delete(room.code()).unwrap();
        dyn_store.delete(room.code()).unwrap();
        assert!(dyn_store.fetch(room.code()).unwrap().is_none());
    }

    #[test]
    fn corrupt_board_is_reported() {
        let store = store();
        let room = sample_room();
        store.save(&room.snapshot()).unwrap();
        {
            let conn = store.pool.get().unwrap();
            let _ = conn
                .execute("UPDATE rooms SET board = '[[9]]' WHERE code = ?1", params![room.code().as_str()])
                .unwrap();
        }
        assert!(store.load(room.code()).is_err());
        assert!(RoomStore::fetch(&store, room.code()).is_err());
    }

    #[tokio::test]
    async fn cleanup_task_sweeps_and_stops() {
        let store = store();
        let room = sample_room();
        store.save(&room.snapshot()).unwrap();
        backdate(&store, room.code(), TimeDelta::hours(3));

        let cancel = CancellationToken::new();
        let handle = spawn_cleanup_task(
            store.clone(),
            Duration::from_millis(20),
            Duration::from_secs(60 * 60),
            cancel.clone(),
        );

        let mut swept = false;
        for _ in 0..100 {
            tokio::time::sleep(Duration::from_millis(20)).await;
            if store.count().unwrap() == 0 {
                swept = true;
                break;
            }
        }
        cancel.cancel();
        handle.await.unwrap();
        assert!(swept, "stale room was not cleaned up");
    }
}
