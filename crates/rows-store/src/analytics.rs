//! Finished-game history and aggregates.
//!
//! Every recorded game adds one `game_events` row and folds into the
//! `daily_stats` row for its UTC date, in one transaction.

use chrono::{NaiveDate, Utc};
use rows_core::GameCompletedEvent;
use rows_core::room::BOT_NAME;
use rusqlite::{OptionalExtension, params};
use serde::Serialize;

use crate::connection::ConnectionPool;
use crate::errors::Result;
use crate::rooms::{parse_timestamp, timestamp};

/// A stored finished game.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GameRecord {
    /// Row ID.
    pub id: i64,
    /// Room the game was played in.
    pub room_code: String,
    /// Seat 1 display name.
    pub player1_name: String,
    /// Seat 2 display name.
    pub player2_name: String,
    /// Winning seat number, `0` for a draw.
    pub winner: u8,
    /// Whether seat 2 was the bot.
    pub is_bot_game: bool,
    /// Game length.
    pub duration_seconds: u64,
    /// When the game ended.
    pub completed_at: chrono::DateTime<Utc>,
}

/// Totals for one UTC day.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct DailyStats {
    /// `YYYY-MM-DD`.
    pub date: String,
    /// Games finished that day.
    pub total_games: u64,
    /// Of which against the bot.
    pub bot_games: u64,
    /// Of which drawn.
    pub draws: u64,
    /// Mean game length.
    pub avg_duration_seconds: f64,
}

/// One leaderboard row.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LeaderboardEntry {
    /// Display name.
    pub player_name: String,
    /// Games won.
    pub wins: u64,
    /// Games played.
    pub games: u64,
    /// `wins / games`.
    pub win_rate: f64,
}

fn to_u64(n: i64) -> u64 {
    u64::try_from(n).unwrap_or_default()
}

fn date_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Read/write access to game analytics tables.
#[derive(Clone)]
pub struct AnalyticsStore {
    pool: ConnectionPool,
}

impl AnalyticsStore {
    /// Wrap a migrated pool.
    pub fn new(pool: ConnectionPool) -> Self {
        Self { pool }
    }

    /// Store a finished game and update its day's totals. Returns the row ID.
    pub fn record_game(&self, event: &GameCompletedEvent) -> Result<i64> {
        let conn = self.pool.get()?;
        let tx = conn.unchecked_transaction()?;
        let duration = i64::try_from(event.duration_seconds).unwrap_or(i64::MAX);
        #[allow(clippy::cast_precision_loss)]
        let duration_f = duration as f64;

        let _ = tx.execute(
            "INSERT INTO game_events (room_code, player1_name, player2_name, winner,
                                      is_bot_game, duration_seconds, completed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                event.room_code.as_str(),
                event.player1_name,
                event.player2_name,
                event.winner,
                event.is_bot_game,
                duration,
                timestamp(event.timestamp),
            ],
        )?;
        let id = tx.last_insert_rowid();

        let _ = tx.execute(
            "INSERT INTO daily_stats (date, total_games, bot_games, draws, avg_duration_seconds)
             VALUES (?1, 1, ?2, ?3, ?4)
             ON CONFLICT(date) DO UPDATE SET
                avg_duration_seconds = (avg_duration_seconds * total_games + excluded.avg_duration_seconds)
                                       / (total_games + 1),
                total_games = total_games + 1,
                bot_games = bot_games + excluded.bot_games,
                draws = draws + excluded.draws",
            params![
                date_key(event.timestamp.date_naive()),
                i64::from(event.is_bot_game),
                i64::from(event.is_draw()),
                duration_f,
            ],
        )?;

        tx.commit()?;
        Ok(id)
    }

    /// Totals for `date`; zeros when nothing was played.
    pub fn daily_stats(&self, date: NaiveDate) -> Result<DailyStats> {
        let key = date_key(date);
        let conn = self.pool.get()?;
        let stats = conn
            .query_row(
                "SELECT total_games, bot_games, draws, avg_duration_seconds
                 FROM daily_stats WHERE date = ?1",
                params![key],
                |row| {
                    Ok(DailyStats {
                        date: key.clone(),
                        total_games: to_u64(row.get(0)?),
                        bot_games: to_u64(row.get(1)?),
                        draws: to_u64(row.get(2)?),
                        avg_duration_seconds: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(stats.unwrap_or(DailyStats {
            date: key,
            ..DailyStats::default()
        }))
    }

    /// Totals for the current UTC day.
    pub fn today(&self) -> Result<DailyStats> {
        self.daily_stats(Utc::now().date_naive())
    }

    /// Most recent games first.
    pub fn recent_games(&self, limit: usize) -> Result<Vec<GameRecord>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT id, room_code, player1_name, player2_name, winner, is_bot_game,
                    duration_seconds, completed_at
             FROM game_events ORDER BY completed_at DESC, id DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![i64::try_from(limit).unwrap_or(i64::MAX)], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, u8>(4)?,
                row.get::<_, bool>(5)?,
                row.get::<_, i64>(6)?,
                row.get::<_, String>(7)?,
            ))
        })?;

        let mut games = Vec::new();
        for row in rows {
            let (id, room_code, player1_name, player2_name, winner, is_bot_game, duration, completed) =
                row?;
            games.push(GameRecord {
                id,
                room_code,
                player1_name,
                player2_name,
                winner,
                is_bot_game,
                duration_seconds: to_u64(duration),
                completed_at: parse_timestamp(&completed)?,
            });
        }
        Ok(games)
    }

    /// Top players by wins. Unnamed players and the bot are left out.
    pub fn leaderboard(&self, limit: usize) -> Result<Vec<LeaderboardEntry>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "WITH appearances AS (
                SELECT player1_name AS name, CASE WHEN winner = 1 THEN 1 ELSE 0 END AS won
                FROM game_events
                UNION ALL
                SELECT player2_name, CASE WHEN winner = 2 THEN 1 ELSE 0 END
                FROM game_events WHERE is_bot_game = 0
             )
             SELECT name, SUM(won) AS wins, COUNT(*) AS games
             FROM appearances
             WHERE name <> '' AND name <> ?2
             GROUP BY name
             ORDER BY wins DESC, games ASC, name ASC
             LIMIT ?1",
        )?;
        let rows = stmt.query_map(
            params![i64::try_from(limit).unwrap_or(i64::MAX), BOT_NAME],
            |row| {
                let wins = to_u64(row.get(1)?);
                let games = to_u64(row.get(2)?);
                #[allow(clippy::cast_precision_loss)]
                let win_rate = if games == 0 { 0.0 } else { wins as f64 / games as f64 };
                Ok(LeaderboardEntry {
                    player_name: row.get(0)?,
                    wins,
                    games,
                    win_rate,
                })
            },
        )?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
