//! Read-only HTTP endpoints: leaderboard, daily stats, and room lookup.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use rows_core::{RoomCode, RoomSnapshot, Seat};
use rows_store::{AnalyticsStore, DailyStats, LeaderboardEntry};
use serde::Serialize;
use tracing::warn;

use crate::server::AppState;

/// Failure of an HTTP API request.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// No such room, live or stored.
    #[error("room not found")]
    RoomNotFound,
    /// Analytics storage is switched off or failed to open.
    #[error("analytics are disabled")]
    AnalyticsDisabled,
    /// A storage query failed.
    #[error("storage query failed")]
    Storage(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::RoomNotFound => StatusCode::NOT_FOUND,
            Self::AnalyticsDisabled => StatusCode::SERVICE_UNAVAILABLE,
            Self::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let Self::Storage(detail) = &self {
            warn!(error = %detail, "api storage query failed");
        }
        let body = serde_json::json!({ "error": self.to_string() });
        (self.status(), Json(body)).into_response()
    }
}

/// Public view of a room. Player identities are not exposed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RoomView {
    /// Room code.
    pub room_code: RoomCode,
    /// Seat 1 display name.
    pub player1_name: String,
    /// Seat 2 display name, empty while waiting.
    pub player2_name: String,
    /// Grid as seat numbers, `0` for empty.
    pub board: rows_core::Board,
    /// Seat to move.
    pub current_turn: Seat,
    /// Whether both seats have been filled.
    pub started: bool,
    /// Whether the current game has ended.
    pub game_over: bool,
    /// Winning seat number, if any.
    pub winner: Option<Seat>,
    /// Whether seat 2 is the bot.
    pub is_bot_game: bool,
    /// `"live"` or `"stored"`.
    pub source: &'static str,
}

impl RoomView {
    fn from_snapshot(snapshot: &RoomSnapshot, source: &'static str) -> Self {
        Self {
            room_code: snapshot.code.clone(),
            player1_name: snapshot.player_name(Seat::One).to_owned(),
            player2_name: snapshot.player_name(Seat::Two).to_owned(),
            board: snapshot.board,
            current_turn: snapshot.current_turn,
            started: snapshot.started,
            game_over: snapshot.game_over,
            winner: snapshot.winner,
            is_bot_game: snapshot.is_bot_game,
            source,
        }
    }
}

async fn query<T, F>(state: &AppState, f: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&AnalyticsStore) -> rows_store::Result<T> + Send + 'static,
{
    let store = state.analytics.clone().ok_or(ApiError::AnalyticsDisabled)?;
    tokio::task::spawn_blocking(move || f(&store))
        .await
        .map_err(|e| ApiError::Storage(e.to_string()))?
        .map_err(|e| ApiError::Storage(e.to_string()))
}

/// GET /api/leaderboard
pub async fn leaderboard(
    State(state): State<AppState>,
) -> Result<Json<Vec<LeaderboardEntry>>, ApiError> {
    let limit = state.config.leaderboard_size;
    query(&state, move |store| store.leaderboard(limit)).await.map(Json)
}

/// GET /api/stats
pub async fn stats(State(state): State<AppState>) -> Result<Json<DailyStats>, ApiError> {
    query(&state, AnalyticsStore::today).await.map(Json)
}

/// GET /rooms/{code}
pub async fn room(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<RoomView>, ApiError> {
    let code = RoomCode::parse(&code).ok_or(ApiError::RoomNotFound)?;

    if let Some(room) = state.ctx.registry.get_room(&code) {
        return Ok(Json(RoomView::from_snapshot(&room.snapshot(), "live")));
    }

    let registry = state.ctx.registry.clone();
    let stored = tokio::task::spawn_blocking(move || registry.stored_room(&code))
        .await
        .map_err(|e| ApiError::Storage(e.to_string()))?
        .map_err(|e| ApiError::Storage(e.to_string()))?;

    stored
        .map(|stored| Json(RoomView::from_snapshot(&stored.snapshot, "stored")))
        .ok_or(ApiError::RoomNotFound)
}
