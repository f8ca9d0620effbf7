//! JSON wire format.
//!
//! Inbound frames are flat objects keyed by `type`. Outbound frames wrap
//! their fields in a `payload` object, which is left out for `opponent_left`
//! and `pong`.

use rows_core::{CellPos, GameOutcome, MoveOutcome, RoomCode, RoomSnapshot, Seat};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Longest display name kept, in characters.
pub const MAX_NAME_CHARS: usize = 24;

/// Sent to the joiner once seated.
pub const ROOM_JOINED_MESSAGE: &str = "waiting for game to start";
/// Sent to the player who asked for a rematch.
pub const REMATCH_INITIATOR_MESSAGE: &str = "Waiting for opponent to accept rematch...";
/// Sent to the other player.
pub const REMATCH_OPPONENT_MESSAGE: &str = "Opponent requested a rematch!";
/// Sent to both players when the board resets.
pub const REMATCH_ACCEPTED_MESSAGE: &str = "Both players agreed! Starting new game...";

/// A decoded client frame.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Open a room and wait for an opponent.
    CreateRoom {
        /// Display name.
        #[serde(default)]
        player_name: Option<String>,
    },
    /// Open a room against the bot.
    CreateBotGame {
        /// Display name.
        #[serde(default)]
        player_name: Option<String>,
    },
    /// Take seat 2 of an existing room.
    JoinRoom {
        /// Code of the room to join.
        #[serde(default)]
        room_code: Option<String>,
        /// Display name.
        #[serde(default)]
        player_name: Option<String>,
    },
    /// Drop a piece.
    Move {
        /// Target column. Signed so out-of-range input reaches the rules check.
        #[serde(default)]
        column: Option<i64>,
    },
    /// Vote to play again after a finished game.
    RematchRequest,
    /// Application-level ping; answered with `pong`.
    Ping,
    /// Application-level pong; ignored.
    Pong,
    /// Any other `type` value.
    #[serde(other)]
    Unknown,
}

impl ClientMessage {
    /// Decode one text frame.
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(text).map_err(ProtocolError::Decode)
    }

    /// Wire name of the message type, for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CreateRoom { .. } => "create_room",
            Self::CreateBotGame { .. } => "create_bot_game",
            Self::JoinRoom { .. } => "join_room",
            Self::Move { .. } => "move",
            Self::RematchRequest => "rematch_request",
            Self::Ping => "ping",
            Self::Pong => "pong",
            Self::Unknown => "unknown",
        }
    }
}

/// Failure to turn a frame into a [`ClientMessage`].
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Not JSON, or missing/ill-typed fields.
    #[error("could not parse message: {0}")]
    Decode(#[source] serde_json::Error),
    /// Binary frame that is not UTF-8.
    #[error("binary frame is not valid UTF-8")]
    NotUtf8,
}

/// `error.code` values.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Undecodable input.
    InvalidJson,
    /// Unrecognised `type`.
    UnknownType,
    /// `join_room` without a code.
    MissingCode,
    /// Room not found or full.
    JoinFailed,
    /// The client is not bound to a room.
    NotInRoom,
    /// The bound room no longer exists.
    RoomGone,
    /// A rule violation.
    InvalidMove,
    /// Rematch requested mid-game.
    GameNotOver,
    /// The caller holds no seat in the room.
    NotPlayer,
}

/// A frame sent to a client.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Reply to `create_room` / `create_bot_game`.
    RoomCreated {
        /// New room's code.
        room_code: RoomCode,
    },
    /// Reply to a successful `join_room`.
    RoomJoined {
        /// Joined room's code.
        room_code: RoomCode,
        /// Human-readable status.
        message: String,
    },
    /// Both seats are filled; sent per recipient.
    GameStart {
        /// Room code.
        room_code: RoomCode,
        /// Recipient's seat number.
        player_number: u8,
        /// Seat 1 display name.
        player1_name: String,
        /// Seat 2 display name.
        player2_name: String,
    },
    /// An accepted move.
    MoveResult {
        /// Column played.
        column: usize,
        /// Landing row.
        row: usize,
        /// Seat that moved.
        player_number: u8,
        /// Seat to move next. Unchanged when the move ended the game.
        next_player: u8,
        /// Always `true`; rejected moves get an `error` instead.
        valid: bool,
    },
    /// The game ended.
    GameOver {
        /// Winning seat, `0` for a draw.
        winner: u8,
        /// The winning run; omitted for a draw.
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        winning_cells: Vec<CellPos>,
        /// Whether the board filled with no winner.
        is_draw: bool,
    },
    /// One rematch vote is in.
    RematchWaiting {
        /// Human-readable status.
        message: String,
        /// Whether the recipient cast the vote.
        is_initiator: bool,
    },
    /// Both votes are in; the board has been reset.
    RematchAccepted {
        /// Human-readable status.
        message: String,
    },
    /// The other player disconnected; the room is closed.
    OpponentLeft,
    /// A request was rejected.
    Error {
        /// Machine-readable reason.
        code: ErrorCode,
        /// Human-readable reason.
        message: String,
    },
    /// Reply to `ping`.
    Pong,
}

impl ServerMessage {
    /// An `error` frame.
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Error {
            code,
            message: message.into(),
        }
    }

    /// `game_start` as seen from `seat`.
    pub fn game_start(snapshot: &RoomSnapshot, seat: Seat) -> Self {
        Self::GameStart {
            room_code: snapshot.code.clone(),
            player_number: seat.number(),
            player1_name: snapshot.player_name(Seat::One).to_owned(),
            player2_name: snapshot.player_name(Seat::Two).to_owned(),
        }
    }

    /// `move_result` for an accepted move.
    pub fn move_result(outcome: &MoveOutcome) -> Self {
        Self::MoveResult {
            column: outcome.column,
            row: outcome.row,
            player_number: outcome.seat.number(),
            next_player: outcome.next_turn.number(),
            valid: true,
        }
    }

    /// `game_over` for a finished game.
    pub fn game_over(outcome: &GameOutcome) -> Self {
        match outcome {
            GameOutcome::Win { winner, cells } => Self::GameOver {
                winner: winner.number(),
                winning_cells: cells.clone(),
                is_draw: false,
            },
            GameOutcome::Draw => Self::GameOver {
                winner: 0,
                winning_cells: Vec::new(),
                is_draw: true,
            },
        }
    }

    /// `rematch_waiting` for the voter or the other seat.
    pub fn rematch_waiting(is_initiator: bool) -> Self {
        let message = if is_initiator {
            REMATCH_INITIATOR_MESSAGE
        } else {
            REMATCH_OPPONENT_MESSAGE
        };
        Self::RematchWaiting {
            message: message.to_owned(),
            is_initiator,
        }
    }

    /// Wire name of the message type.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::RoomCreated { .. } => "room_created",
            Self::RoomJoined { .. } => "room_joined",
            Self::GameStart { .. } => "game_start",
            Self::MoveResult { .. } => "move_result",
            Self::GameOver { .. } => "game_over",
            Self::RematchWaiting { .. } => "rematch_waiting",
            Self::RematchAccepted { .. } => "rematch_accepted",
            Self::OpponentLeft => "opponent_left",
            Self::Error { .. } => "error",
            Self::Pong => "pong",
        }
    }

    /// Serialize once for fan-out.
    pub fn to_json(&self) -> Result<std::sync::Arc<str>, serde_json::Error> {
        serde_json::to_string(self).map(Into::into)
    }
}

/// Trim a client-supplied name and cap it at [`MAX_NAME_CHARS`].
pub fn sanitize_name(raw: Option<&str>) -> String {
    raw.map(str::trim)
        .unwrap_or_default()
        .chars()
        .take(MAX_NAME_CHARS)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::{Value, json};

    fn to_value(msg: &ServerMessage) -> Value {
        serde_json::to_value(msg).unwrap()
    }

    #[test]
    fn parses_each_inbound_type() {
        assert_eq!(
            ClientMessage::parse(r#"{"type":"create_room","player_name":"ann"}"#).unwrap(),
            ClientMessage::CreateRoom { player_name: Some("ann".into()) }
        );
        assert_eq!(
            ClientMessage::parse(r#"{"type":"create_bot_game"}"#).unwrap(),
            ClientMessage::CreateBotGame { player_name: None }
        );
        assert_eq!(
            ClientMessage::parse(r#"{"type":"join_room","room_code":"ABC234"}"#).unwrap(),
            ClientMessage::JoinRoom { room_code: Some("ABC234".into()), player_name: None }
        );
        assert_eq!(
            ClientMessage::parse(r#"{"type":"move","column":3}"#).unwrap(),
            ClientMessage::Move { column: Some(3) }
        );
        assert_eq!(
            ClientMessage::parse(r#"{"type":"rematch_request","room_code":"X"}"#).unwrap(),
            ClientMessage::RematchRequest
        );
        assert_eq!(ClientMessage::parse(r#"{"type":"ping"}"#).unwrap(), ClientMessage::Ping);
        assert_eq!(ClientMessage::parse(r#"{"type":"pong"}"#).unwrap(), ClientMessage::Pong);
    }

    #[test]
    fn unknown_type_is_not_a_decode_error() {
        let msg = ClientMessage::parse(r#"{"type":"teleport","column":1}"#).unwrap();
        assert_eq!(msg, ClientMessage::Unknown);
        assert_eq!(msg.kind(), "unknown");
    }

    #[test]
    fn malformed_input_is_a_decode_error() {
        assert_matches!(ClientMessage::parse("not json"), Err(ProtocolError::Decode(_)));
        assert_matches!(ClientMessage::parse(r#"{"column":1}"#), Err(ProtocolError::Decode(_)));
        assert_matches!(
            ClientMessage::parse(r#"{"type":"move","column":"three"}"#),
            Err(ProtocolError::Decode(_))
        );
    }

    #[test]
    fn negative_column_survives_decoding() {
        assert_eq!(
            ClientMessage::parse(r#"{"type":"move","column":-1}"#).unwrap(),
            ClientMessage::Move { column: Some(-1) }
        );
    }

    #[test]
    fn envelope_has_payload() {
        let msg = ServerMessage::RoomCreated { room_code: RoomCode::parse("ABC234").unwrap() };
        assert_eq!(to_value(&msg), json!({"type": "room_created", "payload": {"room_code": "ABC234"}}));
    }

    #[test]
    fn payloadless_messages_omit_payload() {
        assert_eq!(to_value(&ServerMessage::OpponentLeft), json!({"type": "opponent_left"}));
        assert_eq!(to_value(&ServerMessage::Pong), json!({"type": "pong"}));
    }

    #[test]
    fn error_frame_shape() {
        let msg = ServerMessage::error(ErrorCode::InvalidMove, "not your turn");
        assert_eq!(
            to_value(&msg),
            json!({"type": "error", "payload": {"code": "invalid_move", "message": "not your turn"}})
        );
    }

    #[test]
    fn game_over_omits_cells_for_draw() {
        let draw = to_value(&ServerMessage::game_over(&GameOutcome::Draw));
        assert_eq!(draw, json!({"type": "game_over", "payload": {"winner": 0, "is_draw": true}}));

        let win = ServerMessage::game_over(&GameOutcome::Win {
            winner: Seat::Two,
            cells: vec![CellPos { row: 5, col: 0 }, CellPos { row: 5, col: 1 }],
        });
        let win = to_value(&win);
        assert_eq!(win["payload"]["winner"], 2);
        assert_eq!(win["payload"]["winning_cells"][1], json!({"row": 5, "col": 1}));
        assert_eq!(win["payload"]["is_draw"], false);
    }

    #[test]
    fn rematch_waiting_texts() {
        assert_eq!(
            ServerMessage::rematch_waiting(true),
            ServerMessage::RematchWaiting {
                message: REMATCH_INITIATOR_MESSAGE.into(),
                is_initiator: true
            }
        );
        assert_eq!(to_value(&ServerMessage::rematch_waiting(false))["payload"]["message"], REMATCH_OPPONENT_MESSAGE);
    }

    #[test]
    fn kinds_match_serialized_tags() {
        let samples = [
            ServerMessage::Pong,
            ServerMessage::OpponentLeft,
            ServerMessage::error(ErrorCode::NotInRoom, "x"),
            ServerMessage::rematch_waiting(true),
            ServerMessage::game_over(&GameOutcome::Draw),
        ];
        for msg in samples {
            assert_eq!(to_value(&msg)["type"], msg.kind());
        }
    }

    #[test]
    fn names_are_trimmed_and_capped() {
        assert_eq!(sanitize_name(Some("  ann  ")), "ann");
        assert_eq!(sanitize_name(None), "");
        let long = "é".repeat(40);
        assert_eq!(sanitize_name(Some(&long)).chars().count(), MAX_NAME_CHARS);
    }
}
