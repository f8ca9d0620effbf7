//! Message dispatch: decoded client messages to room, registry, and hub
//! operations, plus the replies and broadcasts they produce.

use std::sync::Arc;
use std::time::Duration;

use metrics::{counter, gauge};
use rows_core::{
    GameCompletedEvent, GameError, GameOutcome, MoveOutcome, RematchStatus, Room, RoomCode, Seat,
};
use tracing::{debug, info, instrument, warn};

use super::connection::ClientConnection;
use super::protocol::{
    ClientMessage, ErrorCode, REMATCH_ACCEPTED_MESSAGE, ROOM_JOINED_MESSAGE, ServerMessage,
    sanitize_name,
};
use crate::context::GameContext;
use crate::metrics::{
    GAMES_COMPLETED_TOTAL, MOVES_TOTAL, ROOMS_ACTIVE, ROOMS_CREATED_TOTAL,
    WS_MESSAGES_RECEIVED_TOTAL,
};

const PARSE_FAILED: &str = "could not parse message";
const UNKNOWN_TYPE: &str = "message type not recognized";
const MISSING_CODE: &str = "room code is required";
const NOT_IN_ROOM: &str = "you are not in a room";
const ROOM_GONE: &str = "room no longer exists";
const NOT_PLAYER: &str = "you are not a player in this room";
const MISSING_COLUMN: &str = "column is required";

/// Decode one text frame and dispatch it. Undecodable input gets an
/// `invalid_json` error and nothing else.
pub async fn handle_text(text: &str, conn: &Arc<ClientConnection>, ctx: &GameContext) {
    match ClientMessage::parse(text) {
        Ok(message) => handle_message(message, conn, ctx).await,
        Err(e) => {
            debug!(client_id = %conn.id, error = %e, "undecodable frame");
            reply_invalid_json(conn);
        }
    }
}

/// Reply `invalid_json` to a frame that could not be read as text.
pub fn reply_invalid_json(conn: &ClientConnection) {
    reply(conn, &ServerMessage::error(ErrorCode::InvalidJson, PARSE_FAILED));
}

/// Dispatch a decoded message.
#[instrument(skip_all, fields(client_id = %conn.id, kind = message.kind()))]
pub async fn handle_message(message: ClientMessage, conn: &Arc<ClientConnection>, ctx: &GameContext) {
    counter!(WS_MESSAGES_RECEIVED_TOTAL, "type" => message.kind()).increment(1);

    match message {
        ClientMessage::CreateRoom { player_name } => {
            create_room(conn, ctx, player_name.as_deref(), false).await;
        }
        ClientMessage::CreateBotGame { player_name } => {
            create_room(conn, ctx, player_name.as_deref(), true).await;
        }
        ClientMessage::JoinRoom {
            room_code,
            player_name,
        } => join_room(conn, ctx, room_code.as_deref(), player_name.as_deref()).await,
        ClientMessage::Move { column } => play_move(conn, ctx, column).await,
        ClientMessage::RematchRequest => rematch(conn, ctx).await,
        ClientMessage::Ping => reply(conn, &ServerMessage::Pong),
        ClientMessage::Pong => {}
        ClientMessage::Unknown => {
            reply(conn, &ServerMessage::error(ErrorCode::UnknownType, UNKNOWN_TYPE));
        }
    }
}

fn reply(conn: &ClientConnection, message: &ServerMessage) {
    let _ = conn.send_message(message);
}

fn record_room_count(ctx: &GameContext) {
    #[allow(clippy::cast_precision_loss)]
    gauge!(ROOMS_ACTIVE).set(ctx.registry.room_count() as f64);
}

// ─────────────────────────────────────────────────────────────────────────────
// Room lifecycle
// ─────────────────────────────────────────────────────────────────────────────

async fn create_room(
    conn: &Arc<ClientConnection>,
    ctx: &GameContext,
    player_name: Option<&str>,
    bot: bool,
) {
    leave_current_room(conn, ctx).await;

    let name = sanitize_name(player_name);
    let room = if bot {
        ctx.registry.create_bot_room(conn.id.clone(), name)
    } else {
        ctx.registry.create_room(conn.id.clone(), name)
    };
    let code = room.code().clone();

    conn.bind_room(code.clone());
    ctx.hub.attach(&code, Arc::clone(conn)).await;
    let kind = if bot { "bot" } else { "pvp" };
    counter!(ROOMS_CREATED_TOTAL, "kind" => kind).increment(1);
    record_room_count(ctx);
    info!(client_id = %conn.id, room_code = %code, bot, "client created room");

    reply(conn, &ServerMessage::RoomCreated { room_code: code });
    if bot {
        reply(conn, &ServerMessage::game_start(&room.snapshot(), Seat::One));
    }
}

async fn join_room(
    conn: &Arc<ClientConnection>,
    ctx: &GameContext,
    room_code: Option<&str>,
    player_name: Option<&str>,
) {
    let Some(code) = room_code.and_then(RoomCode::parse) else {
        reply(conn, &ServerMessage::error(ErrorCode::MissingCode, MISSING_CODE));
        return;
    };

    // Leaving first would destroy the very room being joined.
    if conn.room_code().as_ref() == Some(&code) {
        let err = rows_core::RegistryError::RoomFull(code);
        reply(conn, &ServerMessage::error(ErrorCode::JoinFailed, err.to_string()));
        return;
    }

    let room = match ctx.registry.join_room(&code, conn.id.clone(), sanitize_name(player_name)) {
        Ok(room) => room,
        Err(e) => {
            debug!(client_id = %conn.id, room_code = %code, error = %e, "join rejected");
            reply(conn, &ServerMessage::error(ErrorCode::JoinFailed, e.to_string()));
            return;
        }
    };

    leave_current_room(conn, ctx).await;
    conn.bind_room(code.clone());
    ctx.hub.attach(&code, Arc::clone(conn)).await;
    info!(client_id = %conn.id, room_code = %code, "client joined room");

    reply(
        conn,
        &ServerMessage::RoomJoined {
            room_code: code.clone(),
            message: ROOM_JOINED_MESSAGE.to_owned(),
        },
    );

    let snapshot = room.snapshot();
    let _ = ctx
        .hub
        .broadcast(&code, |member| {
            Seat::ALL
                .into_iter()
                .find(|seat| {
                    snapshot.players[seat.index()]
                        .as_ref()
                        .is_some_and(|p| p.id == member.id)
                })
                .map(|seat| ServerMessage::game_start(&snapshot, seat))
        })
        .await;
}

/// Detach from the bound room, tell the other member, and close the room.
///
/// The room is only removed from the registry when this client holds a
/// seat in the room currently registered under the code. The opponent keeps
/// its binding, so its next action reports `room_gone`.
pub async fn leave_current_room(conn: &ClientConnection, ctx: &GameContext) {
    let Some(code) = conn.take_room() else {
        return;
    };

    ctx.hub.detach(&code, &conn.id).await;
    let notified = ctx
        .hub
        .broadcast(&code, |member| {
            (member.id != conn.id).then_some(ServerMessage::OpponentLeft)
        })
        .await;
    ctx.hub.close_room(&code).await;

    let removed = ctx.registry.remove_room_for(&code, &conn.id);
    if removed {
        record_room_count(ctx);
    }
    info!(client_id = %conn.id, room_code = %code, notified, removed, "client left room");
}

/// Bound room for gameplay messages, or the matching error reply.
fn bound_room(conn: &ClientConnection, ctx: &GameContext) -> Option<Arc<Room>> {
    let Some(code) = conn.room_code() else {
        reply(conn, &ServerMessage::error(ErrorCode::NotInRoom, NOT_IN_ROOM));
        return None;
    };
    let room = ctx.registry.get_room(&code);
    if room.is_none() {
        reply(conn, &ServerMessage::error(ErrorCode::RoomGone, ROOM_GONE));
    }
    room
}

// ─────────────────────────────────────────────────────────────────────────────
// Gameplay
// ─────────────────────────────────────────────────────────────────────────────

async fn play_move(conn: &Arc<ClientConnection>, ctx: &GameContext, column: Option<i64>) {
    let Some(room) = bound_room(conn, ctx) else {
        return;
    };
    let Some(seat) = ctx.registry.seat_number_of(&room, &conn.id) else {
        reply(conn, &ServerMessage::error(ErrorCode::NotPlayer, NOT_PLAYER));
        return;
    };
    let Some(column) = column else {
        reply(conn, &ServerMessage::error(ErrorCode::InvalidMove, MISSING_COLUMN));
        return;
    };

    // Held until the broadcast is queued.
    let _turn = ctx.hub.lock_turn(room.code()).await;

    // Negative columns go through the rules check as out of range so that
    // turn-order errors still take precedence.
    let target = usize::try_from(column).unwrap_or(usize::MAX);
    let outcome = match room.make_move(target, seat) {
        Ok(outcome) => outcome,
        Err(e) => {
            let message = match e {
                GameError::ColumnOutOfRange(_) => format!("column {column} is out of range"),
                other => other.to_string(),
            };
            debug!(client_id = %conn.id, room_code = %room.code(), %message, "move rejected");
            reply(conn, &ServerMessage::error(ErrorCode::InvalidMove, message));
            return;
        }
    };

    broadcast_move(ctx, &room, &outcome).await;

    if room.is_bot_game() && !outcome.is_terminal() {
        let ctx = ctx.clone();
        drop(tokio::spawn(async move { play_bot_turn(&ctx, room).await }));
    }
}

/// Fan out an accepted move, and the result if it ended the game.
async fn broadcast_move(ctx: &GameContext, room: &Arc<Room>, outcome: &MoveOutcome) {
    let code = room.code();
    let player = if outcome.seat == Seat::Two && room.is_bot_game() { "bot" } else { "human" };
    counter!(MOVES_TOTAL, "player" => player).increment(1);

    let result = ServerMessage::move_result(outcome);
    let _ = ctx.hub.broadcast(code, |_| Some(result.clone())).await;

    if let Some(end) = &outcome.outcome {
        let over = ServerMessage::game_over(end);
        let _ = ctx.hub.broadcast(code, |_| Some(over.clone())).await;

        let label = match end {
            GameOutcome::Win { .. } => "win",
            GameOutcome::Draw => "draw",
        };
        counter!(GAMES_COMPLETED_TOTAL, "outcome" => label).increment(1);
        info!(room_code = %code, outcome = label, seat = outcome.seat.number(), "game over");
        publish_completed(ctx, room, outcome.elapsed);
    }

    ctx.registry.save_room_state(room);
}

fn publish_completed(ctx: &GameContext, room: &Room, elapsed: Duration) {
    if let Some(events) = &ctx.events {
        events.publish(GameCompletedEvent::from_snapshot(&room.snapshot(), elapsed));
    }
}

/// Answer the human's move in a bot room.
///
/// Runs on a copy of the board, outside the room lock. Gives up quietly if
/// the room closed or the state moved on during the delay.
pub async fn play_bot_turn(ctx: &GameContext, room: Arc<Room>) {
    if !ctx.bot_move_delay.is_zero() {
        tokio::time::sleep(ctx.bot_move_delay).await;
    }

    let _turn = ctx.hub.lock_turn(room.code()).await;
    let still_live = ctx
        .registry
        .get_room(room.code())
        .is_some_and(|live| Arc::ptr_eq(&live, &room));
    if !still_live {
        debug!(room_code = %room.code(), "bot room closed before its turn");
        return;
    }

    let snapshot = room.snapshot();
    if snapshot.game_over || snapshot.current_turn != Seat::Two {
        return;
    }
    let Some(column) = ctx.bot.best_move(&snapshot.board, Seat::One) else {
        return;
    };

    match room.make_move(column, Seat::Two) {
        Ok(outcome) => {
            debug!(room_code = %room.code(), column, "bot moved");
            broadcast_move(ctx, &room, &outcome).await;
        }
        Err(e) => warn!(room_code = %room.code(), column, error = %e, "bot move rejected"),
    }
}

async fn rematch(conn: &Arc<ClientConnection>, ctx: &GameContext) {
    let Some(room) = bound_room(conn, ctx) else {
        return;
    };
    let Some(seat) = ctx.registry.seat_number_of(&room, &conn.id) else {
        reply(conn, &ServerMessage::error(ErrorCode::NotPlayer, NOT_PLAYER));
        return;
    };

    let _turn = ctx.hub.lock_turn(room.code()).await;
    let mut status = match room.request_rematch(seat) {
        Ok(status) => status,
        Err(e) => {
            reply(conn, &ServerMessage::error(ErrorCode::GameNotOver, e.to_string()));
            return;
        }
    };
    if room.is_bot_game() && status == RematchStatus::Waiting {
        status = room.request_rematch(Seat::Two).unwrap_or(status);
    }

    let code = room.code();
    match status {
        RematchStatus::BothReady => {
            room.reset_game();
            ctx.registry.save_room_state(&room);
            info!(room_code = %code, "rematch accepted, board reset");
            let accepted = ServerMessage::RematchAccepted {
                message: REMATCH_ACCEPTED_MESSAGE.to_owned(),
            };
            let _ = ctx.hub.broadcast(code, |_| Some(accepted.clone())).await;
        }
        RematchStatus::Waiting => {
            info!(room_code = %code, seat = seat.number(), "rematch requested");
            let _ = ctx
                .hub
                .broadcast(code, |member| {
                    Some(ServerMessage::rematch_waiting(member.id == conn.id))
                })
                .await;
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
