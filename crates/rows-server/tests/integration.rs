//! End-to-end tests over real sockets.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use rows_core::{RoomCode, RoomRegistry};
use rows_server::websocket::hub::Hub;
use rows_server::{GameContext, RowsServer, ServerConfig};
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

const TIMEOUT: Duration = Duration::from_secs(5);

type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn boot(config: ServerConfig) -> (RowsServer, SocketAddr) {
    let ctx = GameContext::new(Arc::new(RoomRegistry::new()), Arc::new(Hub::new()));
    let server = RowsServer::new(config, ctx);
    let (addr, _handle) = server.listen().await.unwrap();
    (server, addr)
}

async fn connect(addr: SocketAddr) -> Ws {
    let (ws, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();
    ws
}

async fn send(ws: &mut Ws, value: Value) {
    ws.send(Message::text(value.to_string())).await.unwrap();
}

/// Next JSON message, skipping control frames.
async fn recv(ws: &mut Ws) -> Value {
    loop {
        let frame = tokio::time::timeout(TIMEOUT, ws.next())
            .await
            .expect("timed out waiting for a message")
            .expect("socket closed")
            .unwrap();
        if let Message::Text(text) = frame {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

async fn recv_type(ws: &mut Ws, kind: &str) -> Value {
    let msg = recv(ws).await;
    assert_eq!(msg["type"], kind, "unexpected message {msg}");
    msg
}

/// Two connected players in a started room: (seat 1, seat 2, code).
async fn paired(addr: SocketAddr) -> (Ws, Ws, String) {
    let mut one = connect(addr).await;
    let mut two = connect(addr).await;

    send(&mut one, json!({"type": "create_room", "player_name": "ann"})).await;
    let created = recv_type(&mut one, "room_created").await;
    let code = created["payload"]["room_code"].as_str().unwrap().to_owned();

    send(&mut two, json!({"type": "join_room", "room_code": code, "player_name": "bob"})).await;
    let _ = recv_type(&mut two, "room_joined").await;
    let start_two = recv_type(&mut two, "game_start").await;
    assert_eq!(start_two["payload"]["player_number"], 2);
    let start_one = recv_type(&mut one, "game_start").await;
    assert_eq!(start_one["payload"]["player_number"], 1);

    (one, two, code)
}

async fn play(ws: &mut Ws, column: i64) {
    send(ws, json!({"type": "move", "column": column})).await;
}

#[tokio::test]
async fn out_of_turn_move_is_rejected_before_any_move() {
    let (_server, addr) = boot(ServerConfig::default()).await;
    let (mut one, mut two, _code) = paired(addr).await;

    play(&mut two, 3).await;
    let err = recv_type(&mut two, "error").await;
    assert_eq!(err["payload"]["code"], "invalid_move");
    assert_eq!(err["payload"]["message"], "not your turn");

    play(&mut one, 3).await;
    let result = recv_type(&mut one, "move_result").await;
    assert_eq!(result["payload"]["player_number"], 1);
    assert_eq!(result["payload"]["row"], 5);
    let result = recv_type(&mut two, "move_result").await;
    assert_eq!(result["payload"]["next_player"], 2);
}

#[tokio::test]
async fn horizontal_win_on_the_bottom_row() {
    let (server, addr) = boot(ServerConfig::default()).await;
    let (mut one, mut two, code) = paired(addr).await;

    for col in 0..3 {
        play(&mut one, col).await;
        let _ = recv_type(&mut one, "move_result").await;
        let _ = recv_type(&mut two, "move_result").await;
        play(&mut two, col).await;
        let _ = recv_type(&mut one, "move_result").await;
        let _ = recv_type(&mut two, "move_result").await;
    }
    play(&mut one, 3).await;

    for ws in [&mut one, &mut two] {
        let _ = recv_type(ws, "move_result").await;
        let over = recv_type(ws, "game_over").await;
        assert_eq!(over["payload"]["winner"], 1);
        assert_eq!(over["payload"]["is_draw"], false);
        assert_eq!(
            over["payload"]["winning_cells"],
            json!([
                {"row": 5, "col": 0},
                {"row": 5, "col": 1},
                {"row": 5, "col": 2},
                {"row": 5, "col": 3}
            ])
        );
    }

    let room = server.ctx().registry.get_room(&RoomCode::parse(&code).unwrap()).unwrap();
    assert!(room.snapshot().game_over);
}

#[tokio::test]
async fn disconnect_mid_game_removes_room_and_notifies_once() {
    let (server, addr) = boot(ServerConfig::default()).await;
    let (mut one, mut two, code) = paired(addr).await;
    let code = RoomCode::parse(&code).unwrap();

    play(&mut one, 3).await;
    let _ = recv_type(&mut two, "move_result").await;

    one.close(None).await.unwrap();
    drop(one);

    let _ = recv_type(&mut two, "opponent_left").await;
    assert!(server.ctx().registry.get_room(&code).is_none());

    // Nothing else follows for this room; the next reply is to our ping.
    send(&mut two, json!({"type": "ping"})).await;
    let _ = recv_type(&mut two, "pong").await;

    play(&mut two, 2).await;
    let err = recv_type(&mut two, "error").await;
    assert_eq!(err["payload"]["code"], "room_gone");
}

#[tokio::test]
async fn third_client_cannot_join() {
    let (_server, addr) = boot(ServerConfig::default()).await;
    let (_one, _two, code) = paired(addr).await;

    let mut three = connect(addr).await;
    send(&mut three, json!({"type": "join_room", "room_code": code})).await;
    let err = recv_type(&mut three, "error").await;
    assert_eq!(err["payload"]["code"], "join_failed");
    assert_eq!(err["payload"]["message"], "room is full");
}

#[tokio::test]
async fn bot_game_answers_moves() {
    let (_server, addr) = boot(ServerConfig::default()).await;
    let mut ws = connect(addr).await;

    send(&mut ws, json!({"type": "create_bot_game", "player_name": "ann"})).await;
    let _ = recv_type(&mut ws, "room_created").await;
    let start = recv_type(&mut ws, "game_start").await;
    assert_eq!(start["payload"]["player2_name"], "Bot");

    play(&mut ws, 0).await;
    let human = recv_type(&mut ws, "move_result").await;
    assert_eq!(human["payload"]["player_number"], 1);
    let bot = recv_type(&mut ws, "move_result").await;
    assert_eq!(bot["payload"]["player_number"], 2);
    assert_eq!(bot["payload"]["next_player"], 1);
}

#[tokio::test]
async fn malformed_frames_get_error_replies() {
    let (_server, addr) = boot(ServerConfig::default()).await;
    let mut ws = connect(addr).await;

    ws.send(Message::text("not json")).await.unwrap();
    assert_eq!(recv_type(&mut ws, "error").await["payload"]["code"], "invalid_json");

    send(&mut ws, json!({"type": "teleport"})).await;
    assert_eq!(recv_type(&mut ws, "error").await["payload"]["code"], "unknown_type");

    ws.send(Message::binary(br#"{"type":"ping"}"#.to_vec())).await.unwrap();
    let _ = recv_type(&mut ws, "pong").await;
}

#[tokio::test]
async fn upgrades_past_the_limit_get_503() {
    let config = ServerConfig {
        max_connections: 1,
        ..ServerConfig::default()
    };
    let (server, addr) = boot(config).await;
    let mut first = connect(addr).await;

    send(&mut first, json!({"type": "ping"})).await;
    let _ = recv_type(&mut first, "pong").await;
    assert_eq!(server.ctx().hub.connection_count().await, 1);

    match connect_async(format!("ws://{addr}/ws")).await {
        Err(WsError::Http(resp)) => assert_eq!(resp.status().as_u16(), 503),
        Err(other) => panic!("unexpected error {other}"),
        Ok(_) => panic!("upgrade past the limit succeeded"),
    }
}

#[tokio::test]
async fn shutdown_closes_sessions() {
    let (server, addr) = boot(ServerConfig::default()).await;
    let mut ws = connect(addr).await;
    send(&mut ws, json!({"type": "ping"})).await;
    let _ = recv_type(&mut ws, "pong").await;

    server.shutdown().shutdown();

    let closed = tokio::time::timeout(TIMEOUT, async {
        while let Some(frame) = ws.next().await {
            match frame {
                Ok(Message::Close(_)) | Err(_) => return,
                Ok(_) => {}
            }
        }
    })
    .await;
    assert!(closed.is_ok());
}
