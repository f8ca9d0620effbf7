//! WebSocket session lifecycle: one connected client from upgrade through
//! disconnect.
//!
//! Each session runs two pumps. The inbound pump reads frames and hands
//! them to the dispatcher in arrival order. The outbound pump drains the
//! connection's queue onto the socket and sends heartbeat pings. Whichever
//! side ends first stops the other.

use std::fmt::Display;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ws::{Message, WebSocket};
use futures::{Sink, SinkExt, Stream, StreamExt};
use metrics::{counter, gauge, histogram};
use rows_core::ClientId;
use rows_settings::ServerSettings;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::connection::ClientConnection;
use super::handler::{handle_text, leave_current_room, reply_invalid_json};
use super::protocol::ProtocolError;
use crate::context::GameContext;
use crate::metrics::{
    WS_CONNECTION_DURATION_SECONDS, WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL,
    WS_DISCONNECTIONS_TOTAL,
};

/// Per-connection timing and queue limits.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SessionConfig {
    /// Outbound queue capacity. Frames beyond it are dropped.
    pub queue_capacity: usize,
    /// Interval between server pings.
    pub ping_interval: Duration,
    /// Longest silence tolerated from the client.
    pub read_timeout: Duration,
    /// Longest a single frame write may take.
    pub write_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 256,
            ping_interval: Duration::from_secs(30),
            read_timeout: Duration::from_secs(60),
            write_timeout: Duration::from_secs(10),
        }
    }
}

impl SessionConfig {
    /// Build from server settings.
    pub fn from_settings(settings: &ServerSettings) -> Self {
        Self {
            queue_capacity: settings.outbound_queue_capacity,
            ping_interval: settings.ping_interval(),
            read_timeout: settings.read_timeout(),
            write_timeout: settings.write_timeout(),
        }
    }
}

/// Why the inbound pump stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The client sent a Close frame.
    ClientClose,
    /// The stream ended without a Close frame.
    StreamEnded,
    /// Reading failed.
    ReadError,
    /// Nothing arrived within the read timeout.
    ReadTimeout,
    /// The outbound pump failed or the server is shutting down.
    Stopped,
}

impl DisconnectReason {
    /// Metric label.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ClientClose => "client_close",
            Self::StreamEnded => "stream_ended",
            Self::ReadError => "read_error",
            Self::ReadTimeout => "read_timeout",
            Self::Stopped => "stopped",
        }
    }
}

/// Run a WebSocket session for an upgraded socket.
#[instrument(skip_all, fields(client_id = %client_id))]
pub async fn run_ws_session(
    ws: WebSocket,
    client_id: ClientId,
    ctx: GameContext,
    config: SessionConfig,
    shutdown: CancellationToken,
) -> DisconnectReason {
    let (sink, stream) = ws.split();
    run_session(sink, stream, client_id, &ctx, config, &shutdown).await
}

/// Session body over any frame sink and stream.
///
/// Cleanup always runs in the same order: leave the bound room, unregister
/// from the hub, then let the outbound pump flush and send Close.
pub async fn run_session<S, R, E>(
    sink: S,
    mut stream: R,
    client_id: ClientId,
    ctx: &GameContext,
    config: SessionConfig,
    shutdown: &CancellationToken,
) -> DisconnectReason
where
    S: Sink<Message> + Unpin + Send + 'static,
    S::Error: Display,
    R: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    let (tx, rx) = mpsc::channel(config.queue_capacity);
    let connection = Arc::new(ClientConnection::new(client_id.clone(), tx));
    ctx.hub.register(Arc::clone(&connection)).await;

    let started = Instant::now();
    info!(%client_id, "client connected");
    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);

    let stop = shutdown.child_token();
    let mut outbound = tokio::spawn(run_outbound(
        sink,
        rx,
        client_id.clone(),
        config,
        stop.clone(),
    ));

    let reason = run_inbound(&mut stream, &connection, ctx, config.read_timeout, &stop).await;
    info!(%client_id, reason = reason.as_str(), "client disconnected");

    leave_current_room(&connection, ctx).await;
    ctx.hub.unregister(&client_id).await;
    connection.close();

    let flush_budget = config.write_timeout.saturating_mul(2);
    if tokio::time::timeout(flush_budget, &mut outbound).await.is_err() {
        debug!(%client_id, "outbound pump did not finish, aborting");
        outbound.abort();
    }

    counter!(WS_DISCONNECTIONS_TOTAL, "reason" => reason.as_str()).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
    histogram!(WS_CONNECTION_DURATION_SECONDS).record(started.elapsed().as_secs_f64());
    reason
}

async fn run_inbound<R, E>(
    stream: &mut R,
    connection: &Arc<ClientConnection>,
    ctx: &GameContext,
    read_timeout: Duration,
    stop: &CancellationToken,
) -> DisconnectReason
where
    R: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    loop {
        let next = tokio::select! {
            () = stop.cancelled() => return DisconnectReason::Stopped,
            next = tokio::time::timeout(read_timeout, stream.next()) => next,
        };

        let frame = match next {
            Err(_) => {
                warn!(client_id = %connection.id, ?read_timeout, "client silent past read timeout");
                return DisconnectReason::ReadTimeout;
            }
            Ok(None) => return DisconnectReason::StreamEnded,
            Ok(Some(Err(e))) => {
                debug!(client_id = %connection.id, error = %e, "websocket read failed");
                return DisconnectReason::ReadError;
            }
            Ok(Some(Ok(frame))) => frame,
        };

        match frame {
            Message::Text(text) => handle_text(text.as_str(), connection, ctx).await,
            Message::Binary(data) => match std::str::from_utf8(&data) {
                Ok(text) => handle_text(text, connection, ctx).await,
                Err(_) => {
                    debug!(client_id = %connection.id, len = data.len(), error = %ProtocolError::NotUtf8, "rejected frame");
                    reply_invalid_json(connection);
                }
            },
            Message::Close(_) => return DisconnectReason::ClientClose,
            Message::Ping(_) | Message::Pong(_) => {}
        }
    }
}

async fn run_outbound<S>(
    mut sink: S,
    mut rx: mpsc::Receiver<Arc<str>>,
    client_id: ClientId,
    config: SessionConfig,
    stop: CancellationToken,
) where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    let mut ping = tokio::time::interval(config.ping_interval);
    ping.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let _ = ping.tick().await;

    loop {
        tokio::select! {
            queued = rx.recv() => {
                let Some(text) = queued else {
                    let _ = write_frame(&mut sink, Message::Close(None), &client_id, config.write_timeout).await;
                    break;
                };
                if !write_frame(&mut sink, Message::Text(text.as_ref().into()), &client_id, config.write_timeout).await {
                    break;
                }
                // Pings only go out on an idle socket.
                ping.reset();
            }
            _ = ping.tick() => {
                if !write_frame(&mut sink, Message::Ping(Vec::new().into()), &client_id, config.write_timeout).await {
                    break;
                }
            }
        }
    }

    // Unblock the inbound pump if the socket died on this side.
    stop.cancel();
}

async fn write_frame<S>(sink: &mut S, frame: Message, client_id: &ClientId, limit: Duration) -> bool
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    match tokio::time::timeout(limit, sink.send(frame)).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            debug!(%client_id, error = %e, "websocket write failed");
            false
        }
        Err(_) => {
            warn!(%client_id, ?limit, "websocket write timed out");
            false
        }
    }
}
