//! `RowsServer`: the axum router, WebSocket upgrade, and listener.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use metrics::counter;
use metrics_exporter_prometheus::PrometheusHandle;
use rows_core::ClientId;
use rows_store::AnalyticsStore;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::api;
use crate::config::ServerConfig;
use crate::context::GameContext;
use crate::health::{self, HealthInputs, HealthResponse, RoomPhases};
use crate::metrics::WS_REJECTED_TOTAL;
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::session::run_ws_session;

/// Shared state accessible from axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Registry, hub, bot, and event sink.
    pub ctx: GameContext,
    /// Analytics queries, when storage is enabled.
    pub analytics: Option<AnalyticsStore>,
    /// Prometheus handle for `/metrics`.
    pub metrics: Option<PrometheusHandle>,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Cancelled when the server shuts down.
    pub shutdown: CancellationToken,
    /// When the server started.
    pub start_time: Instant,
}

/// The rows game server.
pub struct RowsServer {
    config: Arc<ServerConfig>,
    ctx: GameContext,
    analytics: Option<AnalyticsStore>,
    metrics: Option<PrometheusHandle>,
    shutdown: Arc<ShutdownCoordinator>,
    start_time: Instant,
}

impl RowsServer {
    /// Create a server around a game context.
    pub fn new(config: ServerConfig, ctx: GameContext) -> Self {
        Self {
            config: Arc::new(config),
            ctx,
            analytics: None,
            metrics: None,
            shutdown: Arc::new(ShutdownCoordinator::new()),
            start_time: Instant::now(),
        }
    }

    /// Serve `/api/*` from `store`.
    #[must_use]
    pub fn with_analytics(mut self, store: AnalyticsStore) -> Self {
        self.analytics = Some(store);
        self
    }

    /// Serve `/metrics` from `handle`.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Share an existing shutdown coordinator.
    #[must_use]
    pub fn with_shutdown(mut self, shutdown: Arc<ShutdownCoordinator>) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Build the axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            ctx: self.ctx.clone(),
            analytics: self.analytics.clone(),
            metrics: self.metrics.clone(),
            config: Arc::clone(&self.config),
            shutdown: self.shutdown.token(),
            start_time: self.start_time,
        };

        Router::new()
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .route("/ws", get(ws_handler))
            .route("/api/leaderboard", get(api::leaderboard))
            .route("/api/stats", get(api::stats))
            .route("/rooms/{code}", get(api::room))
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
            .with_state(state)
    }

    /// Bind and serve in the background until shutdown.
    ///
    /// Returns the bound address, which matters when the configured port
    /// is `0`.
    pub async fn listen(&self) -> io::Result<(SocketAddr, JoinHandle<()>)> {
        let listener = TcpListener::bind(self.config.bind_addr()).await?;
        let addr = listener.local_addr()?;
        let router = self.router();
        let token = self.shutdown.token();

        let handle = tokio::spawn(async move {
            let result = axum::serve(listener, router)
                .with_graceful_shutdown(async move { token.cancelled().await })
                .await;
            if let Err(e) = result {
                error!(error = %e, "server stopped with error");
            }
        });

        info!(%addr, "rows server listening");
        Ok((addr, handle))
    }

    /// The game context.
    pub fn ctx(&self) -> &GameContext {
        &self.ctx
    }

    /// The shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// The server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let rooms = state.ctx.registry.rooms();
    Json(health::health_check(HealthInputs {
        start_time: state.start_time,
        connections: state.ctx.hub.connection_count().await,
        max_connections: state.config.max_connections,
        rooms: RoomPhases::tally(rooms.iter().map(|room| &**room)),
        attended_rooms: state.ctx.hub.room_count().await,
        durable: state.ctx.registry.is_durable(),
        analytics: state.analytics.is_some(),
    }))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => crate::metrics::render(handle).into_response(),
        None => (StatusCode::SERVICE_UNAVAILABLE, "metrics recorder not installed").into_response(),
    }
}

/// GET /ws
///
/// The connection limit is checked before the upgrade, so a burst of
/// simultaneous upgrades can briefly overshoot it.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let live = state.ctx.hub.connection_count().await;
    if live >= state.config.max_connections {
        counter!(WS_REJECTED_TOTAL).increment(1);
        warn!(live, max = state.config.max_connections, "rejecting websocket upgrade");
        return (StatusCode::SERVICE_UNAVAILABLE, "too many connections").into_response();
    }

    let client_id = ClientId::new();
    ws.max_message_size(state.config.max_message_size)
        .on_upgrade(move |socket| async move {
            let _ = run_ws_session(
                socket,
                client_id,
                state.ctx,
                state.config.session,
                state.shutdown,
            )
            .await;
        })
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::websocket::hub::Hub;
    use axum::body::Body;
    use axum::http::Request;
    use metrics_exporter_prometheus::PrometheusBuilder;
    use rows_core::RoomRegistry;
    use rows_store::ConnectionConfig;
    use tower::ServiceExt;

    fn make_server() -> RowsServer {
        let ctx = GameContext::new(Arc::new(RoomRegistry::new()), Arc::new(Hub::new()));
        RowsServer::new(ServerConfig::default(), ctx)
    }

    fn analytics_store() -> AnalyticsStore {
        AnalyticsStore::new(rows_store::open(None, &ConnectionConfig::in_memory()).unwrap())
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        let status = resp.status();
        let body = axum::body::to_bytes(resp.into_body(), 64 * 1024).await.unwrap();
        let value = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn health_endpoint_reports_counts() {
        let server = make_server();
        let _ = server.ctx().registry.create_room(ClientId::new(), "ann");
        let _ = server.ctx().registry.create_bot_room(ClientId::new(), "bob");
        let (status, body) = get_json(server.router(), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["connections"], 0);
        assert_eq!(body["active_rooms"], 2);
        assert_eq!(body["rooms"]["waiting"], 1);
        assert_eq!(body["rooms"]["playing"], 1);
        assert_eq!(body["rooms"]["bot_games"], 1);
        assert_eq!(body["attended_rooms"], 0);
        assert_eq!(body["storage"], "memory");
        assert_eq!(body["analytics"], false);

        let server = make_server().with_analytics(analytics_store());
        let (_, body) = get_json(server.router(), "/health").await;
        assert_eq!(body["analytics"], true);
    }

    #[tokio::test]
    async fn unknown_route_returns_404() {
        let (status, _) = get_json(make_server().router(), "/nonexistent").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn ws_without_upgrade_headers_is_rejected() {
        let (status, _) = get_json(make_server().router(), "/ws").await;
        assert!(status.is_client_error());
    }

    #[tokio::test]
    async fn api_without_analytics_is_unavailable() {
        let server = make_server();
        let (status, body) = get_json(server.router(), "/api/leaderboard").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"], "analytics are disabled");
        let (status, _) = get_json(server.router(), "/api/stats").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn api_with_empty_analytics() {
        let server = make_server().with_analytics(analytics_store());
        let (status, body) = get_json(server.router(), "/api/leaderboard").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, serde_json::json!([]));

        let (status, body) = get_json(server.router(), "/api/stats").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total_games"], 0);
        assert_eq!(body["draws"], 0);
    }

    #[tokio::test]
    async fn room_lookup() {
        let server = make_server();
        let room = server.ctx().registry.create_room(ClientId::new(), "ann");
        let code = room.code().as_str().to_lowercase();

        let (status, body) = get_json(server.router(), &format!("/rooms/{code}")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["room_code"], room.code().as_str());
        assert_eq!(body["player1_name"], "ann");
        assert_eq!(body["source"], "live");

        let (status, body) = get_json(server.router(), "/rooms/ZZZZZZ").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "room not found");
        let (status, _) = get_json(server.router(), "/rooms/bad!").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn metrics_endpoint() {
        let (status, _) = get_json(make_server().router(), "/metrics").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        let handle = PrometheusBuilder::new().build_recorder().handle();
        let server = make_server().with_metrics(handle);
        let req = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
        let resp = server.router().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn listen_binds_and_stops_on_shutdown() {
        let server = make_server();
        let (addr, handle) = server.listen().await.unwrap();
        assert_ne!(addr.port(), 0);
        server.shutdown().shutdown();
        tokio::time::timeout(std::time::Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
