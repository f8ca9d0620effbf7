//! Server configuration.

use rows_settings::RowsSettings;

use crate::websocket::session::SessionConfig;

/// Listener, upgrade, and session limits for [`crate::server::RowsServer`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerConfig {
    /// Host to bind.
    pub host: String,
    /// Port to bind (`0` for auto-assign).
    pub port: u16,
    /// Upgrades past this many live connections get 503.
    pub max_connections: usize,
    /// Max WebSocket message size in bytes.
    pub max_message_size: usize,
    /// Rows returned by `/api/leaderboard`.
    pub leaderboard_size: usize,
    /// Per-connection session settings.
    pub session: SessionConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            max_connections: 1000,
            max_message_size: 64 * 1024,
            leaderboard_size: 10,
            session: SessionConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Build from loaded settings.
    pub fn from_settings(settings: &RowsSettings) -> Self {
        Self {
            host: settings.server.host.clone(),
            port: settings.server.port,
            max_connections: settings.server.max_connections,
            max_message_size: settings.server.max_message_size,
            leaderboard_size: settings.analytics.leaderboard_size,
            session: SessionConfig::from_settings(&settings.server),
        }
    }

    /// `host:port` for binding.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
