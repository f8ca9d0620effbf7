//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]`, so a settings
//! file may name any subset of fields and the rest keep their defaults.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings for the rows server.
///
/// ```json
/// {
///   "server": { "port": 9090 },
///   "storage": { "dbPath": "/var/lib/rows/rows.db" }
/// }
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RowsSettings {
    /// Listener and per-connection limits.
    pub server: ServerSettings,
    /// Durable room storage.
    pub storage: StorageSettings,
    /// Finished-game analytics.
    pub analytics: AnalyticsSettings,
    /// Log output.
    pub logging: LoggingSettings,
    /// Computer opponent.
    pub bot: BotSettings,
}

impl RowsSettings {
    /// Reject values the server cannot run with.
    pub fn validate(&self) -> Result<()> {
        let checks: [(&str, u64); 12] = [
            ("server.port", u64::from(self.server.port)),
            ("server.maxConnections", as_u64(self.server.max_connections)),
            ("server.outboundQueueCapacity", as_u64(self.server.outbound_queue_capacity)),
            ("server.pingIntervalSecs", self.server.ping_interval_secs),
            ("server.readTimeoutSecs", self.server.read_timeout_secs),
            ("server.writeTimeoutSecs", self.server.write_timeout_secs),
            ("server.maxMessageSize", as_u64(self.server.max_message_size)),
            ("storage.cleanupIntervalSecs", self.storage.cleanup_interval_secs),
            ("storage.maxInactiveSecs", self.storage.max_inactive_secs),
            ("storage.writeQueueCapacity", as_u64(self.storage.write_queue_capacity)),
            ("analytics.queueCapacity", as_u64(self.analytics.queue_capacity)),
            ("analytics.leaderboardSize", as_u64(self.analytics.leaderboard_size)),
        ];
        if let Some((name, _)) = checks.iter().find(|(_, value)| *value == 0) {
            return Err(SettingsError::InvalidValue(format!("{name} must be greater than zero")));
        }
        if self.server.read_timeout_secs <= self.server.ping_interval_secs {
            return Err(SettingsError::InvalidValue(
                "server.readTimeoutSecs must exceed server.pingIntervalSecs".to_string(),
            ));
        }
        if self.storage.enabled && self.storage.db_path.trim().is_empty() {
            return Err(SettingsError::InvalidValue("storage.dbPath is empty".to_string()));
        }
        Ok(())
    }
}

fn as_u64(n: usize) -> u64 {
    u64::try_from(n).unwrap_or(u64::MAX)
}

/// Listener and per-connection settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Listen port.
    pub port: u16,
    /// Concurrent WebSocket connections accepted before upgrades are refused.
    pub max_connections: usize,
    /// Per-connection outbound queue length. Messages past this are dropped.
    pub outbound_queue_capacity: usize,
    /// Seconds between keepalive pings.
    pub ping_interval_secs: u64,
    /// Seconds without any inbound frame before the connection is closed.
    pub read_timeout_secs: u64,
    /// Seconds allowed for a single outbound write.
    pub write_timeout_secs: u64,
    /// Largest accepted inbound frame in bytes.
    pub max_message_size: usize,
}

impl ServerSettings {
    /// Keepalive ping period.
    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs)
    }

    /// Inbound idle limit.
    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    /// Outbound write limit.
    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            max_connections: 1000,
            outbound_queue_capacity: 256,
            ping_interval_secs: 30,
            read_timeout_secs: 60,
            write_timeout_secs: 10,
            max_message_size: 64 * 1024,
        }
    }
}

/// Durable room storage settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StorageSettings {
    /// Whether rooms and analytics are written to `SQLite`.
    pub enabled: bool,
    /// Database file path.
    pub db_path: String,
    /// Seconds between inactive-room sweeps.
    pub cleanup_interval_secs: u64,
    /// Idle seconds after which a stored room is swept.
    pub max_inactive_secs: u64,
    /// Pending room writes held for the background writer.
    pub write_queue_capacity: usize,
}

impl StorageSettings {
    /// Sweep period.
    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }

    /// Idle limit for stored rooms.
    pub fn max_inactive(&self) -> Duration {
        Duration::from_secs(self.max_inactive_secs)
    }
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            db_path: "rows.db".to_string(),
            cleanup_interval_secs: 300,
            max_inactive_secs: 7200,
            write_queue_capacity: 4096,
        }
    }
}

/// Finished-game analytics settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AnalyticsSettings {
    /// Whether finished games are recorded.
    pub enabled: bool,
    /// Events buffered for the writer before new ones are dropped.
    pub queue_capacity: usize,
    /// Rows returned by `/api/leaderboard`.
    pub leaderboard_size: usize,
}

impl Default for AnalyticsSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            queue_capacity: 1024,
            leaderboard_size: 10,
        }
    }
}

/// Log output settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Filter used when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON lines instead of compact text.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Computer opponent settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BotSettings {
    /// Pause before the bot answers a move. `0` answers immediately.
    pub move_delay_ms: u64,
}

impl BotSettings {
    /// Pause before the bot answers.
    pub fn move_delay(&self) -> Duration {
        Duration::from_millis(self.move_delay_ms)
    }
}

impl Default for BotSettings {
    fn default() -> Self {
        Self { move_delay_ms: 400 }
    }
}
