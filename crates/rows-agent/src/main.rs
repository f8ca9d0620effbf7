//! # rows-agent
//!
//! The `rows` binary: loads settings, opens storage, and starts the
//! HTTP/WebSocket game server.

#![deny(unsafe_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use rows_core::RoomRegistry;
use rows_server::metrics::install_recorder;
use rows_server::shutdown::wait_for_signal;
use rows_server::websocket::hub::Hub;
use rows_server::{GameContext, RowsServer, ServerConfig, ShutdownCoordinator};
use rows_settings::{RowsSettings, StorageSettings};
use rows_store::{
    AnalyticsSink, AnalyticsStore, ConnectionConfig, ConnectionPool, QueuedRoomStore,
    SqliteRoomStore, spawn_cleanup_task,
};
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Two-player rows game server.
#[derive(Parser, Debug)]
#[command(name = "rows", about = "Two-player rows game server")]
struct Cli {
    /// Settings file (default `$ROWS_SETTINGS` or `~/.rows/settings.json`).
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Host to bind.
    #[arg(long)]
    host: Option<String>,

    /// Port to bind.
    #[arg(long)]
    port: Option<u16>,

    /// Path to the `SQLite` database.
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Keep rooms in memory only.
    #[arg(long)]
    no_storage: bool,

    /// Log filter used when `RUST_LOG` is unset.
    #[arg(long)]
    log_level: Option<String>,
}

impl Cli {
    /// Flags win over the file and env layers.
    fn apply(&self, settings: &mut RowsSettings) {
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(path) = &self.db_path {
            settings.storage.db_path = path.to_string_lossy().into_owned();
        }
        if self.no_storage {
            settings.storage.enabled = false;
        }
        if let Some(level) = &self.log_level {
            settings.logging.level.clone_from(level);
        }
    }
}

fn load_settings(cli: &Cli) -> Result<RowsSettings> {
    let path = cli
        .settings
        .clone()
        .unwrap_or_else(rows_settings::settings_path);
    let mut settings = rows_settings::load_settings_from_path(&path)
        .with_context(|| format!("Failed to load settings from {}", path.display()))?;
    cli.apply(&mut settings);
    settings.validate().context("Invalid settings")?;
    Ok(settings)
}

fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    Ok(())
}

fn open_file_pool(path: &str) -> Result<ConnectionPool> {
    ensure_parent_dir(Path::new(path))?;
    rows_store::open(Some(path), &ConnectionConfig::default())
        .with_context(|| format!("Failed to open database {path}"))
}

/// File-backed pool, or `None` to run in memory.
fn open_durable(storage: &StorageSettings) -> Option<ConnectionPool> {
    if !storage.enabled {
        info!("storage disabled, rooms kept in memory only");
        return None;
    }
    match open_file_pool(&storage.db_path) {
        Ok(pool) => {
            info!(path = %storage.db_path, "database opened");
            Some(pool)
        }
        Err(e) => {
            warn!(error = %format!("{e:#}"), "database unavailable, running in memory only");
            None
        }
    }
}

/// Analytics share the durable pool, else get a private in-memory one.
fn open_analytics(settings: &RowsSettings, durable: Option<&ConnectionPool>) -> Option<AnalyticsStore> {
    if !settings.analytics.enabled {
        info!("analytics disabled");
        return None;
    }
    if let Some(pool) = durable {
        return Some(AnalyticsStore::new(pool.clone()));
    }
    match rows_store::open(None, &ConnectionConfig::in_memory()) {
        Ok(pool) => Some(AnalyticsStore::new(pool)),
        Err(e) => {
            warn!(error = %e, "in-memory analytics store failed, analytics disabled");
            None
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = load_settings(&cli)?;
    rows_core::logging::init_subscriber(&settings.logging.level, settings.logging.json);
    info!(version = env!("CARGO_PKG_VERSION"), "starting rows server");

    let shutdown = Arc::new(ShutdownCoordinator::new());
    let mut tasks: Vec<JoinHandle<()>> = Vec::new();

    let durable = open_durable(&settings.storage);
    let registry = match &durable {
        Some(pool) => {
            let store = SqliteRoomStore::new(pool.clone());
            tasks.push(spawn_cleanup_task(
                store.clone(),
                settings.storage.cleanup_interval(),
                settings.storage.max_inactive(),
                shutdown.token(),
            ));
            let (queued, writer) = QueuedRoomStore::spawn(
                Arc::new(store),
                settings.storage.write_queue_capacity,
                shutdown.token(),
            );
            tasks.push(writer);
            RoomRegistry::with_store(Arc::new(queued))
        }
        None => RoomRegistry::new(),
    };

    let mut ctx = GameContext::new(Arc::new(registry), Arc::new(Hub::new()))
        .with_bot_move_delay(settings.bot.move_delay());

    let analytics = open_analytics(&settings, durable.as_ref());
    if let Some(store) = &analytics {
        let (sink, handle) = AnalyticsSink::spawn(
            store.clone(),
            settings.analytics.queue_capacity,
            shutdown.token(),
        );
        tasks.push(handle);
        ctx = ctx.with_events(Arc::new(sink));
    }

    let mut server = RowsServer::new(ServerConfig::from_settings(&settings), ctx)
        .with_shutdown(Arc::clone(&shutdown));
    if let Some(store) = analytics {
        server = server.with_analytics(store);
    }
    match install_recorder() {
        Ok(handle) => server = server.with_metrics(handle),
        Err(e) => warn!(error = %e, "metrics recorder not installed, /metrics disabled"),
    }

    let (addr, handle) = server.listen().await.context("Failed to bind server")?;
    info!("rows server listening on http://{addr}");
    tasks.push(handle);

    wait_for_signal().await;

    info!("Shutting down...");
    shutdown.graceful_shutdown(tasks, None).await;
    info!("Shutdown complete");
    Ok(())
}
