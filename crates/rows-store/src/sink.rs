//! Non-blocking hand-off of finished games to [`AnalyticsStore`].

use rows_core::{GameCompletedEvent, GameEventSink};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::analytics::AnalyticsStore;

/// [`GameEventSink`] that queues events for a background writer.
///
/// A full queue drops the event with a warning; gameplay never waits on
/// the database.
#[derive(Clone)]
pub struct AnalyticsSink {
    tx: mpsc::Sender<GameCompletedEvent>,
}

impl AnalyticsSink {
    /// Start the writer. It drains whatever is queued once `cancel` fires or
    /// every sink clone is dropped, then exits.
    pub fn spawn(
        store: AnalyticsStore,
        capacity: usize,
        cancel: CancellationToken,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let handle = tokio::spawn(run_writer(store, rx, cancel));
        (Self { tx }, handle)
    }
}

impl GameEventSink for AnalyticsSink {
    fn publish(&self, event: GameCompletedEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                warn!(room = %event.room_code, "analytics queue full, dropping game event");
            }
            Err(TrySendError::Closed(event)) => {
                debug!(room = %event.room_code, "analytics writer stopped, dropping game event");
            }
        }
    }
}

async fn run_writer(
    store: AnalyticsStore,
    mut rx: mpsc::Receiver<GameCompletedEvent>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            event = rx.recv() => match event {
                Some(event) => write(&store, event).await,
                None => return,
            },
        }
    }

    rx.close();
    while let Some(event) = rx.recv().await {
        write(&store, event).await;
    }
    debug!("analytics writer drained");
}

async fn write(store: &AnalyticsStore, event: GameCompletedEvent) {
    let store = store.clone();
    let room = event.room_code.clone();
    match tokio::task::spawn_blocking(move || store.record_game(&event)).await {
        Ok(Ok(id)) => debug!(%room, id, "recorded game"),
        Ok(Err(e)) => warn!(%room, error = %e, "failed to record game"),
        Err(e) => warn!(%room, error = %e, "game recording task failed"),
    }
}
