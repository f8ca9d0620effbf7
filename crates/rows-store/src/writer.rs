//! Background writer for room state.
//!
//! [`QueuedRoomStore`] wraps any blocking [`RoomStore`]. Writes are queued
//! with `try_send` and applied one at a time on the blocking pool, in the
//! order they were queued. Reads go straight to the wrapped store.

use std::sync::Arc;

use rows_core::{PersistenceError, RoomCode, RoomSnapshot, RoomStore, StoredRoom};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

enum RoomWrite {
    Upsert(Box<RoomSnapshot>),
    Touch(RoomCode),
    Delete(RoomCode),
}

impl RoomWrite {
    fn operation(&self) -> &'static str {
        match self {
            Self::Upsert(_) => "upsert",
            Self::Touch(_) => "touch_activity",
            Self::Delete(_) => "delete",
        }
    }

    fn code(&self) -> &RoomCode {
        match self {
            Self::Upsert(snapshot) => &snapshot.code,
            Self::Touch(code) | Self::Delete(code) => code,
        }
    }

    fn apply(&self, store: &dyn RoomStore) -> Result<(), PersistenceError> {
        match self {
            Self::Upsert(snapshot) => store.upsert(snapshot),
            Self::Touch(code) => store.touch_activity(code),
            Self::Delete(code) => store.delete(code),
        }
    }
}

/// [`RoomStore`] that never blocks the caller on a write.
///
/// A full queue rejects the write with a [`PersistenceError`]; the stored
/// copy may then lag until the room's next save.
#[derive(Clone)]
pub struct QueuedRoomStore {
    tx: mpsc::Sender<RoomWrite>,
    inner: Arc<dyn RoomStore>,
}

impl QueuedRoomStore {
    /// Start the writer over `inner`. It drains whatever is queued once
    /// `cancel` fires or every clone is dropped, then exits.
    pub fn spawn(
        inner: Arc<dyn RoomStore>,
        capacity: usize,
        cancel: CancellationToken,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let handle = tokio::spawn(run_writer(Arc::clone(&inner), rx, cancel));
        (Self { tx, inner }, handle)
    }

    fn enqueue(&self, write: RoomWrite) -> Result<(), PersistenceError> {
        self.tx.try_send(write).map_err(|e| match e {
            TrySendError::Full(write) => {
                PersistenceError::new(write.operation(), "room write queue full")
            }
            TrySendError::Closed(write) => {
                PersistenceError::new(write.operation(), "room writer stopped")
            }
        })
    }
}

impl RoomStore for QueuedRoomStore {
    fn upsert(&self, snapshot: &RoomSnapshot) -> Result<(), PersistenceError> {
        self.enqueue(RoomWrite::Upsert(Box::new(snapshot.clone())))
    }

    fn fetch(&self, code: &RoomCode) -> Result<Option<StoredRoom>, PersistenceError> {
        self.inner.fetch(code)
    }

    fn delete(&self, code: &RoomCode) -> Result<(), PersistenceError> {
        self.enqueue(RoomWrite::Delete(code.clone()))
    }

    fn touch_activity(&self, code: &RoomCode) -> Result<(), PersistenceError> {
        self.enqueue(RoomWrite::Touch(code.clone()))
    }
}

async fn run_writer(
    store: Arc<dyn RoomStore>,
    mut rx: mpsc::Receiver<RoomWrite>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            write = rx.recv() => match write {
                Some(write) => apply(&store, write).await,
                None => return,
            },
        }
    }

    rx.close();
    while let Some(write) = rx.recv().await {
        apply(&store, write).await;
    }
    debug!("room writer drained");
}

async fn apply(store: &Arc<dyn RoomStore>, write: RoomWrite) {
    let store = Arc::clone(store);
    let operation = write.operation();
    let room = write.code().clone();
    match tokio::task::spawn_blocking(move || write.apply(store.as_ref())).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(%room, operation, error = %e, "room write failed"),
        Err(e) => warn!(%room, operation, error = %e, "room write task failed"),
    }
}
