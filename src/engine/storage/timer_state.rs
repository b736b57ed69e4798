use std::{future::Future, io::ErrorKind, path::PathBuf};

use anyhow::Result;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::fs::operations::{write_atomically, FileLock};

use super::entities::TimerState;

/// Durable home of the [TimerState]. Implementations don't validate anything, keeping the state
/// consistent is the job of the session timer.
pub trait TimerStateStorage: Send + Sync {
    fn load(&self) -> impl Future<Output = Result<TimerState>> + Send;

    /// Applies `change` to the stored state as a single atomic read-modify-write and returns the
    /// written state.
    fn update<F>(&self, change: F) -> impl Future<Output = Result<TimerState>> + Send
    where
        F: FnOnce(&mut TimerState) + Send;
}

/// Keeps the state in a JSON file. Writes replace the file through a rename, and each update is
/// done under an exclusive lock so that other processes never interleave with it.
pub struct FileTimerStateStorage {
    path: PathBuf,
    lock_path: PathBuf,
}

impl FileTimerStateStorage {
    pub fn new(path: PathBuf) -> Self {
        let lock_path = path.with_extension("lock");
        Self { path, lock_path }
    }

    async fn read(&self) -> Result<TimerState> {
        let content = match tokio::fs::read(&self.path).await {
            Ok(v) => v,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(TimerState::default()),
            Err(e) => return Err(e.into()),
        };
        match serde_json::from_slice::<TimerState>(&content) {
            Ok(v) => Ok(v),
            Err(e) => {
                warn!("Timer state in {:?} is unreadable, starting from scratch: {e}", self.path);
                Ok(TimerState::default())
            }
        }
    }
}

impl TimerStateStorage for FileTimerStateStorage {
    async fn load(&self) -> Result<TimerState> {
        let lock = FileLock::shared(&self.lock_path).await?;
        let result = self.read().await;
        lock.release().await?;
        result
    }

    async fn update<F>(&self, change: F) -> Result<TimerState>
    where
        F: FnOnce(&mut TimerState) + Send,
    {
        let lock = FileLock::exclusive(&self.lock_path).await?;
        let result: Result<TimerState> = async {
            let mut state = self.read().await?;
            change(&mut state);
            write_atomically(&self.path, &serde_json::to_vec(&state)?).await?;
            debug!("Stored timer state {state:?}");
            Ok(state)
        }
        .await;
        lock.release().await?;
        result
    }
}

/// Observable wrapper around a [TimerStateStorage]. Subscribers are only notified once a write has
/// reached the storage.
pub struct TimerStateStore<S> {
    storage: S,
    sender: watch::Sender<TimerState>,
}

impl<S: TimerStateStorage> TimerStateStore<S> {
    pub async fn open(storage: S) -> Result<Self> {
        let initial = storage.load().await?;
        let (sender, _) = watch::channel(initial);
        Ok(Self { storage, sender })
    }

    /// Last state that was read or written.
    pub fn current(&self) -> TimerState {
        *self.sender.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<TimerState> {
        self.sender.subscribe()
    }

    /// Rereads the durable state, so that changes made by other processes are picked up.
    pub async fn load(&self) -> Result<TimerState> {
        let state = self.storage.load().await?;
        self.publish(state);
        Ok(state)
    }

    /// Atomic read-modify-write of the whole state.
    pub async fn update(
        &self,
        change: impl FnOnce(&mut TimerState) + Send,
    ) -> Result<TimerState> {
        let state = self.storage.update(change).await?;
        self.publish(state);
        Ok(state)
    }

    pub async fn set_tracking(&self, tracking: bool) -> Result<TimerState> {
        self.update(move |state| state.tracking = tracking).await
    }

    pub async fn set_session_start(&self, session_start_ms: Option<u64>) -> Result<TimerState> {
        self.update(move |state| state.session_start_ms = session_start_ms)
            .await
    }

    pub async fn set_accumulated(&self, accumulated_ms: u64) -> Result<TimerState> {
        self.update(move |state| state.accumulated_ms = accumulated_ms)
            .await
    }

    /// Writes all three fields at once.
    pub async fn replace(&self, new_state: TimerState) -> Result<TimerState> {
        self.update(move |state| *state = new_state).await
    }

    pub async fn clear_all(&self) -> Result<TimerState> {
        self.replace(TimerState::default()).await
    }

    fn publish(&self, state: TimerState) {
        self.sender.send_if_modified(|current| {
            let modified = *current != state;
            *current = state;
            modified
        });
    }
}
