//! Durable persistence of the subset of state that survives a process
//! restart.
//!
//! Exactly teams, game activity, start time, and the activity feed are
//! persisted. Capture points, node connection state, and the identity
//! table are deliberately excluded: they describe live connections and
//! are rebuilt as devices re-register.
//!
//! Writes go through a debounced persister task: a single pending
//! snapshot, newest-wins, flushed after the debounce window or
//! immediately for critical mutations. Write failures are logged and
//! absorbed; the next schedule retries.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use shared::{ActivityEvent, Team};
use std::time::Duration;
use tokio::sync::mpsc;

/// The durable record. Loading an older or hand-edited file with a
/// missing feed still succeeds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedState {
    pub teams: Vec<Team>,
    pub game_active: bool,
    pub game_start_time: Option<u64>,
    #[serde(default)]
    pub activity_feed: Vec<ActivityEvent>,
}

/// File-backed store. Single writer: only the persister task calls
/// `save`.
#[derive(Debug, Clone)]
pub struct DurableStore {
    path: PathBuf,
}

impl DurableStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Loads the persisted record. A missing or unreadable file yields
    /// `None` so startup falls back to defaults instead of failing.
    pub fn load(&self) -> Option<PersistedState> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!("Could not read state file {:?}: {}", self.path, e);
                return None;
            }
        };

        match serde_json::from_str::<PersistedState>(&raw) {
            Ok(state) => {
                info!(
                    "Loaded state: {} teams, game {}",
                    state.teams.len(),
                    if state.game_active { "active" } else { "inactive" }
                );
                Some(state)
            }
            Err(e) => {
                warn!("Invalid state file {:?}: {}", self.path, e);
                None
            }
        }
    }

    pub fn save(&self, state: &PersistedState) -> io::Result<()> {
        let data = serde_json::to_string_pretty(state)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        fs::write(&self.path, data)
    }
}

struct SaveRequest {
    state: PersistedState,
    immediate: bool,
}

/// Handle through which the state manager schedules writes. Cheap to
/// clone; sending never blocks the mutation path.
#[derive(Clone)]
pub struct PersistHandle {
    tx: mpsc::UnboundedSender<SaveRequest>,
}

impl PersistHandle {
    /// Fire-and-forget schedule of a durable write. `immediate`
    /// bypasses the debounce window (lifecycle transitions, captures).
    pub fn schedule(&self, state: PersistedState, immediate: bool) {
        if self.tx.send(SaveRequest { state, immediate }).is_err() {
            warn!("Persister task is gone, dropping state write");
        }
    }
}

/// Spawns the persister task and returns its handle. The debounce
/// window is injected so tests don't need wall-clock waits.
pub fn spawn_persister(store: DurableStore, debounce: Duration) -> PersistHandle {
    let (tx, mut rx) = mpsc::unbounded_channel::<SaveRequest>();

    tokio::spawn(async move {
        let mut pending: Option<PersistedState> = None;

        loop {
            match pending.take() {
                None => match rx.recv().await {
                    Some(req) if req.immediate => write(&store, &req.state),
                    Some(req) => pending = Some(req.state),
                    None => break,
                },
                Some(held) => {
                    tokio::select! {
                        req = rx.recv() => match req {
                            Some(req) if req.immediate => write(&store, &req.state),
                            // Newest snapshot replaces the pending one.
                            Some(req) => pending = Some(req.state),
                            None => {
                                write(&store, &held);
                                break;
                            }
                        },
                        _ = tokio::time::sleep(debounce) => write(&store, &held),
                    }
                }
            }
        }
    });

    PersistHandle { tx }
}

fn write(store: &DurableStore, state: &PersistedState) {
    if let Err(e) = store.save(state) {
        // Never propagated to the mutation path; the next schedule
        // retries.
        error!("Failed to persist state: {}", e);
    }
}
