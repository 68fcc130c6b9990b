//! Debounced, TTL-bounded snapshot persistence.
//!
//! Persistence is a best-effort cache, never a correctness requirement:
//! every failure is swallowed and logged, and the session simply starts
//! fresh. Saves are debounced so a burst of mutations collapses into one
//! write; loads reject snapshots older than 24 hours instead of silently
//! returning stale data.

mod file;
mod memory;

pub use file::FileBackend;
pub use memory::MemoryBackend;

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use pomelo_core::SourceListId;
use thiserror::Error;
use tracing::{debug, warn};

use crate::session::{SNAPSHOT_VERSION, SessionSnapshot};

/// Snapshots older than this are rejected on load and cleared.
pub const SNAPSHOT_TTL_MILLIS: i64 = 24 * 60 * 60 * 1000;

/// Mutations within this window collapse into a single write.
pub const SAVE_DEBOUNCE: Duration = Duration::from_millis(500);

/// Errors from the storage backend. Callers of [`SnapshotStore`] never see
/// these; they are logged and swallowed at the store boundary.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Raw key-value storage for serialized snapshots.
pub trait SnapshotBackend: Send + Sync + 'static {
    fn put(
        &self,
        key: &str,
        value: String,
    ) -> impl Future<Output = Result<(), PersistError>> + Send;

    fn get(&self, key: &str) -> impl Future<Output = Result<Option<String>, PersistError>> + Send;

    fn remove(&self, key: &str) -> impl Future<Output = Result<(), PersistError>> + Send;
}

/// Wall-clock source, injectable so TTL tests control time.
pub trait Clock: Send + Sync + 'static {
    fn now_millis(&self) -> i64;
}

/// Production clock backed by the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Debounced snapshot store, one snapshot per source-list id.
///
/// Cheap to clone; clones share the pending-save state.
pub struct SnapshotStore<B, C = SystemClock> {
    inner: Arc<StoreInner<B, C>>,
}

impl<B, C> Clone for SnapshotStore<B, C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct StoreInner<B, C> {
    backend: B,
    clock: C,
    pending: Mutex<HashMap<String, PendingSave>>,
    generation: AtomicU64,
}

struct PendingSave {
    generation: u64,
    snapshot: SessionSnapshot,
}

impl<B: SnapshotBackend, C: Clock> SnapshotStore<B, C> {
    #[must_use]
    pub fn new(backend: B, clock: C) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                backend,
                clock,
                pending: Mutex::new(HashMap::new()),
                generation: AtomicU64::new(0),
            }),
        }
    }

    /// Schedule a debounced write of this snapshot. Fire-and-forget: the
    /// write happens on a background task after the debounce window, stamped
    /// with the write-time timestamp, and never blocks a step transition.
    pub fn save(&self, snapshot: SessionSnapshot) {
        let key = snapshot.source_list_id.as_str().to_string();
        let generation = self.inner.generation.fetch_add(1, Ordering::Relaxed) + 1;
        {
            let mut pending = lock(&self.inner.pending);
            pending.insert(
                key.clone(),
                PendingSave {
                    generation,
                    snapshot,
                },
            );
        }

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            tokio::time::sleep(SAVE_DEBOUNCE).await;
            let entry = {
                let mut pending = lock(&inner.pending);
                match pending.get(&key) {
                    // Superseded by a newer save for the same key.
                    Some(p) if p.generation != generation => None,
                    Some(_) => pending.remove(&key),
                    None => None,
                }
            };
            let Some(mut entry) = entry else { return };
            entry.snapshot.saved_at_epoch_millis = inner.clock.now_millis();
            match serde_json::to_string(&entry.snapshot) {
                Ok(json) => {
                    if let Err(err) = inner.backend.put(&key, json).await {
                        warn!(key, %err, "failed to persist checkout snapshot");
                    }
                }
                Err(err) => warn!(key, %err, "failed to serialize checkout snapshot"),
            }
        });
    }

    /// Load the snapshot for a source list, if a fresh one exists.
    ///
    /// Expired (older than 24 h), corrupted, and version-mismatched
    /// snapshots are cleared and reported as absent.
    pub async fn load(&self, list_id: &SourceListId) -> Option<SessionSnapshot> {
        let key = list_id.as_str();
        let raw = match self.inner.backend.get(key).await {
            Ok(raw) => raw?,
            Err(err) => {
                warn!(key, %err, "failed to read checkout snapshot");
                return None;
            }
        };

        let snapshot = match serde_json::from_str::<SessionSnapshot>(&raw) {
            Ok(snapshot) if snapshot.version == SNAPSHOT_VERSION => snapshot,
            Ok(snapshot) => {
                debug!(key, version = snapshot.version, "snapshot format changed, discarding");
                self.clear(list_id).await;
                return None;
            }
            Err(err) => {
                warn!(key, %err, "corrupted checkout snapshot, discarding");
                self.clear(list_id).await;
                return None;
            }
        };

        let age = self.inner.clock.now_millis() - snapshot.saved_at_epoch_millis;
        if age > SNAPSHOT_TTL_MILLIS {
            debug!(key, age_millis = age, "checkout snapshot expired");
            self.clear(list_id).await;
            return None;
        }

        Some(snapshot)
    }

    /// Drop the stored snapshot and any pending debounced write for it.
    pub async fn clear(&self, list_id: &SourceListId) {
        let key = list_id.as_str();
        lock(&self.inner.pending).remove(key);
        if let Err(err) = self.inner.backend.remove(key).await {
            warn!(key, %err, "failed to clear checkout snapshot");
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
