use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::queue;
use crate::store::LocalStore;

use super::SyncStatus;

/// Document holding the last observed connectivity and sync time
const SYNC_STATE_DOC: &str = "sync_state";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SyncState {
    #[serde(default = "default_online")]
    online: bool,
    #[serde(default)]
    last_sync: Option<DateTime<Utc>>,
}

fn default_online() -> bool {
    true
}

impl Default for SyncState {
    fn default() -> Self {
        Self {
            online: true,
            last_sync: None,
        }
    }
}

struct Inner {
    store: Arc<LocalStore>,
    quota_bytes: u64,
    state: Mutex<SyncState>,
    tx: watch::Sender<SyncStatus>,
}

/// Tracks connectivity and sync progress and projects them, together with
/// the pending-queue size and store usage, into a `SyncStatus`.
///
/// Clones share state. Subscribers get a new status through a watch channel
/// whenever any input changes.
#[derive(Clone)]
pub struct SyncTracker {
    inner: Arc<Inner>,
}

impl SyncTracker {
    pub fn new(store: Arc<LocalStore>, quota_bytes: u64) -> Self {
        let state = match store.load::<SyncState>(SYNC_STATE_DOC) {
            Ok(Some(state)) => state,
            Ok(None) => SyncState::default(),
            Err(e) => {
                warn!(error = %e, "Failed to load sync state, starting fresh");
                SyncState::default()
            }
        };

        let initial = Self::compute(&store, quota_bytes, &state);
        let (tx, _rx) = watch::channel(initial);

        Self {
            inner: Arc::new(Inner {
                store,
                quota_bytes,
                state: Mutex::new(state),
                tx,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, SyncState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn compute(store: &LocalStore, quota_bytes: u64, state: &SyncState) -> SyncStatus {
        let total_pending = match queue::total_pending(store) {
            Ok(count) => count,
            Err(e) => {
                warn!(error = %e, "Failed to count pending records");
                0
            }
        };
        SyncStatus::new(
            state.online,
            total_pending,
            store.usage_bytes(),
            quota_bytes,
            state.last_sync,
        )
    }

    /// Current status, computed from the store on every call
    pub fn status(&self) -> SyncStatus {
        let state = self.state().clone();
        Self::compute(&self.inner.store, self.inner.quota_bytes, &state)
    }

    pub fn subscribe(&self) -> watch::Receiver<SyncStatus> {
        self.inner.tx.subscribe()
    }

    pub fn is_online(&self) -> bool {
        self.state().online
    }

    pub fn last_sync(&self) -> Option<DateTime<Utc>> {
        self.state().last_sync
    }

    /// A request reached the server (whatever its status code)
    pub fn record_online(&self) {
        self.set_online(true);
    }

    /// A request failed before reaching the server
    pub fn record_offline(&self) {
        self.set_online(false);
    }

    fn set_online(&self, online: bool) {
        let changed = {
            let mut state = self.state();
            let changed = state.online != online;
            state.online = online;
            changed
        };
        if changed {
            info!(online, "Connectivity changed");
            self.persist();
            self.publish();
        }
    }

    /// The server acknowledged at least one upload
    pub fn record_sync(&self, at: DateTime<Utc>) {
        self.state().last_sync = Some(at);
        self.persist();
        self.publish();
    }

    /// The pending set changed; recompute and notify
    pub fn pending_changed(&self) {
        self.publish();
    }

    fn persist(&self) {
        let state = self.state().clone();
        if let Err(e) = self.inner.store.save(SYNC_STATE_DOC, &state) {
            warn!(error = %e, "Failed to persist sync state");
        }
    }

    fn publish(&self) {
        let status = self.status();
        let sent = self.inner.tx.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status;
                true
            }
        });
        if sent {
            debug!("Sync status published");
        }
    }
}
