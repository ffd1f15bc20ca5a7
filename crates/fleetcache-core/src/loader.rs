//! Offline-aware data loading.
//!
//! `OfflineLoader` tries the network first. A successful response replaces
//! the cached snapshot; an unreachable server falls back to the snapshot
//! and flags the result offline. Loading never fails: the worst case is an
//! empty list with an error message attached.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::api::{ListQuery, RemoteSource};
use crate::merge::{merge_pending, MergedEntry};
use crate::models::{ChatMessage, Instruction, Intervention, Record};
use crate::queue::PendingQueue;
use crate::store::{age_display, LocalStore};
use crate::sync::SyncTracker;

/// Where the items of a load came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "lowercase")]
pub enum LoadSource {
    Network,
    Cache,
    /// Nothing usable: no snapshot while offline, or an error response
    Empty,
}

#[derive(Debug, Clone)]
pub struct LoadResult<T> {
    pub items: Vec<T>,
    pub offline: bool,
    pub source: LoadSource,
    /// Snapshot time when served from cache
    pub cached_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl<T> LoadResult<T> {
    fn network(items: Vec<T>) -> Self {
        Self {
            items,
            offline: false,
            source: LoadSource::Network,
            cached_at: None,
            error: None,
        }
    }

    fn failed(offline: bool, error: String) -> Self {
        Self {
            items: Vec::new(),
            offline,
            source: LoadSource::Empty,
            cached_at: None,
            error: Some(error),
        }
    }

    /// "live", or the age of the cached snapshot
    pub fn freshness(&self) -> String {
        match (self.source, self.cached_at) {
            (LoadSource::Network, _) => "live".to_string(),
            (_, Some(at)) => age_display((Utc::now() - at).num_minutes()),
            _ => "never".to_string(),
        }
    }
}

/// A list load overlaid with the collection's pending records
#[derive(Debug, Clone)]
pub struct MergedLoad<T> {
    pub entries: Vec<MergedEntry<T>>,
    pub offline: bool,
    pub source: LoadSource,
    pub cached_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

pub struct OfflineLoader {
    remote: Arc<dyn RemoteSource>,
    store: Arc<LocalStore>,
    tracker: SyncTracker,
    forced_offline: bool,
}

impl OfflineLoader {
    pub fn new(remote: Arc<dyn RemoteSource>, store: Arc<LocalStore>, tracker: SyncTracker) -> Self {
        Self {
            remote,
            store,
            tracker,
            forced_offline: false,
        }
    }

    /// Serve everything from cache without touching the network
    pub fn with_forced_offline(mut self, forced_offline: bool) -> Self {
        self.forced_offline = forced_offline;
        self
    }

    /// Load a record collection
    pub async fn load<T: Record>(&self, query: &ListQuery) -> LoadResult<T> {
        let key = query.cache_key(T::COLLECTION);
        self.load_path(T::ENDPOINT, &key, query).await
    }

    /// Load a record collection and overlay its pending records
    pub async fn load_merged<T: Record>(
        &self,
        queue: &PendingQueue<T>,
        query: &ListQuery,
    ) -> MergedLoad<T> {
        let result = self.load::<T>(query).await;
        let pending = match queue.list_pending() {
            Ok(pending) => pending,
            Err(e) => {
                warn!(collection = T::COLLECTION, error = %e, "Failed to read pending queue");
                Vec::new()
            }
        };

        MergedLoad {
            entries: merge_pending(result.items, &pending),
            offline: result.offline,
            source: result.source,
            cached_at: result.cached_at,
            error: result.error,
        }
    }

    pub async fn load_chat(&self, intervention_id: i64) -> LoadResult<ChatMessage> {
        let key = format!("chat_{}", intervention_id);
        self.load_path(&Intervention::chat_path(intervention_id), &key, &ListQuery::new())
            .await
    }

    pub async fn load_instructions(&self, intervention_id: i64) -> LoadResult<Instruction> {
        let key = format!("instructions_{}", intervention_id);
        self.load_path(
            &Intervention::instructions_path(intervention_id),
            &key,
            &ListQuery::new(),
        )
        .await
    }

    async fn load_path<T>(&self, path: &str, key: &str, query: &ListQuery) -> LoadResult<T>
    where
        T: DeserializeOwned,
    {
        if self.forced_offline {
            self.tracker.record_offline();
            return self.from_cache(key, "Offline mode enabled".to_string());
        }

        match self.remote.fetch_list(path, query).await {
            Ok(values) => {
                self.tracker.record_online();
                // The snapshot keeps the rows exactly as served
                if let Err(e) = self.store.save_snapshot(key, &values) {
                    warn!(cache = key, error = %e, "Failed to cache list");
                }
                let items = parse_items(path, &values);
                debug!(path, count = items.len(), "Loaded from network");
                LoadResult::network(items)
            }
            Err(e) if e.is_network_failure() => {
                self.tracker.record_offline();
                debug!(path, error = %e, "Network unavailable, using cache");
                self.from_cache(key, e.to_string())
            }
            Err(e) => {
                // The server answered, so connectivity is fine
                self.tracker.record_online();
                warn!(path, error = %e, "List request failed");
                LoadResult::failed(false, e.to_string())
            }
        }
    }

    fn from_cache<T: DeserializeOwned>(&self, key: &str, reason: String) -> LoadResult<T> {
        match self.store.load_snapshot::<Value>(key) {
            Ok(Some(cached)) => LoadResult {
                items: parse_items(key, &cached.data),
                offline: true,
                source: LoadSource::Cache,
                cached_at: Some(cached.cached_at),
                error: None,
            },
            Ok(None) => LoadResult {
                items: Vec::new(),
                offline: true,
                source: LoadSource::Empty,
                cached_at: None,
                error: Some(reason),
            },
            Err(e) => {
                warn!(cache = key, error = %e, "Failed to read cached list");
                LoadResult::failed(true, e.to_string())
            }
        }
    }
}

/// Decode rows one by one; a row that does not fit the model is skipped.
fn parse_items<T: DeserializeOwned>(source: &str, values: &[Value]) -> Vec<T> {
    values
        .iter()
        .enumerate()
        .filter_map(|(row, value)| match T::deserialize(value) {
            Ok(item) => Some(item),
            Err(e) => {
                warn!(source, row, error = %e, "Skipping unreadable row");
                None
            }
        })
        .collect()
}
