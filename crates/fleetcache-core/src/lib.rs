//! Offline-first cache for the fleet-maintenance REST API.
//!
//! The pieces, leaf first:
//!
//! - `store::LocalStore`: JSON documents on disk (list snapshots, queues)
//! - `queue::PendingQueue`: records created or edited locally, awaiting upload
//! - `sync::SyncTracker`: connectivity, last sync, and the `SyncStatus` read model
//! - `loader::OfflineLoader`: network first, cached snapshot when unreachable
//! - `merge::merge_pending`: pending records overlaid on a server list
//! - `sync::SyncEngine`: uploads the queue once the server answers again

pub mod api;
pub mod auth;
pub mod config;
pub mod loader;
pub mod merge;
pub mod models;
pub mod queue;
pub mod store;
pub mod sync;
pub mod utils;

#[cfg(test)]
mod test_support;

pub use api::{ApiClient, ApiError, ListQuery, RemoteSource};
pub use auth::Session;
pub use config::Config;
pub use loader::{LoadResult, LoadSource, MergedLoad, OfflineLoader};
pub use merge::{merge_pending, MergedEntry, RecordKey};
pub use queue::{PendingQueue, PendingRecord, PendingStatus};
pub use store::{CachedData, LocalStore, StoreError};
pub use sync::{spawn_background_sync, SyncEngine, SyncEvent, SyncReport, SyncStatus, SyncTracker};
