//! Sync status tracking and upload of pending records.
//!
//! - `SyncTracker`: online flag, last sync time, and the derived `SyncStatus`
//! - `SyncEngine`: uploads queued records when the server is reachable

pub mod engine;
pub mod status;
pub mod tracker;

pub use engine::{spawn_background_sync, SyncEngine, SyncEvent, SyncReport, Uploaded};
pub use status::SyncStatus;
pub use tracker::SyncTracker;
