//! Local persistent store for offline data access.
//!
//! This module provides the `LocalStore` for keeping API responses and
//! locally created records on disk across restarts. Documents are JSON
//! files under the cache directory:
//!
//! - `snapshots/<key>.json`: last successful response of a list endpoint
//! - `pending/<collection>.json`: records waiting for upload
//! - `sync_state.json`: last sync time and last observed connectivity

pub mod cached;
pub mod error;
pub mod local;

pub use cached::{age_display, CachedData};
pub use error::StoreError;
pub use local::LocalStore;
