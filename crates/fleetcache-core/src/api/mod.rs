//! REST API client module for the fleet-maintenance backend.
//!
//! This module provides the `ApiClient` for talking to the `/api/*`
//! endpoints, the `RemoteSource` seam the cache layer fetches and uploads
//! through, and `ListQuery` for the `page`/`limit` parameters.
//!
//! The API authenticates with a session cookie; see `crate::auth`.

pub mod client;
pub mod error;
pub mod query;
pub mod remote;

pub use client::ApiClient;
pub use error::ApiError;
pub use query::ListQuery;
pub use remote::RemoteSource;
