//! Session handling.
//!
//! The backend uses cookie sessions. `Session` holds the cookie value,
//! persisted to `session.json` in the cache directory or supplied through
//! `FLEETCACHE_SESSION`, and is handed to `ApiClient::set_session`.

pub mod session;

pub use session::{Session, SessionData, SESSION_ENV_VAR};
