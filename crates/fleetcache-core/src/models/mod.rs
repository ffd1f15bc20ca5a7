//! Data models for fleet-maintenance entities.
//!
//! Field names on the wire are the database column names used by the REST
//! API (`IDCONTACT`, `ST_INTER`, `CDUSER`, ...). Columns the models do not
//! name explicitly are kept in an `extra` map so a cached snapshot
//! round-trips without losing data.
//!
//! - `Contact`: clients and collaborators
//! - `Vehicule`: fleet registry entry, linked to a maintenance machine
//! - `Intervention`, `ChatMessage`, `Instruction`: work orders and their threads
//! - `User`, `AppParameter`: accounts and application settings

pub mod contact;
pub mod intervention;
mod lenient;
pub mod parameter;
pub mod user;
pub mod vehicule;

use serde::{de::DeserializeOwned, Serialize};

pub use contact::Contact;
pub use intervention::{ChatMessage, Instruction, Intervention};
pub use parameter::{find_parameter, AppParameter};
pub use user::User;
pub use vehicule::Vehicule;

/// A record type served by a list endpoint.
///
/// `COLLECTION` names the cache snapshot and pending-queue files,
/// `ENDPOINT` is the REST path for listing and creating records.
pub trait Record: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    const COLLECTION: &'static str;
    const ENDPOINT: &'static str;

    /// Server-assigned identifier, `None` for records created locally.
    fn server_id(&self) -> Option<i64>;

    /// Path used to update an existing record.
    fn item_path(id: i64) -> String {
        format!("{}/{}", Self::ENDPOINT, id)
    }
}

/// Collections with a pending queue, in the order `SyncEngine::sync_all` uploads them.
pub const SYNCABLE_COLLECTIONS: [&str; 3] = [
    Intervention::COLLECTION,
    Contact::COLLECTION,
    Vehicule::COLLECTION,
];
