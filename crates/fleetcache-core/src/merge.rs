//! Overlay of pending local records on a server list.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::models::Record;
use crate::queue::{PendingRecord, PendingStatus};

/// Identity of an entry in a merged list
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(untagged)]
pub enum RecordKey {
    Server(i64),
    Local(String),
    /// Server record without an identifier, kept at its position
    Unkeyed(usize),
}

impl std::fmt::Display for RecordKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordKey::Server(id) => write!(f, "{}", id),
            RecordKey::Local(id) => write!(f, "{}", id),
            RecordKey::Unkeyed(pos) => write!(f, "#{}", pos),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MergedEntry<T> {
    pub key: RecordKey,
    pub data: T,
    /// Shown from the local queue rather than the server
    pub offline: bool,
    pub pending_status: Option<PendingStatus>,
}

impl<T> MergedEntry<T> {
    fn server(key: RecordKey, data: T) -> Self {
        Self {
            key,
            data,
            offline: false,
            pending_status: None,
        }
    }

    fn pending(key: RecordKey, record: &PendingRecord<T>) -> Self
    where
        T: Clone,
    {
        Self {
            key,
            data: record.payload.clone(),
            offline: true,
            pending_status: Some(record.status),
        }
    }
}

/// Merge a server list with the pending queue of the same collection.
///
/// Every identifier appears once. A queued edit replaces the server record
/// with the same id in place. Records created locally come first, in
/// creation order; queued edits of records missing from `server` (another
/// page, or not yet visible) are appended at the end.
pub fn merge_pending<T: Record>(server: Vec<T>, pending: &[PendingRecord<T>]) -> Vec<MergedEntry<T>> {
    let mut overlay: HashMap<i64, &PendingRecord<T>> = HashMap::new();
    let mut entries = Vec::with_capacity(server.len() + pending.len());

    for record in pending {
        match record.payload.server_id() {
            Some(id) => {
                overlay.insert(id, record);
            }
            None => entries.push(MergedEntry::pending(
                RecordKey::Local(record.local_id.clone()),
                record,
            )),
        }
    }

    let mut seen: HashSet<i64> = HashSet::new();
    for (pos, item) in server.into_iter().enumerate() {
        let Some(id) = item.server_id() else {
            entries.push(MergedEntry::server(RecordKey::Unkeyed(pos), item));
            continue;
        };
        if !seen.insert(id) {
            continue;
        }
        match overlay.remove(&id) {
            Some(record) => entries.push(MergedEntry::pending(RecordKey::Server(id), record)),
            None => entries.push(MergedEntry::server(RecordKey::Server(id), item)),
        }
    }

    for record in pending {
        if let Some(id) = record.payload.server_id() {
            if let Some(record) = overlay.remove(&id) {
                entries.push(MergedEntry::pending(RecordKey::Server(id), record));
            }
        }
    }

    entries
}
