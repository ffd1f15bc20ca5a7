//! Queue of records created or edited locally and not yet confirmed by the
//! server.
//!
//! Each collection has its own queue document under `pending/`. Records
//! leave the queue only through `resolve` (server acknowledged) or
//! `discard` (explicit user action); failures only change their status.

use std::marker::PhantomData;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::de::IgnoredAny;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::models::Record;
use crate::store::{local::QUEUE_AREA, LocalStore, StoreError};
use crate::sync::SyncTracker;

/// Prefix of locally generated identifiers (`local-1`, `local-2`, ...)
pub const LOCAL_ID_PREFIX: &str = "local-";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "lowercase")]
pub enum PendingStatus {
    /// Waiting for the next sync pass
    Pending,
    /// Created or last attempted while the server was unreachable
    Offline,
    /// The server rejected the upload as conflicting; needs an edit or a discard
    Conflict,
}

impl std::fmt::Display for PendingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PendingStatus::Pending => write!(f, "pending"),
            PendingStatus::Offline => write!(f, "offline"),
            PendingStatus::Conflict => write!(f, "conflict"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingRecord<T> {
    pub local_id: String,
    pub payload: T,
    pub status: PendingStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub attempts: u32,
    #[serde(default)]
    pub last_error: Option<String>,
}

impl<T: Record> PendingRecord<T> {
    /// Edits of server records are uploaded with PUT, new records with POST
    pub fn is_update(&self) -> bool {
        self.payload.server_id().is_some()
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct QueueDocument<T> {
    next_seq: u64,
    records: Vec<PendingRecord<T>>,
}

impl<T> Default for QueueDocument<T> {
    fn default() -> Self {
        Self {
            next_seq: 1,
            records: Vec::new(),
        }
    }
}

/// Number of queued records across every collection
pub fn total_pending(store: &LocalStore) -> Result<usize, StoreError> {
    let mut total = 0;
    for name in store.names_in(QUEUE_AREA)? {
        if let Some(doc) = store.load::<QueueDocument<IgnoredAny>>(&name)? {
            total += doc.records.len();
        }
    }
    Ok(total)
}

/// Pending-record queue for one record type.
pub struct PendingQueue<T> {
    store: Arc<LocalStore>,
    tracker: SyncTracker,
    _record: PhantomData<fn() -> T>,
}

impl<T: Record> PendingQueue<T> {
    pub fn new(store: Arc<LocalStore>, tracker: SyncTracker) -> Self {
        Self {
            store,
            tracker,
            _record: PhantomData,
        }
    }

    fn doc_name() -> String {
        format!("{}/{}", QUEUE_AREA, T::COLLECTION)
    }

    fn read(&self) -> Result<QueueDocument<T>, StoreError> {
        Ok(self.store.load(&Self::doc_name())?.unwrap_or_default())
    }

    fn write(&self, doc: &QueueDocument<T>) -> Result<(), StoreError> {
        self.store.save(&Self::doc_name(), doc)?;
        self.tracker.pending_changed();
        Ok(())
    }

    fn unknown(id: &str) -> StoreError {
        StoreError::UnknownRecord {
            collection: T::COLLECTION.to_string(),
            id: id.to_string(),
        }
    }

    /// Persist a locally created or edited record and return its local id.
    ///
    /// Editing a server record that is already queued replaces the queued
    /// payload and keeps the existing local id, so each record is queued once.
    pub fn enqueue(&self, payload: T) -> Result<String, StoreError> {
        let mut doc = self.read()?;
        let status = if self.tracker.is_online() {
            PendingStatus::Pending
        } else {
            PendingStatus::Offline
        };

        if let Some(server_id) = payload.server_id() {
            if let Some(existing) = doc
                .records
                .iter_mut()
                .find(|r| r.payload.server_id() == Some(server_id))
            {
                existing.payload = payload;
                existing.status = status;
                let id = existing.local_id.clone();
                self.write(&doc)?;
                debug!(collection = T::COLLECTION, local_id = %id, server_id, "Queued edit replaced");
                return Ok(id);
            }
        }

        let local_id = format!("{}{}", LOCAL_ID_PREFIX, doc.next_seq);
        doc.next_seq += 1;
        doc.records.push(PendingRecord {
            local_id: local_id.clone(),
            payload,
            status,
            created_at: Utc::now(),
            attempts: 0,
            last_error: None,
        });
        self.write(&doc)?;
        info!(collection = T::COLLECTION, local_id = %local_id, %status, "Record queued");
        Ok(local_id)
    }

    /// All queued records in creation order
    pub fn list_pending(&self) -> Result<Vec<PendingRecord<T>>, StoreError> {
        Ok(self.read()?.records)
    }

    pub fn get(&self, local_id: &str) -> Result<Option<PendingRecord<T>>, StoreError> {
        Ok(self
            .read()?
            .records
            .into_iter()
            .find(|r| r.local_id == local_id))
    }

    pub fn len(&self) -> Result<usize, StoreError> {
        Ok(self.read()?.records.len())
    }

    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }

    /// Replace the payload of a queued record. A record held back by a
    /// conflict becomes eligible for upload again.
    pub fn update(&self, local_id: &str, payload: T) -> Result<(), StoreError> {
        let mut doc = self.read()?;
        let record = doc
            .records
            .iter_mut()
            .find(|r| r.local_id == local_id)
            .ok_or_else(|| Self::unknown(local_id))?;
        record.payload = payload;
        if record.status == PendingStatus::Conflict {
            record.status = PendingStatus::Pending;
        }
        self.write(&doc)
    }

    /// Set the status of a queued record without counting an attempt
    pub fn set_status(&self, local_id: &str, status: PendingStatus) -> Result<(), StoreError> {
        let mut doc = self.read()?;
        let record = doc
            .records
            .iter_mut()
            .find(|r| r.local_id == local_id)
            .ok_or_else(|| Self::unknown(local_id))?;
        if record.status == status {
            return Ok(());
        }
        record.status = status;
        self.write(&doc)
    }

    /// Record a failed upload attempt
    pub fn record_failure(
        &self,
        local_id: &str,
        status: PendingStatus,
        error: String,
    ) -> Result<(), StoreError> {
        let mut doc = self.read()?;
        let record = doc
            .records
            .iter_mut()
            .find(|r| r.local_id == local_id)
            .ok_or_else(|| Self::unknown(local_id))?;
        record.status = status;
        record.attempts += 1;
        record.last_error = Some(error);
        self.write(&doc)
    }

    /// Remove a record the server has confirmed. Returns the removed record,
    /// or `None` if it was already gone.
    pub fn resolve(&self, local_id: &str) -> Result<Option<PendingRecord<T>>, StoreError> {
        let mut doc = self.read()?;
        let Some(pos) = doc.records.iter().position(|r| r.local_id == local_id) else {
            return Ok(None);
        };
        let record = doc.records.remove(pos);
        self.write(&doc)?;
        info!(collection = T::COLLECTION, local_id, "Pending record resolved");
        Ok(Some(record))
    }

    /// Drop a record at the user's request
    pub fn discard(&self, local_id: &str) -> Result<PendingRecord<T>, StoreError> {
        let mut doc = self.read()?;
        let pos = doc
            .records
            .iter()
            .position(|r| r.local_id == local_id)
            .ok_or_else(|| Self::unknown(local_id))?;
        let record = doc.records.remove(pos);
        self.write(&doc)?;
        info!(collection = T::COLLECTION, local_id, "Pending record discarded");
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Contact, Intervention};

    fn setup(dir: &std::path::Path) -> (Arc<LocalStore>, SyncTracker) {
        let store = Arc::new(LocalStore::new(dir.to_path_buf()).unwrap());
        let tracker = SyncTracker::new(Arc::clone(&store), 1024 * 1024);
        (store, tracker)
    }

    fn new_intervention(designation: &str) -> Intervention {
        Intervention {
            designation: Some(designation.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_enqueue_assigns_sequential_local_ids() {
        let dir = tempfile::tempdir().unwrap();
        let (store, tracker) = setup(dir.path());
        let queue = PendingQueue::<Intervention>::new(store, tracker);

        assert_eq!(queue.enqueue(new_intervention("Vidange")).unwrap(), "local-1");
        assert_eq!(queue.enqueue(new_intervention("Freins")).unwrap(), "local-2");

        let pending = queue.list_pending().unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].payload.designation.as_deref(), Some("Vidange"));
        assert!(!pending[0].is_update());
    }

    #[test]
    fn test_local_ids_not_reused_after_resolve() {
        let dir = tempfile::tempdir().unwrap();
        let (store, tracker) = setup(dir.path());
        let queue = PendingQueue::<Intervention>::new(store, tracker);

        let id = queue.enqueue(new_intervention("a")).unwrap();
        assert!(queue.resolve(&id).unwrap().is_some());
        assert!(queue.resolve(&id).unwrap().is_none());
        assert_eq!(queue.enqueue(new_intervention("b")).unwrap(), "local-2");
    }

    #[test]
    fn test_status_follows_connectivity() {
        let dir = tempfile::tempdir().unwrap();
        let (store, tracker) = setup(dir.path());
        let queue = PendingQueue::<Intervention>::new(store, tracker.clone());

        tracker.record_offline();
        let id = queue.enqueue(new_intervention("offline")).unwrap();
        assert_eq!(queue.get(&id).unwrap().unwrap().status, PendingStatus::Offline);

        tracker.record_online();
        let id = queue.enqueue(new_intervention("online")).unwrap();
        assert_eq!(queue.get(&id).unwrap().unwrap().status, PendingStatus::Pending);
    }

    #[test]
    fn test_edit_of_same_server_record_queued_once() {
        let dir = tempfile::tempdir().unwrap();
        let (store, tracker) = setup(dir.path());
        let queue = PendingQueue::<Contact>::new(store, tracker);

        let mut contact = Contact {
            id: Some(12),
            email: Some("old@example.com".into()),
            ..Default::default()
        };
        let first = queue.enqueue(contact.clone()).unwrap();
        contact.email = Some("new@example.com".into());
        let second = queue.enqueue(contact).unwrap();

        assert_eq!(first, second);
        let pending = queue.list_pending().unwrap();
        assert_eq!(pending.len(), 1);
        assert!(pending[0].is_update());
        assert_eq!(pending[0].payload.email.as_deref(), Some("new@example.com"));
    }

    #[test]
    fn test_total_pending_matches_queue_lengths() {
        let dir = tempfile::tempdir().unwrap();
        let (store, tracker) = setup(dir.path());
        let interventions = PendingQueue::<Intervention>::new(Arc::clone(&store), tracker.clone());
        let contacts = PendingQueue::<Contact>::new(Arc::clone(&store), tracker.clone());

        let a = interventions.enqueue(new_intervention("a")).unwrap();
        interventions.enqueue(new_intervention("b")).unwrap();
        contacts.enqueue(Contact::default()).unwrap();
        assert_eq!(total_pending(&store).unwrap(), 3);
        assert_eq!(tracker.status().total_pending, 3);

        interventions.resolve(&a).unwrap();
        assert_eq!(total_pending(&store).unwrap(), 2);
        assert_eq!(tracker.status().total_pending, 2);
    }

    #[test]
    fn test_failure_bookkeeping_and_conflict_reset() {
        let dir = tempfile::tempdir().unwrap();
        let (store, tracker) = setup(dir.path());
        let queue = PendingQueue::<Intervention>::new(store, tracker);

        let id = queue.enqueue(new_intervention("a")).unwrap();
        queue
            .record_failure(&id, PendingStatus::Conflict, "already closed".into())
            .unwrap();
        let record = queue.get(&id).unwrap().unwrap();
        assert_eq!(record.status, PendingStatus::Conflict);
        assert_eq!(record.attempts, 1);
        assert_eq!(record.last_error.as_deref(), Some("already closed"));

        queue.update(&id, new_intervention("a, revised")).unwrap();
        assert_eq!(queue.get(&id).unwrap().unwrap().status, PendingStatus::Pending);
    }

    #[test]
    fn test_unknown_ids_are_errors() {
        let dir = tempfile::tempdir().unwrap();
        let (store, tracker) = setup(dir.path());
        let queue = PendingQueue::<Intervention>::new(store, tracker);

        assert!(matches!(
            queue.discard("local-99"),
            Err(StoreError::UnknownRecord { .. })
        ));
        assert!(queue.update("local-99", Intervention::default()).is_err());
        assert!(queue.is_empty().unwrap());
    }
}
