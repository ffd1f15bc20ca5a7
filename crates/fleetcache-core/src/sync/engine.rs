use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::api::RemoteSource;
use crate::models::{Contact, Intervention, Record, Vehicule};
use crate::queue::{PendingQueue, PendingStatus};
use crate::store::{LocalStore, StoreError};

use super::SyncTracker;

/// A queued record the server accepted
#[derive(Debug, Clone, PartialEq)]
pub struct Uploaded {
    pub collection: &'static str,
    pub local_id: String,
    pub server_id: Option<i64>,
}

/// Outcome of one sync pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncReport {
    pub uploaded: Vec<Uploaded>,
    /// Local ids held back by a server conflict
    pub conflicts: Vec<String>,
    /// Local ids whose upload failed with an error response
    pub failed: Vec<String>,
    /// Records still queued after the pass
    pub remaining: usize,
    /// The server became unreachable during the pass
    pub went_offline: bool,
}

impl SyncReport {
    fn absorb(&mut self, other: SyncReport) {
        self.uploaded.extend(other.uploaded);
        self.conflicts.extend(other.conflicts);
        self.failed.extend(other.failed);
        self.remaining += other.remaining;
        self.went_offline |= other.went_offline;
    }
}

/// Progress messages sent by a background sync
#[derive(Debug, Clone)]
pub enum SyncEvent {
    Uploaded(Uploaded),
    Conflict {
        collection: &'static str,
        local_id: String,
        message: String,
    },
    Failed {
        collection: &'static str,
        local_id: String,
        message: String,
    },
    WentOffline,
    Complete(SyncReport),
    Error(String),
}

/// Uploads queued records and resolves them on acknowledgement.
pub struct SyncEngine {
    remote: Arc<dyn RemoteSource>,
    store: Arc<LocalStore>,
    tracker: SyncTracker,
}

impl SyncEngine {
    pub fn new(remote: Arc<dyn RemoteSource>, store: Arc<LocalStore>, tracker: SyncTracker) -> Self {
        Self {
            remote,
            store,
            tracker,
        }
    }

    pub fn queue<T: Record>(&self) -> PendingQueue<T> {
        PendingQueue::new(Arc::clone(&self.store), self.tracker.clone())
    }

    pub fn tracker(&self) -> &SyncTracker {
        &self.tracker
    }

    /// Upload the pending records of one collection
    pub async fn sync_collection<T: Record>(&self) -> Result<SyncReport, StoreError> {
        self.run_collection::<T>(None).await
    }

    /// Upload every syncable collection, stopping early when the server
    /// becomes unreachable
    pub async fn sync_all(
        &self,
        events: Option<&mpsc::Sender<SyncEvent>>,
    ) -> Result<SyncReport, StoreError> {
        let mut report = SyncReport::default();

        report.absorb(self.run_collection::<Intervention>(events).await?);
        if !report.went_offline {
            report.absorb(self.run_collection::<Contact>(events).await?);
        }
        if !report.went_offline {
            report.absorb(self.run_collection::<Vehicule>(events).await?);
        }

        if report.went_offline {
            // Collections skipped above still hold records
            report.remaining = crate::queue::total_pending(&self.store)?;
        }
        Ok(report)
    }

    async fn run_collection<T: Record>(
        &self,
        events: Option<&mpsc::Sender<SyncEvent>>,
    ) -> Result<SyncReport, StoreError> {
        let queue = self.queue::<T>();
        let records = queue.list_pending()?;
        let mut report = SyncReport::default();

        if records.is_empty() {
            debug!(collection = T::COLLECTION, "Nothing to sync");
        } else {
            info!(collection = T::COLLECTION, count = records.len(), "Syncing pending records");
        }

        for (idx, record) in records.iter().enumerate() {
            if record.status == PendingStatus::Conflict {
                report.conflicts.push(record.local_id.clone());
                continue;
            }

            let body = serde_json::to_value(&record.payload)
                .map_err(|e| StoreError::serde(T::COLLECTION, e))?;
            let result = match record.payload.server_id() {
                Some(id) => self.remote.update(&T::item_path(id), &body).await,
                None => self.remote.create(T::ENDPOINT, &body).await,
            };

            match result {
                Ok(ack) => {
                    self.tracker.record_online();
                    // An ack without an id (`{"success": true}`) falls back
                    // to the payload that was sent
                    let acked = match serde_json::from_value::<T>(ack) {
                        Ok(entity) if entity.server_id().is_some() => Some(entity),
                        Ok(_) => None,
                        Err(e) => {
                            warn!(collection = T::COLLECTION, error = %e, "Unexpected acknowledgement body");
                            None
                        }
                    };
                    let entity = acked.unwrap_or_else(|| record.payload.clone());
                    let server_id = entity.server_id();
                    if server_id.is_some() {
                        if let Err(e) = self.store.upsert_snapshot_entry(&entity) {
                            warn!(collection = T::COLLECTION, error = %e, "Failed to cache acknowledged record");
                        }
                    } else {
                        debug!(collection = T::COLLECTION, local_id = %record.local_id, "Server assigned no id; record appears after the next refresh");
                    }
                    queue.resolve(&record.local_id)?;

                    let uploaded = Uploaded {
                        collection: T::COLLECTION,
                        local_id: record.local_id.clone(),
                        server_id,
                    };
                    info!(collection = T::COLLECTION, local_id = %record.local_id, ?server_id, "Record uploaded");
                    send_event(events, SyncEvent::Uploaded(uploaded.clone())).await;
                    report.uploaded.push(uploaded);
                }
                Err(e) if e.is_network_failure() => {
                    self.tracker.record_offline();
                    warn!(collection = T::COLLECTION, error = %e, "Server unreachable, sync paused");
                    queue.record_failure(&record.local_id, PendingStatus::Offline, e.to_string())?;
                    for rest in &records[idx + 1..] {
                        if rest.status != PendingStatus::Conflict {
                            queue.set_status(&rest.local_id, PendingStatus::Offline)?;
                        }
                    }
                    report.went_offline = true;
                    send_event(events, SyncEvent::WentOffline).await;
                    break;
                }
                Err(e) if e.is_conflict() => {
                    self.tracker.record_online();
                    warn!(collection = T::COLLECTION, local_id = %record.local_id, error = %e, "Upload conflicts with server state");
                    queue.record_failure(&record.local_id, PendingStatus::Conflict, e.to_string())?;
                    send_event(
                        events,
                        SyncEvent::Conflict {
                            collection: T::COLLECTION,
                            local_id: record.local_id.clone(),
                            message: e.to_string(),
                        },
                    )
                    .await;
                    report.conflicts.push(record.local_id.clone());
                }
                Err(e) => {
                    self.tracker.record_online();
                    error!(collection = T::COLLECTION, local_id = %record.local_id, error = %e, "Upload failed");
                    queue.record_failure(&record.local_id, PendingStatus::Pending, e.to_string())?;
                    send_event(
                        events,
                        SyncEvent::Failed {
                            collection: T::COLLECTION,
                            local_id: record.local_id.clone(),
                            message: e.to_string(),
                        },
                    )
                    .await;
                    report.failed.push(record.local_id.clone());
                }
            }
        }

        if !report.uploaded.is_empty() {
            self.tracker.record_sync(Utc::now());
        }
        report.remaining = queue.len()?;
        Ok(report)
    }
}

/// Helper to send sync events, logging any channel errors
async fn send_event(events: Option<&mpsc::Sender<SyncEvent>>, event: SyncEvent) {
    if let Some(tx) = events {
        if let Err(e) = tx.send(event).await {
            error!(error = %e, "Failed to send sync event - channel closed");
        }
    }
}

/// Run a full sync pass on a Tokio task, reporting progress on `tx`.
/// The last message is always `Complete` or `Error`.
pub fn spawn_background_sync(engine: Arc<SyncEngine>, tx: mpsc::Sender<SyncEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("Background sync started");
        match engine.sync_all(Some(&tx)).await {
            Ok(report) => {
                info!(
                    uploaded = report.uploaded.len(),
                    remaining = report.remaining,
                    "Background sync complete"
                );
                send_event(Some(&tx), SyncEvent::Complete(report)).await;
            }
            Err(e) => {
                error!(error = %e, "Background sync failed");
                send_event(Some(&tx), SyncEvent::Error(e.to_string())).await;
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ListQuery;
    use crate::loader::OfflineLoader;
    use crate::test_support::FakeRemote;
    use serde_json::json;

    struct Fixture {
        _dir: tempfile::TempDir,
        store: Arc<LocalStore>,
        tracker: SyncTracker,
        remote: Arc<FakeRemote>,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let store = Arc::new(LocalStore::new(dir.path().to_path_buf()).unwrap());
            let tracker = SyncTracker::new(Arc::clone(&store), 10 * 1024 * 1024);
            Self {
                _dir: dir,
                store,
                tracker,
                remote: Arc::new(FakeRemote::default()),
            }
        }

        fn remote(&self) -> Arc<dyn RemoteSource> {
            self.remote.clone()
        }

        fn engine(&self) -> SyncEngine {
            SyncEngine::new(self.remote(), Arc::clone(&self.store), self.tracker.clone())
        }

        fn loader(&self) -> OfflineLoader {
            OfflineLoader::new(self.remote(), Arc::clone(&self.store), self.tracker.clone())
        }
    }

    fn new_intervention(designation: &str) -> Intervention {
        Intervention {
            designation: Some(designation.to_string()),
            vehicule_id: Some(7),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_offline_create_then_sync_shows_single_server_entry() {
        let fx = Fixture::new();
        let engine = fx.engine();
        let loader = fx.loader();
        let queue = engine.queue::<Intervention>();

        // Client goes offline and creates an intervention
        fx.remote.set_unreachable(true);
        let merged = loader.load_merged(&queue, &ListQuery::new()).await;
        assert!(merged.offline);
        let local_id = queue.enqueue(new_intervention("Vidange")).unwrap();
        assert_eq!(local_id, "local-1");

        let merged = loader.load_merged(&queue, &ListQuery::new()).await;
        assert_eq!(merged.entries.len(), 1);
        assert!(merged.entries[0].offline);
        assert_eq!(merged.entries[0].key.to_string(), "local-1");
        assert_eq!(fx.tracker.status().total_pending, 1);

        // Connectivity returns, sync uploads, server assigns 482
        fx.remote.set_unreachable(false);
        let report = engine.sync_collection::<Intervention>().await.unwrap();
        assert_eq!(report.uploaded.len(), 1);
        assert_eq!(report.uploaded[0].server_id, Some(482));
        assert_eq!(report.remaining, 0);
        assert!(fx.tracker.status().is_online);
        assert!(fx.tracker.status().last_sync.is_some());

        // Server list now contains the record
        fx.remote.set_list(
            "/api/interventions",
            vec![json!({"IDINTER": 482, "DESIGNATION": "Vidange", "IDVEHICULE": 7})],
        );
        let merged = loader.load_merged(&queue, &ListQuery::new()).await;
        assert_eq!(merged.entries.len(), 1);
        assert_eq!(merged.entries[0].key.to_string(), "482");
        assert!(!merged.entries[0].offline);
        assert_eq!(fx.tracker.status().total_pending, 0);
    }

    #[tokio::test]
    async fn test_acknowledged_record_visible_offline_before_refresh() {
        let fx = Fixture::new();
        let engine = fx.engine();
        let queue = engine.queue::<Intervention>();
        queue.enqueue(new_intervention("Freins")).unwrap();
        engine.sync_collection::<Intervention>().await.unwrap();

        fx.remote.set_unreachable(true);
        let merged = fx.loader().load_merged(&queue, &ListQuery::new()).await;
        assert_eq!(merged.entries.len(), 1);
        assert_eq!(merged.entries[0].data.id, Some(482));
        assert!(merged.offline);
    }

    #[tokio::test]
    async fn test_network_failure_pauses_and_marks_offline() {
        let fx = Fixture::new();
        let engine = fx.engine();
        let queue = engine.queue::<Intervention>();
        let first = queue.enqueue(new_intervention("a")).unwrap();
        let second = queue.enqueue(new_intervention("b")).unwrap();

        fx.remote.set_unreachable(true);
        let report = engine.sync_collection::<Intervention>().await.unwrap();
        assert!(report.went_offline);
        assert_eq!(report.remaining, 2);
        assert_eq!(fx.remote.writes().len(), 0);

        let first = queue.get(&first).unwrap().unwrap();
        assert_eq!(first.status, PendingStatus::Offline);
        assert_eq!(first.attempts, 1);
        let second = queue.get(&second).unwrap().unwrap();
        assert_eq!(second.status, PendingStatus::Offline);
        assert_eq!(second.attempts, 0);
        assert!(!fx.tracker.is_online());
        assert!(fx.tracker.last_sync().is_none());
    }

    #[tokio::test]
    async fn test_conflict_keeps_record_and_is_not_retried() {
        let fx = Fixture::new();
        let engine = fx.engine();
        let queue = engine.queue::<Intervention>();
        let mut edited = new_intervention("edited offline");
        edited.id = Some(40);
        let local_id = queue.enqueue(edited).unwrap();

        fx.remote.fail_with_status("/api/interventions/40", 409);
        let report = engine.sync_collection::<Intervention>().await.unwrap();
        assert_eq!(report.conflicts, vec![local_id.clone()]);
        assert_eq!(report.remaining, 1);
        assert_eq!(queue.get(&local_id).unwrap().unwrap().status, PendingStatus::Conflict);

        // Held back on the next pass even though the server would accept it
        fx.remote.clear_failure("/api/interventions/40");
        let report = engine.sync_collection::<Intervention>().await.unwrap();
        assert!(report.uploaded.is_empty());
        assert_eq!(report.remaining, 1);
    }

    #[tokio::test]
    async fn test_server_error_keeps_pending_and_continues() {
        let fx = Fixture::new();
        let engine = fx.engine();
        let contacts = engine.queue::<Contact>();
        let edit = contacts
            .enqueue(Contact { id: Some(3), ..Default::default() })
            .unwrap();
        contacts.enqueue(Contact::default()).unwrap();

        fx.remote.fail_with_status("/api/contacts/3", 500);
        let report = engine.sync_collection::<Contact>().await.unwrap();
        assert_eq!(report.failed, vec![edit.clone()]);
        assert_eq!(report.uploaded.len(), 1);
        assert_eq!(report.remaining, 1);

        let kept = contacts.get(&edit).unwrap().unwrap();
        assert_eq!(kept.status, PendingStatus::Pending);
        assert_eq!(kept.attempts, 1);
        assert!(kept.last_error.is_some());
    }

    #[tokio::test]
    async fn test_updates_use_put_and_creates_post() {
        let fx = Fixture::new();
        let engine = fx.engine();
        let queue = engine.queue::<Intervention>();
        let mut edit = new_intervention("edit");
        edit.id = Some(10);
        queue.enqueue(edit).unwrap();
        queue.enqueue(new_intervention("create")).unwrap();

        engine.sync_collection::<Intervention>().await.unwrap();
        let methods: Vec<(String, String)> = fx
            .remote
            .writes()
            .into_iter()
            .map(|(m, p, _)| (m, p))
            .collect();
        assert_eq!(
            methods,
            vec![
                ("PUT".to_string(), "/api/interventions/10".to_string()),
                ("POST".to_string(), "/api/interventions".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_background_sync_reports_events() {
        let fx = Fixture::new();
        let engine = Arc::new(fx.engine());
        engine.queue::<Intervention>().enqueue(new_intervention("a")).unwrap();
        engine.queue::<Vehicule>().enqueue(Vehicule::default()).unwrap();

        let (tx, mut rx) = mpsc::channel(16);
        spawn_background_sync(Arc::clone(&engine), tx).await.unwrap();

        let mut uploaded = 0;
        let mut complete = None;
        while let Some(event) = rx.recv().await {
            match event {
                SyncEvent::Uploaded(_) => uploaded += 1,
                SyncEvent::Complete(report) => complete = Some(report),
                other => panic!("unexpected event {:?}", other),
            }
        }
        assert_eq!(uploaded, 2);
        let report = complete.expect("missing Complete event");
        assert_eq!(report.remaining, 0);
        assert_eq!(fx.tracker.status().total_pending, 0);
    }

    #[tokio::test]
    async fn test_conflict_only_pass_leaves_tracker_untouched() {
        let fx = Fixture::new();
        let engine = fx.engine();
        let queue = engine.queue::<Intervention>();
        let local_id = queue.enqueue(new_intervention("held")).unwrap();
        queue.set_status(&local_id, PendingStatus::Conflict).unwrap();
        fx.tracker.record_offline();

        let report = engine.sync_collection::<Intervention>().await.unwrap();
        assert_eq!(report.conflicts, vec![local_id]);
        assert_eq!(fx.remote.request_count(), 0);
        assert!(!fx.tracker.is_online());
        assert!(fx.tracker.last_sync().is_none());
    }

    #[tokio::test]
    async fn test_failed_uploads_do_not_stamp_last_sync() {
        let fx = Fixture::new();
        let engine = fx.engine();
        let queue = engine.queue::<Intervention>();
        queue.enqueue(new_intervention("a")).unwrap();

        fx.remote.fail_with_status("/api/interventions", 503);
        let report = engine.sync_collection::<Intervention>().await.unwrap();
        assert_eq!(report.failed.len(), 1);
        assert!(fx.tracker.is_online());
        assert!(fx.tracker.last_sync().is_none());
    }

    #[tokio::test]
    async fn test_ack_without_id_caches_the_sent_edit() {
        let fx = Fixture::new();
        fx.store
            .save_snapshot(
                Intervention::COLLECTION,
                &[Intervention { id: Some(40), ..new_intervention("old") }],
            )
            .unwrap();
        fx.remote.set_ack(Some(json!({"success": true})));

        let engine = fx.engine();
        let queue = engine.queue::<Intervention>();
        queue
            .enqueue(Intervention { id: Some(40), ..new_intervention("new") })
            .unwrap();
        queue.enqueue(new_intervention("created")).unwrap();

        let report = engine.sync_collection::<Intervention>().await.unwrap();
        let ids: Vec<Option<i64>> = report.uploaded.iter().map(|u| u.server_id).collect();
        assert_eq!(ids, vec![Some(40), None]);
        assert_eq!(report.remaining, 0);

        let cached: Vec<Intervention> = fx
            .store
            .load_snapshot(Intervention::COLLECTION)
            .unwrap()
            .unwrap()
            .data;
        assert_eq!(cached.len(), 1);
        assert_eq!(cached[0].id, Some(40));
        assert_eq!(cached[0].designation.as_deref(), Some("new"));
    }
}
