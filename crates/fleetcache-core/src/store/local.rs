use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::models::Record;

use super::{CachedData, StoreError};

/// Directory holding list snapshots
const SNAPSHOT_AREA: &str = "snapshots";

/// Directory holding pending-record queues
pub(crate) const QUEUE_AREA: &str = "pending";

/// JSON-file record store rooted at the cache directory.
///
/// Every document is one file; writes go to a temporary sibling first and
/// are renamed into place, so readers see either the old or the new file.
#[derive(Debug)]
pub struct LocalStore {
    dir: PathBuf,
}

impl LocalStore {
    pub fn new(dir: PathBuf) -> Result<Self, StoreError> {
        std::fs::create_dir_all(&dir).map_err(|e| StoreError::io(&dir.display().to_string(), e))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.json", name))
    }

    // ===== Raw documents =====

    pub fn load<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>, StoreError> {
        let path = self.path(name);
        let contents = match std::fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::io(name, e)),
        };
        let value = serde_json::from_str(&contents).map_err(|e| StoreError::serde(name, e))?;
        Ok(Some(value))
    }

    pub fn save<T: Serialize + ?Sized>(&self, name: &str, value: &T) -> Result<(), StoreError> {
        let path = self.path(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::io(name, e))?;
        }
        let contents = serde_json::to_string_pretty(value).map_err(|e| StoreError::serde(name, e))?;

        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, contents).map_err(|e| StoreError::io(name, e))?;
        std::fs::rename(&tmp, &path).map_err(|e| StoreError::io(name, e))?;
        debug!(document = name, "Saved");
        Ok(())
    }

    /// Document names (without extension) stored under `area`
    pub(crate) fn names_in(&self, area: &str) -> Result<Vec<String>, StoreError> {
        let dir = self.dir.join(area);
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::io(area, e)),
        };

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StoreError::io(area, e))?;
            let file_name = entry.file_name();
            let file_name = file_name.to_string_lossy();
            if let Some(stem) = file_name.strip_suffix(".json") {
                names.push(format!("{}/{}", area, stem));
            }
        }
        names.sort();
        Ok(names)
    }

    // ===== Collection snapshots =====

    fn snapshot_name(key: &str) -> String {
        format!("{}/{}", SNAPSHOT_AREA, key)
    }

    pub fn load_snapshot<T: DeserializeOwned>(
        &self,
        key: &str,
    ) -> Result<Option<CachedData<Vec<T>>>, StoreError> {
        self.load(&Self::snapshot_name(key))
    }

    /// Replace the snapshot for `key` wholesale
    pub fn save_snapshot<T: Serialize>(&self, key: &str, items: &[T]) -> Result<(), StoreError> {
        self.save(&Self::snapshot_name(key), &CachedData::new(items))
    }

    /// Put a server-acknowledged record into the unfiltered snapshot of its
    /// collection, replacing the row with the same id or prepending it.
    /// Records without a server id are left out.
    pub fn upsert_snapshot_entry<T: Record>(&self, entity: &T) -> Result<(), StoreError> {
        let key = T::COLLECTION;
        let Some(id) = entity.server_id() else {
            debug!(collection = key, "Not caching a record without server id");
            return Ok(());
        };
        let row = serde_json::to_value(entity).map_err(|e| StoreError::serde(key, e))?;
        let mut rows: Vec<Value> = self
            .load_snapshot(key)?
            .map(|cached| cached.data)
            .unwrap_or_default();

        let existing = rows.iter().position(|r| {
            T::deserialize(r)
                .ok()
                .and_then(|existing| existing.server_id())
                == Some(id)
        });
        match existing {
            Some(pos) => rows[pos] = row,
            None => rows.insert(0, row),
        }
        self.save_snapshot(key, &rows)
    }

    /// Ages of every stored snapshot, keyed by snapshot name
    pub fn snapshot_ages(&self) -> Vec<(String, String)> {
        let names = match self.names_in(SNAPSHOT_AREA) {
            Ok(names) => names,
            Err(e) => {
                warn!(error = %e, "Failed to list snapshots");
                return Vec::new();
            }
        };

        names
            .into_iter()
            .filter_map(|name| {
                match self.load::<CachedData<serde::de::IgnoredAny>>(&name) {
                    Ok(Some(cached)) => {
                        let prefix = format!("{}/", SNAPSHOT_AREA);
                        let key = name.strip_prefix(&prefix).unwrap_or(&name);
                        Some((key.to_string(), cached.age_display()))
                    }
                    Ok(None) => None,
                    Err(e) => {
                        debug!(snapshot = %name, error = %e, "Failed to load snapshot for age display");
                        None
                    }
                }
            })
            .collect()
    }

    // ===== Utilization =====

    /// Total bytes of every file under the store directory
    pub fn usage_bytes(&self) -> u64 {
        fn walk(dir: &Path) -> u64 {
            let Ok(entries) = std::fs::read_dir(dir) else {
                return 0;
            };
            entries
                .flatten()
                .map(|entry| match entry.metadata() {
                    Ok(meta) if meta.is_dir() => walk(&entry.path()),
                    Ok(meta) => meta.len(),
                    Err(_) => 0,
                })
                .sum()
        }
        walk(&self.dir)
    }
}
