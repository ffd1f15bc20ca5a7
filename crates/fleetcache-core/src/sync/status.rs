use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::age_display;
use crate::utils::format_bytes;

/// Read model of the offline cache, recomputed on every change and never
/// persisted as a whole.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub is_online: bool,
    pub total_pending: usize,
    pub storage_used_bytes: u64,
    pub storage_quota_bytes: u64,
    pub storage_percent: f64,
    pub last_sync: Option<DateTime<Utc>>,
}

impl SyncStatus {
    pub fn new(
        is_online: bool,
        total_pending: usize,
        storage_used_bytes: u64,
        storage_quota_bytes: u64,
        last_sync: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            is_online,
            total_pending,
            storage_used_bytes,
            storage_quota_bytes,
            storage_percent: storage_percent(storage_used_bytes, storage_quota_bytes),
            last_sync,
        }
    }

    pub fn last_sync_display(&self) -> String {
        match self.last_sync {
            Some(at) => age_display((Utc::now() - at).num_minutes()),
            None => "never".to_string(),
        }
    }

    /// One-line summary, e.g. `online | 2 pending | 1.2 MB of 50.0 MB (2.4%) | synced 5m ago`
    pub fn summary(&self) -> String {
        format!(
            "{} | {} pending | {} of {} ({:.1}%) | synced {}",
            if self.is_online { "online" } else { "offline" },
            self.total_pending,
            format_bytes(self.storage_used_bytes),
            format_bytes(self.storage_quota_bytes),
            self.storage_percent,
            self.last_sync_display()
        )
    }
}

/// Percentage of the quota in use, clamped to 0..=100. A zero quota reports 0.
pub fn storage_percent(used: u64, quota: u64) -> f64 {
    if quota == 0 {
        return 0.0;
    }
    ((used as f64 / quota as f64) * 100.0).min(100.0)
}
