use async_trait::async_trait;
use serde_json::Value;

use super::{ApiError, ListQuery};

/// The network side of the cache.
///
/// Bodies are plain JSON so the loader and sync engine can stay generic over
/// record types; conversion to typed records happens on their side.
#[async_trait]
pub trait RemoteSource: Send + Sync {
    /// GET a JSON array from `path`.
    async fn fetch_list(&self, path: &str, query: &ListQuery) -> Result<Vec<Value>, ApiError>;

    /// POST a new record, returning the stored record.
    async fn create(&self, path: &str, body: &Value) -> Result<Value, ApiError>;

    /// PUT an existing record, returning the stored record.
    async fn update(&self, path: &str, body: &Value) -> Result<Value, ApiError>;
}
