use std::collections::BTreeMap;

/// Query parameters for a list endpoint.
///
/// Pagination is the only contract the API offers (`page` / `limit`);
/// anything else goes into `filters` and is passed through verbatim.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub filters: BTreeMap<String, String>,
}

impl ListQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, page: u32) -> Self {
        self.page = Some(page);
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn filter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.insert(key.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.page.is_none() && self.limit.is_none() && self.filters.is_empty()
    }

    /// Query pairs sorted by key.
    pub fn pairs(&self) -> Vec<(String, String)> {
        let mut pairs: BTreeMap<String, String> = self.filters.clone();
        if let Some(page) = self.page {
            pairs.insert("page".to_string(), page.to_string());
        }
        if let Some(limit) = self.limit {
            pairs.insert("limit".to_string(), limit.to_string());
        }
        pairs.into_iter().collect()
    }

    /// Name of the cached snapshot for this query on `collection`.
    /// The bare collection name is used when there are no parameters.
    pub fn cache_key(&self, collection: &str) -> String {
        if self.is_empty() {
            return collection.to_string();
        }
        let suffix = self
            .pairs()
            .iter()
            .map(|(k, v)| format!("{}-{}", sanitize(k), sanitize(v)))
            .collect::<Vec<_>>()
            .join("_");
        format!("{}__{}", collection, suffix)
    }
}

/// Keep cache file names portable
fn sanitize(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '.' })
        .collect()
}
