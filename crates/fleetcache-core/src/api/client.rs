//! API client for the fleet-maintenance REST API.
//!
//! Requests carry the session cookie the web application would send with
//! `credentials: 'include'`. Bodies are JSON whose field names are the
//! database columns.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, Method};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::auth::Session;
use crate::models::{AppParameter, ChatMessage, Instruction, Intervention, Record};

use super::{ApiError, ListQuery, RemoteSource};

// ============================================================================
// Constants
// ============================================================================

/// HTTP request timeout in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Maximum number of retries for rate-limited (429) requests.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
const INITIAL_BACKOFF_MS: u64 = 1000;

/// API client for the maintenance backend.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    cookie: Option<String>,
}

impl ApiClient {
    /// Create a new API client for `base_url` (e.g. `https://fleet.example.com`)
    pub fn new(base_url: &str) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            cookie: None,
        })
    }

    /// Attach the session cookie to every request
    pub fn set_session(&mut self, session: &Session) {
        self.cookie = session.cookie().map(str::to_string);
    }

    /// Create a new ApiClient with the given cookie, sharing the connection pool.
    pub fn with_cookie(&self, cookie: String) -> Self {
        Self {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            cookie: Some(cookie),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn session_headers(&self) -> Result<header::HeaderMap, ApiError> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("application/json"),
        );
        if let Some(ref cookie) = self.cookie {
            let value = header::HeaderValue::from_str(cookie)
                .map_err(|e| ApiError::InvalidResponse(format!("Invalid session cookie: {}", e)))?;
            headers.insert(header::COOKIE, value);
        }
        Ok(headers)
    }

    /// Check if response is successful, returning an error with body if not.
    /// Returns Ok(Some(response)) for success, Ok(None) for rate limit (should retry),
    /// or Err for other errors.
    async fn check_response_for_retry(
        response: reqwest::Response,
    ) -> Result<Option<reqwest::Response>, ApiError> {
        if response.status().is_success() {
            Ok(Some(response))
        } else if response.status().as_u16() == 429 {
            Ok(None)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }

    /// Send a request, retrying rate-limited responses with exponential backoff,
    /// and decode the JSON body.
    async fn request<T, B>(
        &self,
        method: Method,
        path: &str,
        query: &[(String, String)],
        body: Option<&B>,
    ) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let url = self.url(path);
        let mut retries = 0;
        let mut backoff_ms = INITIAL_BACKOFF_MS;

        loop {
            let mut builder = self
                .client
                .request(method.clone(), &url)
                .headers(self.session_headers()?)
                .query(query);
            if let Some(body) = body {
                builder = builder.json(body);
            }

            let response = builder.send().await?;

            match Self::check_response_for_retry(response).await? {
                Some(response) => {
                    let text = response.text().await?;
                    return serde_json::from_str(&text).map_err(|e| {
                        ApiError::InvalidResponse(format!("{} {}: {}", method, url, e))
                    });
                }
                None => {
                    retries += 1;
                    if retries > MAX_RATE_LIMIT_RETRIES {
                        return Err(ApiError::RateLimited);
                    }
                    warn!(url = %url, retry = retries, backoff_ms = backoff_ms, "Rate limited, backing off");
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                    backoff_ms *= 2;
                }
            }
        }
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, query: &ListQuery) -> Result<T, ApiError> {
        self.request::<T, ()>(Method::GET, path, &query.pairs(), None).await
    }

    // ===== Typed endpoints =====

    /// Fetch one page (or all) of a record collection
    pub async fn fetch_records<T: Record>(&self, query: &ListQuery) -> Result<Vec<T>, ApiError> {
        let values = self.fetch_list(T::ENDPOINT, query).await?;
        values
            .into_iter()
            .map(|v| serde_json::from_value(v).map_err(|e| ApiError::InvalidResponse(e.to_string())))
            .collect()
    }

    pub async fn fetch_parameters(&self) -> Result<Vec<AppParameter>, ApiError> {
        self.fetch_records(&ListQuery::new()).await
    }

    /// Fetch the chat thread for an intervention
    pub async fn fetch_chat(&self, intervention_id: i64) -> Result<Vec<ChatMessage>, ApiError> {
        let path = Intervention::chat_path(intervention_id);
        let values = self.fetch_list(&path, &ListQuery::new()).await?;
        debug!(intervention_id, count = values.len(), "Chat fetched");
        values
            .into_iter()
            .map(|v| serde_json::from_value(v).map_err(|e| ApiError::InvalidResponse(e.to_string())))
            .collect()
    }

    /// Post a chat message on an intervention
    pub async fn post_chat_message(
        &self,
        intervention_id: i64,
        message: &ChatMessage,
    ) -> Result<ChatMessage, ApiError> {
        let path = Intervention::chat_path(intervention_id);
        self.request(Method::POST, &path, &[], Some(message)).await
    }

    /// Fetch the instruction checklist for an intervention
    pub async fn fetch_instructions(&self, intervention_id: i64) -> Result<Vec<Instruction>, ApiError> {
        let path = Intervention::instructions_path(intervention_id);
        let values = self.fetch_list(&path, &ListQuery::new()).await?;
        values
            .into_iter()
            .map(|v| serde_json::from_value(v).map_err(|e| ApiError::InvalidResponse(e.to_string())))
            .collect()
    }
}

/// List endpoints answer either with a bare array or with `{"data": [...]}`
/// when pagination metadata is included.
fn unwrap_list(value: Value) -> Result<Vec<Value>, ApiError> {
    match value {
        Value::Array(items) => Ok(items),
        Value::Object(mut map) => match map.remove("data") {
            Some(Value::Array(items)) => Ok(items),
            _ => Err(ApiError::InvalidResponse(
                "Expected a JSON array or an object with a data array".to_string(),
            )),
        },
        other => Err(ApiError::InvalidResponse(format!(
            "Expected a JSON array, got {}",
            other
        ))),
    }
}

#[async_trait]
impl RemoteSource for ApiClient {
    async fn fetch_list(&self, path: &str, query: &ListQuery) -> Result<Vec<Value>, ApiError> {
        let value: Value = self.get(path, query).await?;
        unwrap_list(value)
    }

    async fn create(&self, path: &str, body: &Value) -> Result<Value, ApiError> {
        self.request(Method::POST, path, &[], Some(body)).await
    }

    async fn update(&self, path: &str, body: &Value) -> Result<Value, ApiError> {
        self.request(Method::PUT, path, &[], Some(body)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_url_joining() {
        let client = ApiClient::new("https://fleet.example.com/").unwrap();
        assert_eq!(client.base_url(), "https://fleet.example.com");
        assert_eq!(
            client.url("/api/contacts"),
            "https://fleet.example.com/api/contacts"
        );
        assert_eq!(client.url("api/users"), "https://fleet.example.com/api/users");
    }

    #[test]
    fn test_session_headers_carry_cookie() {
        let client = ApiClient::new("http://localhost").unwrap();
        assert!(client.session_headers().unwrap().get(header::COOKIE).is_none());

        let client = client.with_cookie("connect.sid=abc123".to_string());
        let headers = client.session_headers().unwrap();
        assert_eq!(headers.get(header::COOKIE).unwrap(), "connect.sid=abc123");
    }

    #[test]
    fn test_unwrap_list_shapes() {
        assert_eq!(unwrap_list(json!([1, 2])).unwrap().len(), 2);
        assert_eq!(
            unwrap_list(json!({"data": [{"IDCONTACT": 1}], "total": 40})).unwrap().len(),
            1
        );
        assert!(unwrap_list(json!({"rows": []})).is_err());
        assert!(unwrap_list(json!("nope")).is_err());
    }
}
