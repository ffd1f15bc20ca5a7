//! In-memory `RemoteSource` for tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;

use crate::api::{ApiError, ListQuery, RemoteSource};

#[derive(Default)]
struct FakeState {
    lists: HashMap<String, Vec<Value>>,
    failures: HashMap<String, u16>,
    unreachable: bool,
    /// (method, path, body) of every create/update that reached the fake
    writes: Vec<(String, String, Value)>,
    requests: usize,
    next_id: i64,
    /// Body returned by every create/update instead of the echo
    ack: Option<Value>,
}

/// Fake backend. Lists are served per path; creates echo the body with an
/// id column set, counting up from 482.
#[derive(Default)]
pub struct FakeRemote {
    state: Mutex<FakeState>,
}

impl FakeRemote {
    pub fn set_list(&self, path: &str, items: Vec<Value>) {
        self.state.lock().unwrap().lists.insert(path.to_string(), items);
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.state.lock().unwrap().unreachable = unreachable;
    }

    pub fn fail_with_status(&self, path: &str, status: u16) {
        self.state.lock().unwrap().failures.insert(path.to_string(), status);
    }

    pub fn clear_failure(&self, path: &str) {
        self.state.lock().unwrap().failures.remove(path);
    }

    pub fn set_ack(&self, ack: Option<Value>) {
        self.state.lock().unwrap().ack = ack;
    }

    pub fn request_count(&self) -> usize {
        self.state.lock().unwrap().requests
    }

    pub fn writes(&self) -> Vec<(String, String, Value)> {
        self.state.lock().unwrap().writes.clone()
    }

    fn check(&self, path: &str) -> Result<(), ApiError> {
        let mut state = self.state.lock().unwrap();
        state.requests += 1;
        if state.unreachable {
            return Err(ApiError::Offline);
        }
        if let Some(&code) = state.failures.get(path) {
            let status = StatusCode::from_u16(code).unwrap();
            return Err(ApiError::from_status(status, "fake failure"));
        }
        Ok(())
    }

    fn store(&self, method: &str, path: &str, body: &Value) -> Value {
        let mut state = self.state.lock().unwrap();
        state.writes.push((method.to_string(), path.to_string(), body.clone()));
        body.clone()
    }
}

#[async_trait]
impl RemoteSource for FakeRemote {
    async fn fetch_list(&self, path: &str, _query: &ListQuery) -> Result<Vec<Value>, ApiError> {
        self.check(path)?;
        Ok(self
            .state
            .lock()
            .unwrap()
            .lists
            .get(path)
            .cloned()
            .unwrap_or_default())
    }

    async fn create(&self, path: &str, body: &Value) -> Result<Value, ApiError> {
        self.check(path)?;
        let mut stored = self.store("POST", path, body);
        if let Some(ack) = self.state.lock().unwrap().ack.clone() {
            return Ok(ack);
        }
        let id = {
            let mut state = self.state.lock().unwrap();
            if state.next_id == 0 {
                state.next_id = 482;
            }
            let id = state.next_id;
            state.next_id += 1;
            id
        };
        if let Value::Object(ref mut map) = stored {
            let id_field = match path {
                "/api/interventions" => "IDINTER",
                "/api/contacts" => "IDCONTACT",
                "/api/vehicules" => "IDVEHICULE",
                _ => "ID",
            };
            map.insert(id_field.to_string(), Value::from(id));
        }
        Ok(stored)
    }

    async fn update(&self, path: &str, body: &Value) -> Result<Value, ApiError> {
        self.check(path)?;
        let stored = self.store("PUT", path, body);
        Ok(self.state.lock().unwrap().ack.clone().unwrap_or(stored))
    }
}
