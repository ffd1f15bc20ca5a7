use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Session file name in cache directory
const SESSION_FILE: &str = "session.json";

/// Environment variable that overrides the stored session cookie
pub const SESSION_ENV_VAR: &str = "FLEETCACHE_SESSION";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionData {
    /// Raw `Cookie` header value, e.g. `connect.sid=s%3A...`
    pub cookie: String,
    pub username: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl SessionData {
    pub fn new(cookie: String, username: Option<String>) -> Self {
        Self {
            cookie,
            username,
            created_at: Utc::now(),
        }
    }
}

/// Explicit session handle passed to the API client.
pub struct Session {
    cache_dir: PathBuf,
    pub data: Option<SessionData>,
}

impl Session {
    pub fn new(cache_dir: PathBuf) -> Self {
        Self {
            cache_dir,
            data: None,
        }
    }

    /// Load session from the environment, falling back to disk.
    /// Returns whether a session is now available.
    pub fn load(&mut self) -> Result<bool> {
        if let Ok(cookie) = std::env::var(SESSION_ENV_VAR) {
            if !cookie.trim().is_empty() {
                self.data = Some(SessionData::new(cookie.trim().to_string(), None));
                return Ok(true);
            }
        }

        let path = self.session_path();
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .context("Failed to read session file")?;
            let data: SessionData = serde_json::from_str(&contents)
                .context("Failed to parse session file")?;
            self.data = Some(data);
            return Ok(true);
        }
        Ok(false)
    }

    /// Save session to disk
    pub fn save(&self) -> Result<()> {
        if let Some(ref data) = self.data {
            let path = self.session_path();
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let contents = serde_json::to_string_pretty(data)?;
            std::fs::write(path, contents)?;
        }
        Ok(())
    }

    /// Clear session data
    pub fn clear(&mut self) -> Result<()> {
        self.data = None;
        let path = self.session_path();
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }

    pub fn update(&mut self, data: SessionData) {
        self.data = Some(data);
    }

    /// Cookie header value if a session is present
    pub fn cookie(&self) -> Option<&str> {
        self.data.as_ref().map(|d| d.cookie.as_str())
    }

    pub fn username(&self) -> Option<&str> {
        self.data.as_ref().and_then(|d| d.username.as_deref())
    }

    fn session_path(&self) -> PathBuf {
        self.cache_dir.join(SESSION_FILE)
    }
}
