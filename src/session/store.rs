//! Key-value persistence for the guide's session, so a reload can rejoin
//! the same meeting.

use crate::defaults;
use crate::error::{GuidecastError, Result};
use crate::language::LanguageCode;
use crate::session::adapter::MeetingInfo;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::debug;

pub trait SessionStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn delete(&self, key: &str) -> Result<()>;
}

impl<T: SessionStore + ?Sized> SessionStore for Arc<T> {
    fn get(&self, key: &str) -> Result<Option<String>> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        (**self).set(key, value)
    }

    fn delete(&self, key: &str) -> Result<()> {
        (**self).delete(key)
    }
}

/// In-memory store. Clones share contents.
#[derive(Debug, Clone, Default)]
pub struct MemorySessionStore {
    entries: Arc<Mutex<BTreeMap<String, String>>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, String>>> {
        self.entries.lock().map_err(|e| GuidecastError::Store {
            message: format!("lock poisoned: {}", e),
        })
    }
}

impl SessionStore for MemorySessionStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.entries()?.remove(key);
        Ok(())
    }
}

/// Store backed by one JSON object on disk.
///
/// Writes go to a temporary file that is renamed over the original.
#[derive(Debug)]
pub struct FileSessionStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileSessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Returns ~/.local/share/guidecast/session.json on Linux
    pub fn default_path() -> Option<PathBuf> {
        dirs::data_dir().map(|dir| dir.join("guidecast").join("session.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<BTreeMap<String, String>> {
        match fs::read_to_string(&self.path) {
            Ok(contents) if contents.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(contents) => Ok(serde_json::from_str(&contents)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_string_pretty(entries)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn update(&self, f: impl FnOnce(&mut BTreeMap<String, String>)) -> Result<()> {
        let _guard = self.lock.lock().map_err(|e| GuidecastError::Store {
            message: format!("lock poisoned: {}", e),
        })?;
        let mut entries = self.read()?;
        f(&mut entries);
        self.write(&entries)
    }
}

impl SessionStore for FileSessionStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.read()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.update(|entries| {
            entries.insert(key.to_string(), value.to_string());
        })
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.update(|entries| {
            entries.remove(key);
        })
    }
}

/// What is remembered about the guide's running session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuideSessionRecord {
    pub meeting: MeetingInfo,
    pub target_language: LanguageCode,
    pub created_at: u64,
    pub expires_at: u64,
}

fn unix_secs(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_secs()
}

impl GuideSessionRecord {
    pub fn new(meeting: MeetingInfo, target_language: LanguageCode, now: SystemTime) -> Self {
        let created_at = unix_secs(now);
        Self {
            meeting,
            target_language,
            created_at,
            expires_at: created_at + defaults::SESSION_RECORD_TTL.as_secs(),
        }
    }

    pub fn is_expired(&self, now: SystemTime) -> bool {
        unix_secs(now) >= self.expires_at
    }

    /// Load the stored record. Expired or unreadable records are deleted.
    pub fn load(store: &dyn SessionStore, now: SystemTime) -> Result<Option<Self>> {
        let Some(raw) = store.get(defaults::SESSION_RECORD_KEY)? else {
            return Ok(None);
        };

        match serde_json::from_str::<Self>(&raw) {
            Ok(record) if !record.is_expired(now) => Ok(Some(record)),
            Ok(_) => {
                debug!("Stored session record expired");
                store.delete(defaults::SESSION_RECORD_KEY)?;
                Ok(None)
            }
            Err(e) => {
                debug!(error = %e, "Discarding unreadable session record");
                store.delete(defaults::SESSION_RECORD_KEY)?;
                Ok(None)
            }
        }
    }

    pub fn save(&self, store: &dyn SessionStore) -> Result<()> {
        store.set(defaults::SESSION_RECORD_KEY, &serde_json::to_string(self)?)
    }

    pub fn clear(store: &dyn SessionStore) -> Result<()> {
        store.delete(defaults::SESSION_RECORD_KEY)
    }
}
