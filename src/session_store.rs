//! Session persistence.
//!
//! A [`SessionStore`] keeps one [`SessionRecord`] per session id. The host
//! loads the record before a page runs and saves it afterwards, so stores
//! only ever see whole records. Two stores are provided: an in-memory map
//! and a directory of JSON files. [`spawn_reaper`] expires idle sessions
//! in the background.

use crate::value::StoredValue;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::thread::JoinHandle;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("session store I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("corrupt session record: {0}")]
    Json(#[from] serde_json::Error),
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Everything kept for one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Insertion-ordered; keys compare case-insensitively
    pub values: Vec<(String, StoredValue)>,
    pub timeout_minutes: i64,
    /// Unix seconds
    pub created: i64,
    /// Unix seconds
    pub last_access: i64,
}

impl SessionRecord {
    pub fn new(timeout_minutes: i64) -> Self {
        let now = unix_now();
        SessionRecord {
            values: Vec::new(),
            timeout_minutes,
            created: now,
            last_access: now,
        }
    }

    pub fn get(&self, key: &str) -> Option<&StoredValue> {
        self.values
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v)
    }

    /// Replace in place, keeping the original key spelling and position.
    pub fn set(&mut self, key: &str, value: StoredValue) {
        match self.values.iter_mut().find(|(k, _)| k.eq_ignore_ascii_case(key)) {
            Some(slot) => slot.1 = value,
            None => self.values.push((key.to_string(), value)),
        }
    }

    pub fn remove(&mut self, key: &str) {
        self.values.retain(|(k, _)| !k.eq_ignore_ascii_case(key));
    }

    pub fn touch(&mut self) {
        self.last_access = unix_now();
    }

    pub fn is_expired_at(&self, now: i64) -> bool {
        now - self.last_access > self.timeout_minutes.max(1) * 60
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(unix_now())
    }
}

/// Backing storage for sessions. Implementations are shared across
/// request threads.
pub trait SessionStore: Send + Sync {
    /// Live record for `id`. Expired records are dropped and reported as
    /// missing.
    fn get(&self, id: &str) -> Result<Option<SessionRecord>, SessionError>;

    fn set(&self, id: &str, record: &SessionRecord) -> Result<(), SessionError>;

    /// Remove a session outright (`Session.Abandon`).
    fn expire(&self, id: &str) -> Result<(), SessionError>;

    /// Remove every expired session and hand them back so `Session_OnEnd`
    /// can run for each.
    fn purge_expired(&self) -> Result<Vec<(String, SessionRecord)>, SessionError>;
}

#[derive(Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<String, SessionRecord>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sessions.read().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SessionStore for MemorySessionStore {
    fn get(&self, id: &str) -> Result<Option<SessionRecord>, SessionError> {
        let found = {
            let sessions = self.sessions.read().unwrap_or_else(|e| e.into_inner());
            sessions.get(id).cloned()
        };
        match found {
            Some(record) if record.is_expired() => {
                self.expire(id)?;
                Ok(None)
            }
            other => Ok(other),
        }
    }

    fn set(&self, id: &str, record: &SessionRecord) -> Result<(), SessionError> {
        self.sessions
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id.to_string(), record.clone());
        Ok(())
    }

    fn expire(&self, id: &str) -> Result<(), SessionError> {
        self.sessions
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(id);
        Ok(())
    }

    fn purge_expired(&self) -> Result<Vec<(String, SessionRecord)>, SessionError> {
        let now = unix_now();
        let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
        let expired: Vec<String> = sessions
            .iter()
            .filter(|(_, r)| r.is_expired_at(now))
            .map(|(id, _)| id.clone())
            .collect();
        Ok(expired
            .into_iter()
            .filter_map(|id| sessions.remove(&id).map(|r| (id, r)))
            .collect())
    }
}

/// One `<id>.json` file per session.
pub struct FileSessionStore {
    dir: PathBuf,
    lock: RwLock<()>,
}

impl FileSessionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, SessionError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(FileSessionStore {
            dir,
            lock: RwLock::new(()),
        })
    }

    fn path_for(&self, id: &str) -> PathBuf {
        let safe: String = id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{}.json", safe))
    }

    fn read(&self, id: &str) -> Result<Option<SessionRecord>, SessionError> {
        match std::fs::read_to_string(self.path_for(id)) {
            Ok(text) => Ok(Some(serde_json::from_str(&text)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn remove_file(&self, id: &str) -> Result<(), SessionError> {
        match std::fs::remove_file(self.path_for(id)) {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}

impl SessionStore for FileSessionStore {
    fn get(&self, id: &str) -> Result<Option<SessionRecord>, SessionError> {
        let _guard = self.lock.write().unwrap_or_else(|e| e.into_inner());
        match self.read(id)? {
            Some(record) if record.is_expired() => {
                self.remove_file(id)?;
                Ok(None)
            }
            other => Ok(other),
        }
    }

    fn set(&self, id: &str, record: &SessionRecord) -> Result<(), SessionError> {
        let _guard = self.lock.write().unwrap_or_else(|e| e.into_inner());
        let text = serde_json::to_string(record)?;
        std::fs::write(self.path_for(id), text)?;
        Ok(())
    }

    fn expire(&self, id: &str) -> Result<(), SessionError> {
        let _guard = self.lock.write().unwrap_or_else(|e| e.into_inner());
        self.remove_file(id)
    }

    fn purge_expired(&self) -> Result<Vec<(String, SessionRecord)>, SessionError> {
        let _guard = self.lock.write().unwrap_or_else(|e| e.into_inner());
        let now = unix_now();
        let mut expired = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(id) = path.file_stem().and_then(|s| s.to_str()).map(str::to_string) else {
                continue;
            };
            let record: SessionRecord = match std::fs::read_to_string(&path)
                .map_err(SessionError::from)
                .and_then(|text| serde_json::from_str(&text).map_err(SessionError::from))
            {
                Ok(record) => record,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "dropping unreadable session file");
                    std::fs::remove_file(&path)?;
                    continue;
                }
            };
            if record.is_expired_at(now) {
                std::fs::remove_file(&path)?;
                expired.push((id, record));
            }
        }
        Ok(expired)
    }
}

/// Background expiry thread. Dropping it (or calling [`Reaper::stop`])
/// stops the thread.
pub struct Reaper {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Reaper {
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Reaper {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Purge `store` every `interval`, passing each expired session to
/// `on_expired`.
pub fn spawn_reaper<F>(store: Arc<dyn SessionStore>, interval: Duration, on_expired: F) -> Reaper
where
    F: Fn(&str, &SessionRecord) + Send + 'static,
{
    let stop = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&stop);
    let tick = Duration::from_millis(50).min(interval);
    let handle = std::thread::spawn(move || {
        let mut waited = Duration::ZERO;
        while !flag.load(Ordering::SeqCst) {
            std::thread::sleep(tick);
            waited += tick;
            if waited < interval {
                continue;
            }
            waited = Duration::ZERO;
            match store.purge_expired() {
                Ok(expired) => {
                    for (id, record) in &expired {
                        tracing::info!(session = %id, "session expired");
                        on_expired(id, record);
                    }
                }
                Err(e) => tracing::warn!(error = %e, "session purge failed"),
            }
        }
    });
    Reaper {
        stop,
        handle: Some(handle),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn stale(mut record: SessionRecord) -> SessionRecord {
        record.last_access -= record.timeout_minutes * 60 + 5;
        record
    }

    #[test]
    fn test_record_keys_are_case_insensitive() {
        let mut r = SessionRecord::new(20);
        r.set("User", StoredValue::String("ann".into()));
        r.set("USER", StoredValue::String("bob".into()));
        assert_eq!(r.values.len(), 1);
        assert_eq!(r.values[0].0, "User");
        assert_eq!(r.get("user"), Some(&StoredValue::String("bob".into())));
        r.remove("uSeR");
        assert!(r.get("user").is_none());
    }

    #[test]
    fn test_memory_store_expires_on_get() {
        let store = MemorySessionStore::new();
        store.set("a", &SessionRecord::new(20)).unwrap();
        store.set("b", &stale(SessionRecord::new(1))).unwrap();
        assert!(store.get("a").unwrap().is_some());
        assert!(store.get("b").unwrap().is_none());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_memory_store_purge_returns_expired() {
        let store = MemorySessionStore::new();
        store.set("live", &SessionRecord::new(20)).unwrap();
        store.set("old", &stale(SessionRecord::new(1))).unwrap();
        let purged = store.purge_expired().unwrap();
        assert_eq!(purged.len(), 1);
        assert_eq!(purged[0].0, "old");
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path().join("sessions")).unwrap();
        let mut record = SessionRecord::new(20);
        record.set("count", StoredValue::Integer(3));
        store.set("abc-1", &record).unwrap();
        assert!(dir.path().join("sessions/abc-1.json").exists());
        assert_eq!(store.get("abc-1").unwrap(), Some(record));
        store.expire("abc-1").unwrap();
        assert!(store.get("abc-1").unwrap().is_none());
        store.expire("never-existed").unwrap();
    }

    #[test]
    fn test_file_store_sanitizes_ids() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path()).unwrap();
        store.set("../escape", &SessionRecord::new(20)).unwrap();
        assert!(dir.path().join("___escape.json").exists());
    }

    #[test]
    fn test_file_store_purge() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path()).unwrap();
        store.set("keep", &SessionRecord::new(20)).unwrap();
        store.set("drop", &stale(SessionRecord::new(1))).unwrap();
        let purged = store.purge_expired().unwrap();
        assert_eq!(purged.iter().map(|(id, _)| id.as_str()).collect::<Vec<_>>(), ["drop"]);
        assert!(store.get("keep").unwrap().is_some());
    }

    #[test]
    fn test_reaper_reports_expired_sessions() {
        let store: Arc<dyn SessionStore> = Arc::new(MemorySessionStore::new());
        store.set("old", &stale(SessionRecord::new(1))).unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let reaper = spawn_reaper(Arc::clone(&store), Duration::from_millis(10), move |id, _| {
            sink.lock().unwrap().push(id.to_string());
        });
        for _ in 0..100 {
            if !seen.lock().unwrap().is_empty() {
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        reaper.stop();
        assert_eq!(*seen.lock().unwrap(), vec!["old".to_string()]);
    }
}
