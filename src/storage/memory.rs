use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::mapref::entry::Entry as MapEntry;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::Value;

use super::traits::{unix_now, CacheError, Expiration, RemoteCache};

#[derive(Debug, Clone)]
struct Stored {
    data: Value,
    expires_at: Option<u64>,
}

impl Stored {
    fn is_live(&self, now: u64) -> bool {
        self.expires_at.map_or(true, |ts| ts > now)
    }
}

/// Process-local stand-in for a remote pool.
///
/// Counts every call so callers can assert round trips, and can be switched
/// offline to exercise backend-failure paths.
pub struct InMemoryRemote {
    name: String,
    data: DashMap<String, Stored>,
    calls: DashMap<&'static str, u64>,
    total_calls: AtomicU64,
    online: AtomicBool,
    last_multi: Mutex<Vec<String>>,
}

impl InMemoryRemote {
    #[must_use]
    pub fn new() -> Self {
        Self::named("memory")
    }

    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data: DashMap::new(),
            calls: DashMap::new(),
            total_calls: AtomicU64::new(0),
            online: AtomicBool::new(true),
            last_multi: Mutex::new(Vec::new()),
        }
    }

    /// Number of live entries
    #[must_use]
    pub fn len(&self) -> usize {
        let now = unix_now();
        self.data.iter().filter(|e| e.value().is_live(now)).count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Raw read that bypasses call accounting.
    #[must_use]
    pub fn peek(&self, key: &str) -> Option<Value> {
        let now = unix_now();
        self.data
            .get(key)
            .filter(|e| e.is_live(now))
            .map(|e| e.data.clone())
    }

    /// Absolute expiry recorded for a key, if any.
    #[must_use]
    pub fn expiry_of(&self, key: &str) -> Option<u64> {
        self.data.get(key).and_then(|e| e.expires_at)
    }

    /// Calls made for one command name (`"get"`, `"get_multi"`, `"set"`, ...).
    #[must_use]
    pub fn calls(&self, op: &str) -> u64 {
        self.calls.get(op).map(|c| *c).unwrap_or(0)
    }

    /// Calls made across all commands.
    #[must_use]
    pub fn total_calls(&self) -> u64 {
        self.total_calls.load(Ordering::SeqCst)
    }

    /// Keys requested by the most recent `get_multi`.
    #[must_use]
    pub fn last_multi_keys(&self) -> Vec<String> {
        self.last_multi.lock().clone()
    }

    /// Take the pool offline (every call fails) or bring it back.
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    fn track(&self, op: &'static str) -> Result<(), CacheError> {
        self.total_calls.fetch_add(1, Ordering::SeqCst);
        *self.calls.entry(op).or_insert(0) += 1;
        if self.online.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(CacheError::Unavailable { pool: self.name.clone() })
        }
    }

    fn live(&self, key: &str) -> Option<Stored> {
        let stored = self.data.get(key).map(|e| e.value().clone())?;
        if stored.is_live(unix_now()) {
            Some(stored)
        } else {
            self.data.remove(key);
            None
        }
    }

    fn store(&self, key: &str, value: &Value, expire: Expiration) {
        self.data.insert(
            key.to_string(),
            Stored { data: value.clone(), expires_at: expire.deadline() },
        );
    }

    fn apply_delta(&self, key: &str, delta: i64) -> Result<Option<i64>, CacheError> {
        let now = unix_now();
        let Some(mut entry) = self.data.get_mut(key).filter(|e| e.is_live(now)) else {
            return Ok(None);
        };
        // Counters are JSON integers; numeric strings are rejected like Redis does.
        let current = match &entry.data {
            Value::Number(n) => n.as_i64(),
            _ => None,
        }
        .ok_or_else(|| CacheError::Backend(format!("value at '{}' is not an integer", key)))?;
        let next = current.saturating_add(delta).max(0);
        entry.data = Value::from(next);
        Ok(Some(next))
    }
}

impl Default for InMemoryRemote {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteCache for InMemoryRemote {
    async fn get(&self, key: &str) -> Result<Option<Value>, CacheError> {
        self.track("get")?;
        Ok(self.live(key).map(|s| s.data))
    }

    async fn get_multi(&self, keys: &[String]) -> Result<HashMap<String, Value>, CacheError> {
        self.track("get_multi")?;
        *self.last_multi.lock() = keys.to_vec();
        Ok(keys
            .iter()
            .filter_map(|k| self.live(k).map(|s| (k.clone(), s.data)))
            .collect())
    }

    async fn add(&self, key: &str, value: &Value, expire: Expiration) -> Result<bool, CacheError> {
        self.track("add")?;
        let stored = Stored { data: value.clone(), expires_at: expire.deadline() };
        // Check-and-set under the shard lock so concurrent adds cannot both win.
        match self.data.entry(key.to_string()) {
            MapEntry::Occupied(mut existing) => {
                if existing.get().is_live(unix_now()) {
                    return Ok(false);
                }
                existing.insert(stored);
            }
            MapEntry::Vacant(slot) => {
                slot.insert(stored);
            }
        }
        Ok(true)
    }

    async fn set(&self, key: &str, value: &Value, expire: Expiration) -> Result<bool, CacheError> {
        self.track("set")?;
        self.store(key, value, expire);
        Ok(true)
    }

    async fn replace(&self, key: &str, value: &Value, expire: Expiration) -> Result<bool, CacheError> {
        self.track("replace")?;
        if self.live(key).is_none() {
            return Ok(false);
        }
        self.store(key, value, expire);
        Ok(true)
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        self.track("delete")?;
        Ok(self.data.remove(key).is_some())
    }

    async fn increment(&self, key: &str, delta: u64) -> Result<Option<i64>, CacheError> {
        self.track("increment")?;
        self.apply_delta(key, i64::try_from(delta).unwrap_or(i64::MAX))
    }

    async fn decrement(&self, key: &str, delta: u64) -> Result<Option<i64>, CacheError> {
        self.track("decrement")?;
        self.apply_delta(key, -i64::try_from(delta).unwrap_or(i64::MAX))
    }
}
