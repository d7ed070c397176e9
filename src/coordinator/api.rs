//! Key-level cache operations.
//!
//! - `add()` / `set()` / `replace()` - Writes, mirrored into the local cache
//! - `get()` / `get_multi()` - Reads, local first
//! - `delete()` - Remote delete, then local
//! - `increment()` / `decrement()` - Remote counters
//! - `mark_refresh()` - Force the next reader back to its source of truth

use std::time::Instant;

use serde_json::Value;
use tracing::{debug, warn};

use crate::batch::MultiResult;
use crate::entry::{refresh_marker, Entry};
use crate::groups::normalize;
use crate::storage::traits::{CacheError, Expiration};

use super::{CacheOp, ObjectCache};

/// Aggregate key whose every write is followed by a delete.
const ALLOPTIONS: (&str, &str) = ("alloptions", "options");

/// Negative-lookup key that must never carry these members.
const NOTOPTIONS: (&str, &str) = ("notoptions", "options");
const PROTECTED_OPTIONS: [&str; 2] = ["home", "siteurl"];

fn guard_notoptions(id: &str, group: &str, mut data: Value) -> Value {
    if (id, group) != NOTOPTIONS {
        return data;
    }
    if let Value::Object(map) = &mut data {
        for option in PROTECTED_OPTIONS {
            if map.remove(option).is_some() {
                warn!(option, "Tried to set {} in notoptions, dropped it", option);
            }
        }
    }
    data
}

impl ObjectCache {
    fn is_non_persistent(&self, group: &str) -> bool {
        self.groups.read().is_non_persistent(group)
    }

    /// ttl 0 means "use the configured default".
    fn effective_ttl(&self, ttl: u64) -> u64 {
        if ttl == 0 {
            self.config.default_expiration
        } else {
            ttl
        }
    }

    fn remote_failed(&self, op: CacheOp, group: &str, id: &str, error: &CacheError) {
        warn!(operation = %op, group, id, error = %error, "Remote cache call failed");
        crate::metrics::record_error(op.as_str(), group);
    }

    /// Store `data` only if nothing is cached under `(group, id)`.
    ///
    /// A local absence marker does not block the add. Non-persistent groups
    /// always succeed and never reach the remote tier.
    #[tracing::instrument(skip(self, data))]
    pub async fn add(&self, id: &str, data: Value, group: &str, ttl: u64) -> bool {
        let group = normalize(group);
        let key = self.keys.resolve(id, group).await;

        if self.is_non_persistent(group) {
            self.local.insert(key, Entry::from_value(data));
            return true;
        }
        if matches!(self.local.get(&key), Some(entry) if !entry.is_missing()) {
            debug!("Already cached locally");
            return false;
        }

        let start = Instant::now();
        let expire = Expiration::relative(self.effective_ttl(ttl));
        match self.router.pool_for(group).add(&key, &data, expire).await {
            Ok(true) => {
                self.stats.record(CacheOp::Add.as_str(), group, id, start.elapsed());
                self.local.insert(key, Entry::from_value(data));
                true
            }
            Ok(false) => {
                debug!("Already cached remotely");
                false
            }
            Err(e) => {
                self.remote_failed(CacheOp::Add, group, id, &e);
                false
            }
        }
    }

    /// Unconditionally store `data` under `(group, id)`.
    ///
    /// Refused while a refresh marker is cached for the key. The local cache
    /// takes the value even when the remote write fails, so the rest of the
    /// request reads what it wrote.
    #[tracing::instrument(skip(self, data))]
    pub async fn set(&self, id: &str, data: Value, group: &str, ttl: u64) -> bool {
        let group = normalize(group);
        if self.config.installing {
            debug!("Installing, set becomes delete");
            return self.delete(id, group).await;
        }

        let data = guard_notoptions(id, group, data);
        let key = self.keys.resolve(id, group).await;

        if self.local.get(&key).is_some_and(|entry| entry.is_refresh()) {
            debug!("Refresh pending, refusing to overwrite");
            return false;
        }

        self.local.insert(key.clone(), Entry::from_value(data.clone()));
        if self.is_non_persistent(group) {
            return true;
        }

        let start = Instant::now();
        let expire = Expiration::absolute(self.effective_ttl(ttl));
        let result = self.router.pool_for(group).set(&key, &data, expire).await;
        self.stats.record(CacheOp::Set.as_str(), group, id, start.elapsed());

        let stored = match result {
            Ok(stored) => stored,
            Err(e) => {
                self.remote_failed(CacheOp::Set, group, id, &e);
                false
            }
        };

        if (id, group) == ALLOPTIONS {
            self.delete(ALLOPTIONS.0, ALLOPTIONS.1).await;
        }
        stored
    }

    /// Overwrite `(group, id)` only if it already exists remotely.
    #[tracing::instrument(skip(self, data))]
    pub async fn replace(&self, id: &str, data: Value, group: &str, ttl: u64) -> bool {
        let group = normalize(group);
        let key = self.keys.resolve(id, group).await;

        if self.is_non_persistent(group) {
            if !matches!(self.local.get(&key), Some(Entry::Found(_))) {
                return false;
            }
            self.local.insert(key, Entry::from_value(data));
            return true;
        }

        let expire = Expiration::relative(self.effective_ttl(ttl));
        match self.router.pool_for(group).replace(&key, &data, expire).await {
            Ok(true) => {
                self.local.insert(key, Entry::from_value(data));
                true
            }
            Ok(false) => false,
            Err(e) => {
                self.remote_failed(CacheOp::Replace, group, id, &e);
                false
            }
        }
    }

    /// Remove `(group, id)`.
    ///
    /// The local entry is dropped only once the remote tier confirms the delete.
    #[tracing::instrument(skip(self))]
    pub async fn delete(&self, id: &str, group: &str) -> bool {
        let group = normalize(group);
        let key = self.keys.resolve(id, group).await;

        if self.is_non_persistent(group) {
            self.local.remove(&key);
            return true;
        }

        let start = Instant::now();
        let result = self.router.pool_for(group).delete(&key).await;
        self.stats.record(CacheOp::Delete.as_str(), group, id, start.elapsed());

        match result {
            Ok(true) => {
                self.local.remove(&key);
                true
            }
            Ok(false) => false,
            Err(e) => {
                self.remote_failed(CacheOp::Delete, group, id, &e);
                false
            }
        }
    }

    /// Read `(group, id)`.
    ///
    /// Served locally when possible. `force` re-reads the remote tier except
    /// for non-persistent groups. A refresh marker reads as `None` and is
    /// cleared, so the caller's next write goes through.
    #[tracing::instrument(skip(self))]
    pub async fn get(&self, id: &str, group: &str, force: bool) -> Option<Value> {
        let group = normalize(group);
        let key = self.keys.resolve(id, group).await;
        let non_persistent = self.is_non_persistent(group);

        let entry = match self.local.get(&key) {
            Some(entry) if !force || non_persistent => {
                crate::metrics::record_local_hit(group);
                entry
            }
            _ if non_persistent => {
                self.local.insert(key.clone(), Entry::Missing);
                Entry::Missing
            }
            _ => {
                let start = Instant::now();
                let result = self.router.pool_for(group).get(&key).await;
                self.stats.record(CacheOp::Get.as_str(), group, id, start.elapsed());

                match result {
                    Ok(value) => {
                        crate::metrics::record_lookup(group, if value.is_some() { "hit" } else { "miss" });
                        let entry = Entry::from_remote(value);
                        self.local.insert(key.clone(), entry.clone());
                        entry
                    }
                    Err(e) => {
                        self.remote_failed(CacheOp::Get, group, id, &e);
                        return None;
                    }
                }
            }
        };

        if entry.is_refresh() {
            self.local.remove(&key);
            return None;
        }
        entry.into_value()
    }

    /// Read many ids across groups, one remote call per pool at most.
    ///
    /// ```rust
    /// # use std::sync::Arc;
    /// # use object_cache::{ObjectCache, ObjectCacheConfig, StaticTenant, TierRouter};
    /// # use object_cache::storage::memory::InMemoryRemote;
    /// # #[tokio::main]
    /// # async fn main() {
    /// # let router = Arc::new(TierRouter::new(Arc::new(InMemoryRemote::new())));
    /// # let cache = ObjectCache::new(ObjectCacheConfig::default(), &StaticTenant::multi("1"), router);
    /// let found = cache.get_multi([("posts", vec!["1", "2"]), ("terms", vec!["7"])]).await;
    /// assert_eq!(found["posts"]["1"], None);
    /// # }
    /// ```
    #[tracing::instrument(skip_all)]
    pub async fn get_multi<I, G, J, S>(&self, requested: I) -> MultiResult
    where
        I: IntoIterator<Item = (G, J)>,
        G: Into<String>,
        J: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let requested: Vec<(String, Vec<String>)> = requested
            .into_iter()
            .map(|(group, ids)| (group.into(), ids.into_iter().map(Into::into).collect()))
            .collect();
        self.batch.fetch(&self.keys, &requested).await
    }

    /// Add `delta` to a cached integer. `None` if nothing is cached.
    #[tracing::instrument(skip(self))]
    pub async fn increment(&self, id: &str, delta: u64, group: &str) -> Option<i64> {
        self.adjust(CacheOp::Increment, id, delta, group).await
    }

    /// Subtract `delta` from a cached integer, flooring at zero.
    #[tracing::instrument(skip(self))]
    pub async fn decrement(&self, id: &str, delta: u64, group: &str) -> Option<i64> {
        self.adjust(CacheOp::Decrement, id, delta, group).await
    }

    async fn adjust(&self, op: CacheOp, id: &str, delta: u64, group: &str) -> Option<i64> {
        let group = normalize(group);
        let key = self.keys.resolve(id, group).await;

        if self.is_non_persistent(group) {
            let current = self.local.get(&key)?.as_i64()?;
            let delta = i64::try_from(delta).unwrap_or(i64::MAX);
            let next = match op {
                CacheOp::Increment => current.saturating_add(delta),
                _ => current.saturating_sub(delta).max(0),
            };
            self.local.insert(key, Entry::Found(Value::from(next)));
            return Some(next);
        }

        let pool = self.router.pool_for(group);
        let result = match op {
            CacheOp::Increment => pool.increment(&key, delta).await,
            _ => pool.decrement(&key, delta).await,
        };

        match result {
            Ok(Some(value)) => {
                self.local.insert(key, Entry::Found(Value::from(value)));
                Some(value)
            }
            Ok(None) => {
                self.local.insert(key, Entry::Missing);
                None
            }
            Err(e) => {
                self.remote_failed(op, group, id, &e);
                self.local.remove(&key);
                None
            }
        }
    }

    /// Cache the refresh marker for `(group, id)`.
    ///
    /// Until a `get` clears it, readers see `None` and `set` is refused.
    #[tracing::instrument(skip(self))]
    pub async fn mark_refresh(&self, id: &str, group: &str) -> bool {
        let group = normalize(group);
        let key = self.keys.resolve(id, group).await;
        self.local.insert(key.clone(), Entry::Refresh);

        if self.is_non_persistent(group) {
            return true;
        }
        match self.router.pool_for(group).set(&key, &refresh_marker(), Expiration::Never).await {
            Ok(stored) => stored,
            Err(e) => {
                self.remote_failed(CacheOp::Set, group, id, &e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_notoptions_guard_strips_protected_members() {
        let data = json!({"home": 1, "siteurl": 1, "blogname": 1});
        let guarded = guard_notoptions("notoptions", "options", data);
        assert_eq!(guarded, json!({"blogname": 1}));
    }

    #[test]
    fn test_notoptions_guard_ignores_other_keys() {
        let data = json!({"home": 1});
        assert_eq!(guard_notoptions("notoptions", "other", data.clone()), data);
        assert_eq!(guard_notoptions("alloptions", "options", data.clone()), data);
        assert_eq!(guard_notoptions("notoptions", "options", json!("home")), json!("home"));
    }
}
