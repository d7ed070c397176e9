//! Request-scoped local cache.
//!
//! Values go in and come out as owned copies (`serde_json::Value` clones are
//! deep), so a caller mutating what it stored or what it read never changes
//! the cached entry.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::entry::Entry;

#[derive(Debug, Default)]
pub struct LocalCache {
    entries: Mutex<HashMap<String, Entry>>,
}

impl LocalCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the entry under `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Entry> {
        self.entries.lock().get(key).cloned()
    }

    pub fn insert(&self, key: impl Into<String>, entry: Entry) {
        let mut entries = self.entries.lock();
        entries.insert(key.into(), entry);
        crate::metrics::set_local_cache_entries(entries.len());
    }

    pub fn remove(&self, key: &str) -> Option<Entry> {
        let mut entries = self.entries.lock();
        let removed = entries.remove(key);
        crate::metrics::set_local_cache_entries(entries.len());
        removed
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.entries.lock().contains_key(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Drop every entry. Meant for request boundaries.
    pub fn clear(&self) {
        self.entries.lock().clear();
        crate::metrics::set_local_cache_entries(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_insert_get_remove() {
        let cache = LocalCache::new();
        assert!(cache.is_empty());

        cache.insert("k", Entry::Found(json!(1)));
        assert!(cache.contains("k"));
        assert_eq!(cache.get("k"), Some(Entry::Found(json!(1))));

        assert_eq!(cache.remove("k"), Some(Entry::Found(json!(1))));
        assert_eq!(cache.get("k"), None);
    }

    #[test]
    fn test_returned_value_is_a_copy() {
        let cache = LocalCache::new();
        cache.insert("k", Entry::Found(json!({"tags": ["a"]})));

        if let Some(Entry::Found(mut value)) = cache.get("k") {
            value["tags"].as_array_mut().unwrap().push(json!("b"));
        }

        assert_eq!(cache.get("k"), Some(Entry::Found(json!({"tags": ["a"]}))));
    }

    #[test]
    fn test_stored_value_is_a_copy() {
        let cache = LocalCache::new();
        let mut value = json!({"n": 1});
        cache.insert("k", Entry::Found(value.clone()));
        value["n"] = json!(2);

        assert_eq!(cache.get("k"), Some(Entry::Found(json!({"n": 1}))));
    }

    #[test]
    fn test_clear() {
        let cache = LocalCache::new();
        for i in 0..5 {
            cache.insert(format!("k{}", i), Entry::Missing);
        }
        assert_eq!(cache.len(), 5);

        cache.clear();
        assert!(cache.is_empty());
    }
}
