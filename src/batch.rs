//! Batched multi-key reads.
//!
//! ```text
//! requested ids ──► local hit? ──yes──► result
//!                      │ no
//!                      ▼
//!               non-persistent? ──yes──► absent
//!                      │ no
//!                      ▼
//!            pending keys, grouped by pool ──► one get_multi per pool
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;
use serde_json::Value;
use tracing::{debug, warn};

use crate::entry::{is_refresh_marker, Entry};
use crate::groups::{normalize, GroupRegistry};
use crate::keys::KeyNamespacer;
use crate::local::LocalCache;
use crate::routing::TierRouter;
use crate::stats::StatsCollector;

/// Group → id → value. Ids with nothing cached map to `None`.
pub type MultiResult = BTreeMap<String, BTreeMap<String, Option<Value>>>;

/// An id that has to go to the remote tier.
struct Pending {
    group: String,
    id: String,
    key: String,
}

pub struct BatchFetcher {
    local: Arc<LocalCache>,
    router: Arc<TierRouter>,
    groups: Arc<RwLock<GroupRegistry>>,
    stats: Arc<StatsCollector>,
}

impl BatchFetcher {
    pub fn new(
        local: Arc<LocalCache>,
        router: Arc<TierRouter>,
        groups: Arc<RwLock<GroupRegistry>>,
        stats: Arc<StatsCollector>,
    ) -> Self {
        Self { local, router, groups, stats }
    }

    /// Resolve every requested id, touching each involved pool at most once.
    ///
    /// Remote hits are mirrored into the local cache; remote misses are not.
    /// A pool that fails reports all of its ids as absent.
    pub async fn fetch(&self, keys: &KeyNamespacer, requested: &[(String, Vec<String>)]) -> MultiResult {
        let mut result: MultiResult = BTreeMap::new();
        let mut by_pool: BTreeMap<String, Vec<Pending>> = BTreeMap::new();

        for (group, ids) in requested {
            let group = normalize(group);
            let non_persistent = self.groups.read().is_non_persistent(group);

            for id in ids {
                let key = keys.resolve(id, group).await;
                let value = match self.local.get(&key) {
                    Some(Entry::Found(value)) => {
                        crate::metrics::record_local_hit(group);
                        Some(value)
                    }
                    Some(Entry::Refresh) => {
                        self.local.remove(&key);
                        None
                    }
                    Some(Entry::Missing) => None,
                    None if non_persistent => None,
                    None => {
                        by_pool
                            .entry(self.router.pool_name_for(group).to_string())
                            .or_default()
                            .push(Pending { group: group.to_string(), id: id.clone(), key });
                        None
                    }
                };
                result.entry(group.to_string()).or_default().insert(id.clone(), value);
            }
        }

        if by_pool.is_empty() {
            return result;
        }

        let start = Instant::now();
        let mut fetched = Vec::new();

        for (pool_name, pending) in by_pool {
            let pool_keys: Vec<String> = pending.iter().map(|p| p.key.clone()).collect();
            debug!(pool = %pool_name, keys = pool_keys.len(), "Batched remote read");

            match self.router.pool(&pool_name).get_multi(&pool_keys).await {
                Ok(values) => {
                    for p in pending {
                        match values.get(&p.key) {
                            Some(value) if !is_refresh_marker(value) => {
                                crate::metrics::record_lookup(&p.group, "hit");
                                self.local.insert(p.key, Entry::Found(value.clone()));
                                result
                                    .entry(p.group.clone())
                                    .or_default()
                                    .insert(p.id.clone(), Some(value.clone()));
                            }
                            _ => crate::metrics::record_lookup(&p.group, "miss"),
                        }
                        fetched.push((p.group, p.id));
                    }
                }
                Err(e) => {
                    warn!(pool = %pool_name, keys = pool_keys.len(), error = %e, "Batched read failed, reporting misses");
                    crate::metrics::record_error("get_multi", &pool_name);
                    fetched.extend(pending.into_iter().map(|p| (p.group, p.id)));
                }
            }
        }

        self.stats.record_batch("get_multi", &fetched, start.elapsed());
        result
    }
}
