//! Group → pool routing.
//!
//! Built once from configuration; the mapping never changes afterward.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::info;

use crate::config::{ObjectCacheConfig, DEFAULT_POOL};
use crate::groups::normalize;
use crate::storage::redis::RedisPool;
use crate::storage::traits::{CacheError, RemoteCache};

pub struct TierRouter {
    pools: BTreeMap<String, Arc<dyn RemoteCache>>,
    default: Arc<dyn RemoteCache>,
    /// Explicit group → pool aliases; unlisted groups use the pool named after them
    aliases: BTreeMap<String, String>,
}

impl TierRouter {
    /// Router with only the mandatory `default` pool.
    pub fn new(default: Arc<dyn RemoteCache>) -> Self {
        let mut pools = BTreeMap::new();
        pools.insert(DEFAULT_POOL.to_string(), default.clone());
        Self { pools, default, aliases: BTreeMap::new() }
    }

    /// Add a named pool. Groups with the same name route to it.
    #[must_use]
    pub fn with_pool(mut self, name: impl Into<String>, pool: Arc<dyn RemoteCache>) -> Self {
        let name = name.into();
        if name == DEFAULT_POOL {
            self.default = pool.clone();
        }
        self.pools.insert(name, pool);
        self
    }

    /// Route `group` to the pool called `pool`.
    #[must_use]
    pub fn with_alias(mut self, group: impl Into<String>, pool: impl Into<String>) -> Self {
        self.aliases.insert(group.into(), pool.into());
        self
    }

    /// Build Redis-backed pools from the configured topology.
    ///
    /// No connection is opened here; nodes connect on first use.
    pub fn from_config(config: &ObjectCacheConfig) -> Result<Self, CacheError> {
        let mut pools: BTreeMap<String, Arc<dyn RemoteCache>> = BTreeMap::new();
        for (name, servers) in config.topology()? {
            info!(pool = %name, nodes = servers.len(), "Configuring cache pool");
            let pool = RedisPool::new(name.clone(), servers, config)?;
            pools.insert(name, Arc::new(pool));
        }

        for (group, pool) in &config.group_pools {
            if !pools.contains_key(pool) {
                return Err(CacheError::Config(format!(
                    "group '{}' routes to unknown pool '{}'",
                    group, pool
                )));
            }
        }

        let default = pools
            .get(DEFAULT_POOL)
            .cloned()
            .ok_or_else(|| CacheError::Config(format!("pool topology has no '{}' pool", DEFAULT_POOL)))?;

        Ok(Self { pools, default, aliases: config.group_pools.clone() })
    }

    /// Name of the pool serving `group`.
    #[must_use]
    pub fn pool_name_for<'a>(&'a self, group: &'a str) -> &'a str {
        let group = normalize(group);
        if let Some(alias) = self.aliases.get(group) {
            if self.pools.contains_key(alias) {
                return alias;
            }
        }
        if self.pools.contains_key(group) {
            group
        } else {
            DEFAULT_POOL
        }
    }

    /// Pool serving `group`, falling back to `default`.
    #[must_use]
    pub fn pool_for(&self, group: &str) -> Arc<dyn RemoteCache> {
        self.pool(self.pool_name_for(group))
    }

    /// Pool by name, falling back to `default`.
    #[must_use]
    pub fn pool(&self, name: &str) -> Arc<dyn RemoteCache> {
        self.pools.get(name).unwrap_or(&self.default).clone()
    }

    /// Every configured pool.
    pub fn pools(&self) -> impl Iterator<Item = (&str, &Arc<dyn RemoteCache>)> {
        self.pools.iter().map(|(name, pool)| (name.as_str(), pool))
    }
}
