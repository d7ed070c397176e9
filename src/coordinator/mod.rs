// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Object cache facade.
//!
//! The [`ObjectCache`] ties together the request-scoped pieces:
//! - Local cache of every value seen during the request
//! - Key namespacing by salt, tenant scope and version token
//! - Group → pool routing to the remote tier
//! - Batched multi-key reads
//! - Stats collection
//!
//! # Request lifecycle
//!
//! ```text
//! new/connect → (switch_tenant)* → operations… → flush_local? → close
//! ```
//!
//! One `ObjectCache` serves one logical request. The remote pools behind its
//! [`TierRouter`] are shared and may be handed to the next request's cache.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use object_cache::{ObjectCache, ObjectCacheConfig, StaticTenant, TierRouter};
//! use object_cache::storage::memory::InMemoryRemote;
//! use serde_json::json;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let router = Arc::new(TierRouter::new(Arc::new(InMemoryRemote::new())));
//! let cache = ObjectCache::new(ObjectCacheConfig::default(), &StaticTenant::multi("1"), router);
//!
//! assert!(cache.set("42", json!({"title": "Hello"}), "posts", 0).await);
//! assert_eq!(cache.get("42", "posts", false).await, Some(json!({"title": "Hello"})));
//! # }
//! ```

mod types;
mod api;
mod flush;

pub use types::CacheOp;

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info};

use crate::batch::BatchFetcher;
use crate::config::ObjectCacheConfig;
use crate::groups::GroupRegistry;
use crate::keys::KeyNamespacer;
use crate::local::LocalCache;
use crate::routing::TierRouter;
use crate::stats::{StatsCollector, StatsSnapshot};
use crate::storage::traits::CacheError;
use crate::tenant::{Scope, Scopes, TenantResolver};
use crate::version::VersionStore;

/// Per-request object cache.
///
/// Every operation folds backend failures into `false` / `None` results, so
/// callers fall through to their own source of truth.
///
/// # Thread Safety
///
/// `Send + Sync`. Mutable state sits behind short-lived `parking_lot` locks
/// that are never held across an `.await`.
pub struct ObjectCache {
    /// Configuration (immutable after construction)
    pub(super) config: ObjectCacheConfig,

    /// Tenant and global scope keys are resolved against
    pub(super) scopes: Arc<RwLock<Scopes>>,

    /// Global / non-persistent group registrations
    pub(super) groups: Arc<RwLock<GroupRegistry>>,

    /// Request-local values, markers and version tokens
    pub(super) local: Arc<LocalCache>,

    /// Remote pools
    pub(super) router: Arc<TierRouter>,

    /// Per-scope version tokens
    pub(super) versions: Arc<VersionStore>,

    /// Fully-qualified key builder
    pub(super) keys: KeyNamespacer,

    /// Multi-key reads
    pub(super) batch: BatchFetcher,

    /// Diagnostics
    pub(super) stats: Arc<StatsCollector>,
}

impl ObjectCache {
    /// Create a cache for one request on top of existing pools.
    ///
    /// Groups listed in the configuration are registered up front.
    pub fn new(config: ObjectCacheConfig, tenant: &dyn TenantResolver, router: Arc<TierRouter>) -> Self {
        let scopes = Arc::new(RwLock::new(Scopes::resolve(tenant)));

        let mut registry = GroupRegistry::new();
        registry.add_global(config.global_groups.iter().cloned());
        registry.add_non_persistent(config.non_persistent_groups.iter().cloned());
        let groups = Arc::new(RwLock::new(registry));

        let local = Arc::new(LocalCache::new());
        let stats = Arc::new(StatsCollector::new());
        let versions = Arc::new(VersionStore::new(config.key_salt.clone(), local.clone(), router.clone()));
        let keys = KeyNamespacer::new(config.key_salt.clone(), groups.clone(), scopes.clone(), versions.clone());
        let batch = BatchFetcher::new(local.clone(), router.clone(), groups.clone(), stats.clone());

        debug!(
            tenant = %scopes.read().tenant,
            installing = config.installing,
            "Object cache created"
        );

        Self { config, scopes, groups, local, router, versions, keys, batch, stats }
    }

    /// Create a cache with Redis pools built from `config.pools`.
    ///
    /// Nodes connect lazily, so this only fails on an invalid topology.
    pub fn connect(config: ObjectCacheConfig, tenant: &dyn TenantResolver) -> Result<Self, CacheError> {
        let router = Arc::new(TierRouter::from_config(&config)?);
        info!(pools = router.pools().count(), "Object cache pools configured");
        Ok(Self::new(config, tenant, router))
    }

    #[must_use]
    pub fn config(&self) -> &ObjectCacheConfig {
        &self.config
    }

    /// Pools behind this cache, for handing to the next request.
    #[must_use]
    pub fn router(&self) -> &Arc<TierRouter> {
        &self.router
    }

    /// Point subsequent key resolution at another tenant.
    ///
    /// The local cache is kept: its keys already embed the old tenant's scope.
    pub fn switch_tenant(&self, tenant: &str) {
        let mut scopes = self.scopes.write();
        scopes.switch_to(tenant);
        debug!(tenant = %scopes.tenant, "Switched tenant");
    }

    /// Scope non-global groups currently resolve under.
    #[must_use]
    pub fn current_scope(&self) -> Scope {
        self.scopes.read().tenant.clone()
    }

    /// Share groups across every tenant.
    pub fn register_global_groups<I, S>(&self, groups: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.groups.write().add_global(groups);
    }

    /// Keep groups in process memory only.
    pub fn register_non_persistent_groups<I, S>(&self, groups: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.groups.write().add_non_persistent(groups);
    }

    /// Counters, timings and per-group command logs so far.
    #[must_use]
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Number of entries held locally (values, markers and version tokens).
    #[must_use]
    pub fn local_len(&self) -> usize {
        self.local.len()
    }

    /// Release every pool's connections.
    pub async fn close(&self) {
        for (name, pool) in self.router.pools() {
            debug!(pool = %name, "Closing cache pool");
            pool.close().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::InMemoryRemote;
    use crate::tenant::StaticTenant;

    fn cache(config: ObjectCacheConfig) -> ObjectCache {
        let router = Arc::new(TierRouter::new(Arc::new(InMemoryRemote::new())));
        ObjectCache::new(config, &StaticTenant::multi("1"), router)
    }

    #[test]
    fn test_config_groups_are_registered() {
        let config = ObjectCacheConfig {
            global_groups: vec!["users".into()],
            non_persistent_groups: vec!["counts".into()],
            ..Default::default()
        };
        let cache = cache(config);

        assert!(cache.groups.read().is_global("users"));
        assert!(cache.groups.read().is_non_persistent("counts"));
        assert!(!cache.groups.read().is_global("posts"));
    }

    #[test]
    fn test_switch_tenant_changes_scope() {
        let cache = cache(ObjectCacheConfig::default());
        assert_eq!(cache.current_scope(), Scope::tenant("1"));

        cache.switch_tenant("2");
        assert_eq!(cache.current_scope(), Scope::tenant("2"));
    }

    #[test]
    fn test_single_tenant_switch_keeps_prefix() {
        let router = Arc::new(TierRouter::new(Arc::new(InMemoryRemote::new())));
        let cache = ObjectCache::new(ObjectCacheConfig::default(), &StaticTenant::single("wp_"), router);

        cache.switch_tenant("9");
        assert_eq!(cache.current_scope(), Scope::tenant("wp_"));
    }

    #[test]
    fn test_register_groups_at_runtime() {
        let cache = cache(ObjectCacheConfig::default());
        cache.register_global_groups(["site-options"]);
        cache.register_non_persistent_groups(vec!["plugins".to_string()]);

        assert!(cache.groups.read().is_global("site-options"));
        assert!(cache.groups.read().is_non_persistent("plugins"));
    }

    #[test]
    fn test_connect_rejects_topology_without_default() {
        let mut config = ObjectCacheConfig::default();
        config.pools.insert("sessions".into(), vec!["127.0.0.1".into()]);

        let result = ObjectCache::connect(config, &StaticTenant::multi("1"));
        assert!(matches!(result, Err(CacheError::Config(_))));
    }

    #[tokio::test]
    async fn test_connect_builds_lazy_pools() {
        let mut config = ObjectCacheConfig::default();
        config.pools.insert("default".into(), vec!["127.0.0.1:6379".into()]);
        config.pools.insert("sessions".into(), vec!["127.0.0.1:6380:2".into()]);

        let cache = ObjectCache::connect(config, &StaticTenant::multi("1")).unwrap();
        assert_eq!(cache.router().pools().count(), 2);
        assert_eq!(cache.local_len(), 0);
    }
}
