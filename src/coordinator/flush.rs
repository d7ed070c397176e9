//! Scope invalidation.
//!
//! Nothing is deleted remotely: `flush()` advances version tokens so every
//! key built under the old token is orphaned.

use tracing::{debug, info, warn};

use super::ObjectCache;

impl ObjectCache {
    /// Invalidate the current tenant's scope.
    ///
    /// With `flush_global_scope` set, the global scope is bumped first. Returns
    /// false as soon as a bump cannot be written remotely. A no-op returning
    /// true when flushing is disabled.
    #[tracing::instrument(skip(self))]
    pub async fn flush(&self) -> bool {
        if !self.config.flushing_enabled {
            debug!("Flushing disabled");
            crate::metrics::record_flush("disabled");
            return true;
        }

        self.stats.reset_if_empty();
        let scopes = self.scopes.read().clone();

        // Single-tenant deployments share one scope; bump it once.
        if self.config.flush_global_scope
            && scopes.global != scopes.tenant
            && !self.versions.bump(&scopes.global).await
        {
            warn!(scope = %scopes.global, "Flush failed on global scope");
            crate::metrics::record_flush("error");
            return false;
        }

        if !self.versions.bump(&scopes.tenant).await {
            warn!(scope = %scopes.tenant, "Flush failed");
            crate::metrics::record_flush("error");
            return false;
        }

        info!(scope = %scopes.tenant, "Cache scope flushed");
        crate::metrics::record_flush("success");
        true
    }

    /// Drop everything held locally, including version tokens and the
    /// per-group command logs. The remote tier is untouched.
    pub fn flush_local(&self) {
        self.local.clear();
        self.stats.clear_group_ops();
        debug!("Local cache flushed");
    }
}
