//! Fully-qualified key construction.
//!
//! ```text
//! salt ":" token scope ":" group ":" id      (all whitespace removed)
//! ```
//!
//! The token is the current version of the key's scope, so bumping it orphans
//! every key built before the bump.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::groups::{normalize, GroupRegistry};
use crate::tenant::{Scope, Scopes};
use crate::version::VersionStore;

#[inline]
fn strip_whitespace(raw: &str) -> String {
    raw.chars().filter(|c| !c.is_whitespace()).collect()
}

/// Key under which a scope's version token is stored.
#[must_use]
pub fn version_key(salt: &str, scope: &Scope) -> String {
    strip_whitespace(&format!("{}:site_key:{}", salt, scope.label()))
}

/// Assemble a fully-qualified key from its parts.
#[must_use]
pub fn compose(salt: &str, token: &str, scope: &Scope, group: &str, id: &str) -> String {
    strip_whitespace(&format!("{}:{}{}:{}:{}", salt, token, scope.as_str(), normalize(group), id))
}

pub struct KeyNamespacer {
    salt: String,
    groups: Arc<RwLock<GroupRegistry>>,
    scopes: Arc<RwLock<Scopes>>,
    versions: Arc<VersionStore>,
}

impl KeyNamespacer {
    pub fn new(
        salt: impl Into<String>,
        groups: Arc<RwLock<GroupRegistry>>,
        scopes: Arc<RwLock<Scopes>>,
        versions: Arc<VersionStore>,
    ) -> Self {
        Self { salt: salt.into(), groups, scopes, versions }
    }

    /// Scope a group's keys live under right now.
    #[must_use]
    pub fn scope_for(&self, group: &str) -> Scope {
        let global = self.groups.read().is_global(group);
        let scopes = self.scopes.read();
        if global {
            scopes.global.clone()
        } else {
            scopes.tenant.clone()
        }
    }

    /// Fully-qualified key for `(group, id)` under the current tenant and token.
    ///
    /// May cost one remote read the first time a scope's token is needed.
    pub async fn resolve(&self, id: &str, group: &str) -> String {
        let group = normalize(group);
        let scope = self.scope_for(group);
        let token = self.versions.get_token(&scope).await;
        compose(&self.salt, &token, &scope, group, id)
    }
}
