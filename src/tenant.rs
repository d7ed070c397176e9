//! Tenant resolution and key scopes.

/// Supplies the tenant a request belongs to.
pub trait TenantResolver: Send + Sync {
    /// Identifier of the tenant the current request serves.
    fn current_tenant(&self) -> String;

    /// Whether several tenants share this deployment.
    fn is_multi_tenant(&self) -> bool;

    /// Scope used for everything in a single-tenant deployment.
    fn deployment_prefix(&self) -> String;
}

/// Fixed resolver for hosts that know their tenant up front.
#[derive(Debug, Clone)]
pub struct StaticTenant {
    tenant: String,
    multi_tenant: bool,
    prefix: String,
}

impl StaticTenant {
    /// Single-tenant deployment: every key lives under `prefix`.
    pub fn single(prefix: impl Into<String>) -> Self {
        Self { tenant: String::new(), multi_tenant: false, prefix: prefix.into() }
    }

    /// Multi-tenant deployment starting on `tenant`.
    pub fn multi(tenant: impl Into<String>) -> Self {
        Self { tenant: tenant.into(), multi_tenant: true, prefix: String::new() }
    }
}

impl TenantResolver for StaticTenant {
    fn current_tenant(&self) -> String {
        self.tenant.clone()
    }

    fn is_multi_tenant(&self) -> bool {
        self.multi_tenant
    }

    fn deployment_prefix(&self) -> String {
        self.prefix.clone()
    }
}

/// Namespace a key belongs to. Empty means global.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Scope(String);

impl Scope {
    #[must_use]
    pub fn global() -> Self {
        Self(String::new())
    }

    pub fn tenant(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn is_global(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name used in the version-token key.
    #[must_use]
    pub fn label(&self) -> &str {
        if self.is_global() { "global" } else { &self.0 }
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// The pair of scopes keys are resolved against.
///
/// In a single-tenant deployment both scopes are the deployment prefix, so
/// global and per-tenant groups share one namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scopes {
    pub tenant: Scope,
    pub global: Scope,
    multi_tenant: bool,
    prefix: String,
}

impl Scopes {
    pub fn resolve(resolver: &dyn TenantResolver) -> Self {
        let multi_tenant = resolver.is_multi_tenant();
        let prefix = resolver.deployment_prefix();
        if multi_tenant {
            Self {
                tenant: Scope::tenant(resolver.current_tenant()),
                global: Scope::global(),
                multi_tenant,
                prefix,
            }
        } else {
            Self {
                tenant: Scope::tenant(prefix.clone()),
                global: Scope::tenant(prefix.clone()),
                multi_tenant,
                prefix,
            }
        }
    }

    /// Point the tenant scope at another tenant. No-op for single-tenant.
    pub fn switch_to(&mut self, tenant: &str) {
        self.tenant = if self.multi_tenant {
            Scope::tenant(tenant)
        } else {
            Scope::tenant(self.prefix.clone())
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_label() {
        assert_eq!(Scope::global().label(), "global");
        assert_eq!(Scope::tenant("7").label(), "7");
        assert_eq!(Scope::tenant("7").to_string(), "7");
        assert!(Scope::default().is_global());
    }

    #[test]
    fn test_multi_tenant_scopes() {
        let scopes = Scopes::resolve(&StaticTenant::multi("3"));
        assert_eq!(scopes.tenant, Scope::tenant("3"));
        assert!(scopes.global.is_global());
    }

    #[test]
    fn test_single_tenant_scopes_share_prefix() {
        let scopes = Scopes::resolve(&StaticTenant::single("wp_"));
        assert_eq!(scopes.tenant, Scope::tenant("wp_"));
        assert_eq!(scopes.global, Scope::tenant("wp_"));
    }

    #[test]
    fn test_switch_tenant() {
        let mut multi = Scopes::resolve(&StaticTenant::multi("1"));
        multi.switch_to("2");
        assert_eq!(multi.tenant, Scope::tenant("2"));
        assert!(multi.global.is_global());

        let mut single = Scopes::resolve(&StaticTenant::single("wp_"));
        single.switch_to("2");
        assert_eq!(single.tenant, Scope::tenant("wp_"));
    }
}
