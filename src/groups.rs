//! Group registrations.

use std::collections::HashSet;

/// Group used when a caller passes an empty one.
pub const DEFAULT_GROUP: &str = "default";

/// Reserved group whose pool holds the version tokens.
pub const VERSION_GROUP: &str = "site_keys";

/// Normalize a caller-supplied group name.
#[inline]
#[must_use]
pub fn normalize(group: &str) -> &str {
    if group.is_empty() { DEFAULT_GROUP } else { group }
}

/// Which groups are global and which never reach the remote tier.
///
/// Registrations only grow; a group cannot be unregistered mid-process.
#[derive(Debug, Clone, Default)]
pub struct GroupRegistry {
    global: HashSet<String>,
    non_persistent: HashSet<String>,
}

impl GroupRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_global<I, S>(&mut self, groups: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.global.extend(groups.into_iter().map(Into::into));
    }

    pub fn add_non_persistent<I, S>(&mut self, groups: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.non_persistent.extend(groups.into_iter().map(Into::into));
    }

    #[must_use]
    pub fn is_global(&self, group: &str) -> bool {
        self.global.contains(normalize(group))
    }

    #[must_use]
    pub fn is_non_persistent(&self, group: &str) -> bool {
        self.non_persistent.contains(normalize(group))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize(""), "default");
        assert_eq!(normalize("users"), "users");
    }

    #[test]
    fn test_registration_is_additive() {
        let mut registry = GroupRegistry::new();
        registry.add_global(["users"]);
        registry.add_global(vec!["users".to_string(), "usermeta".to_string()]);
        registry.add_non_persistent(["counts"]);

        assert!(registry.is_global("users"));
        assert!(registry.is_global("usermeta"));
        assert!(!registry.is_global("posts"));
        assert!(registry.is_non_persistent("counts"));
        assert!(!registry.is_non_persistent("users"));
    }

    #[test]
    fn test_empty_group_checks_default() {
        let mut registry = GroupRegistry::new();
        registry.add_non_persistent([DEFAULT_GROUP]);
        assert!(registry.is_non_persistent(""));
    }
}
