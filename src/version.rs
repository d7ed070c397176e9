//! Per-scope version tokens.
//!
//! The remote tier cannot delete by prefix, so a scope is flushed by moving
//! its token forward. Keys built with the old token are never read again and
//! age out under the backend's own eviction.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::entry::{is_refresh_marker, Entry};
use crate::groups::VERSION_GROUP;
use crate::keys::version_key;
use crate::local::LocalCache;
use crate::routing::TierRouter;
use crate::storage::traits::Expiration;
use crate::tenant::Scope;

pub struct VersionStore {
    salt: String,
    local: Arc<LocalCache>,
    router: Arc<TierRouter>,
    /// Highest token this store has issued
    last_issued: AtomicU64,
}

fn now_micros() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_micros() as u64
}

fn token_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl VersionStore {
    pub fn new(salt: impl Into<String>, local: Arc<LocalCache>, router: Arc<TierRouter>) -> Self {
        Self {
            salt: salt.into(),
            local,
            router,
            last_issued: AtomicU64::new(0),
        }
    }

    /// Current token for `scope`, creating one if none exists anywhere.
    ///
    /// Local hits cost nothing; a scope is read from the remote tier at most
    /// once per request.
    pub async fn get_token(&self, scope: &Scope) -> String {
        let key = version_key(&self.salt, scope);
        if let Some(Entry::Found(value)) = self.local.get(&key) {
            return token_string(&value);
        }

        let pool = self.router.pool_for(VERSION_GROUP);
        match pool.get(&key).await {
            Ok(Some(value)) if !is_refresh_marker(&value) => {
                let token = token_string(&value);
                self.local.insert(key, Entry::Found(Value::String(token.clone())));
                return token;
            }
            Ok(_) => debug!(scope = %scope, "No version token stored, creating one"),
            Err(e) => warn!(scope = %scope, error = %e, "Version token read failed, creating one"),
        }

        self.advance(scope).await.0
    }

    /// Move `scope` to a fresh token.
    ///
    /// The local token advances even when the remote write fails; the return
    /// value reports whether the remote tier accepted it.
    pub async fn bump(&self, scope: &Scope) -> bool {
        self.advance(scope).await.1
    }

    async fn advance(&self, scope: &Scope) -> (String, bool) {
        let key = version_key(&self.salt, scope);
        let current = match self.local.get(&key) {
            Some(Entry::Found(value)) => token_string(&value).parse::<u64>().ok(),
            _ => None,
        };
        let token = self.next_token(current).to_string();
        self.local.insert(key.clone(), Entry::Found(Value::String(token.clone())));

        let pool = self.router.pool_for(VERSION_GROUP);
        let stored = match pool.set(&key, &Value::String(token.clone()), Expiration::Never).await {
            Ok(stored) => stored,
            Err(e) => {
                warn!(scope = %scope, error = %e, "Version token write failed");
                false
            }
        };

        if stored {
            info!(scope = %scope, token = %token, "Version token advanced");
        }
        crate::metrics::record_version_bump(if stored { "success" } else { "error" });
        (token, stored)
    }

    /// Microsecond timestamp, forced strictly past both `current` and anything
    /// issued before so two bumps in one microsecond still differ.
    fn next_token(&self, current: Option<u64>) -> u64 {
        let floor = current
            .unwrap_or(0)
            .max(self.last_issued.load(Ordering::Acquire))
            .saturating_add(1);
        let next = now_micros().max(floor);
        self.last_issued.fetch_max(next, Ordering::AcqRel);
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::InMemoryRemote;
    use crate::storage::traits::RemoteCache;
    use serde_json::json;

    fn store() -> (VersionStore, Arc<LocalCache>, Arc<InMemoryRemote>) {
        let remote = Arc::new(InMemoryRemote::new());
        let local = Arc::new(LocalCache::new());
        let router = Arc::new(TierRouter::new(remote.clone()));
        (VersionStore::new("salt", local.clone(), router), local, remote)
    }

    #[tokio::test]
    async fn test_token_created_lazily() {
        let (versions, local, remote) = store();
        let scope = Scope::tenant("1");

        let token = versions.get_token(&scope).await;

        assert!(token.parse::<u64>().is_ok());
        assert_eq!(remote.peek("salt:site_key:1"), Some(json!(token)));
        assert!(local.contains("salt:site_key:1"));
    }

    #[tokio::test]
    async fn test_existing_remote_token_is_reused() {
        let (versions, _, remote) = store();
        remote.set("salt:site_key:global", &json!("555"), Expiration::Never).await.unwrap();

        assert_eq!(versions.get_token(&Scope::global()).await, "555");
        assert_eq!(remote.calls("set"), 1);
    }

    #[tokio::test]
    async fn test_one_remote_read_per_scope() {
        let (versions, _, remote) = store();
        let scope = Scope::tenant("1");

        let first = versions.get_token(&scope).await;
        for _ in 0..5 {
            assert_eq!(versions.get_token(&scope).await, first);
        }
        assert_eq!(remote.calls("get"), 1);
    }

    #[tokio::test]
    async fn test_bump_changes_token() {
        let (versions, _, remote) = store();
        let scope = Scope::tenant("1");

        let before = versions.get_token(&scope).await;
        assert!(versions.bump(&scope).await);
        let after = versions.get_token(&scope).await;

        assert_ne!(before, after);
        assert!(after.parse::<u64>().unwrap() > before.parse::<u64>().unwrap());
        assert_eq!(remote.peek("salt:site_key:1"), Some(json!(after)));
    }

    #[tokio::test]
    async fn test_back_to_back_bumps_differ() {
        let (versions, _, _) = store();
        let scope = Scope::global();
        let mut seen = std::collections::HashSet::new();
        for _ in 0..20 {
            versions.bump(&scope).await;
            assert!(seen.insert(versions.get_token(&scope).await));
        }
    }

    #[tokio::test]
    async fn test_bump_past_a_future_token() {
        let (versions, _, remote) = store();
        let future = (now_micros() + 60_000_000).to_string();
        remote.set("salt:site_key:1", &json!(future.clone()), Expiration::Never).await.unwrap();

        let scope = Scope::tenant("1");
        assert_eq!(versions.get_token(&scope).await, future);
        versions.bump(&scope).await;
        let next: u64 = versions.get_token(&scope).await.parse().unwrap();
        assert!(next > future.parse::<u64>().unwrap());
    }

    #[tokio::test]
    async fn test_failed_bump_still_advances_locally() {
        let (versions, _, remote) = store();
        let scope = Scope::tenant("1");
        let before = versions.get_token(&scope).await;

        remote.set_online(false);
        assert!(!versions.bump(&scope).await);

        let after = versions.get_token(&scope).await;
        assert_ne!(before, after);
    }

    #[tokio::test]
    async fn test_scopes_are_independent() {
        let (versions, _, _) = store();
        let a = Scope::tenant("1");
        let b = Scope::tenant("2");

        let token_b = versions.get_token(&b).await;
        versions.get_token(&a).await;
        versions.bump(&a).await;

        assert_eq!(versions.get_token(&b).await, token_b);
    }
}
