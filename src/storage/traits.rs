use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Item not found")]
    NotFound,
    #[error("Cache backend error: {0}")]
    Backend(String),
    #[error("No reachable node in pool '{pool}'")]
    Unavailable { pool: String },
    #[error("Value could not be encoded: {0}")]
    Serialization(String),
    #[error("Invalid cache configuration: {0}")]
    Config(String),
}

/// Expiration sent along with a write.
///
/// Memcached-shaped backends interpret a relative ttl beyond a horizon as an
/// absolute stamp, so callers that need uniform behavior send [`Expiration::At`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiration {
    /// Never expires
    Never,
    /// Expires this many seconds after the write
    After(u64),
    /// Expires at this unix timestamp (seconds)
    At(u64),
}

impl Expiration {
    /// Relative expiration, with `0` meaning never.
    #[must_use]
    pub fn relative(ttl_secs: u64) -> Self {
        if ttl_secs == 0 {
            Self::Never
        } else {
            Self::After(ttl_secs)
        }
    }

    /// Absolute expiration computed from now, with `0` meaning never.
    #[must_use]
    pub fn absolute(ttl_secs: u64) -> Self {
        if ttl_secs == 0 {
            Self::Never
        } else {
            Self::At(unix_now().saturating_add(ttl_secs))
        }
    }

    /// Unix timestamp (seconds) at which the entry expires, if any.
    #[must_use]
    pub fn deadline(&self) -> Option<u64> {
        match self {
            Self::Never => None,
            Self::After(secs) => Some(unix_now().saturating_add(*secs)),
            Self::At(ts) => Some(*ts),
        }
    }
}

pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// A pool of remote cache nodes speaking the memcached command set.
///
/// `Ok(false)` from a write means the backend refused it (key exists for
/// `add`, key missing for `replace`/`delete`); `Err` means the backend could
/// not be reached or answered with an error.
#[async_trait]
pub trait RemoteCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>, CacheError>;
    async fn add(&self, key: &str, value: &Value, expire: Expiration) -> Result<bool, CacheError>;
    async fn set(&self, key: &str, value: &Value, expire: Expiration) -> Result<bool, CacheError>;
    async fn replace(&self, key: &str, value: &Value, expire: Expiration) -> Result<bool, CacheError>;
    async fn delete(&self, key: &str) -> Result<bool, CacheError>;

    /// Add `delta` to an integer value. `None` when the key does not exist.
    async fn increment(&self, key: &str, delta: u64) -> Result<Option<i64>, CacheError>;

    /// Subtract `delta` from an integer value, flooring at zero.
    /// `None` when the key does not exist.
    async fn decrement(&self, key: &str, delta: u64) -> Result<Option<i64>, CacheError>;

    /// Fetch many keys in one round trip. Missing keys are absent from the map.
    /// Default implementation falls back to sequential gets.
    async fn get_multi(&self, keys: &[String]) -> Result<HashMap<String, Value>, CacheError> {
        let mut found = HashMap::with_capacity(keys.len());
        for key in keys {
            if let Some(value) = self.get(key).await? {
                found.insert(key.clone(), value);
            }
        }
        Ok(found)
    }

    /// Release any held connections.
    async fn close(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relative_zero_is_never() {
        assert_eq!(Expiration::relative(0), Expiration::Never);
        assert_eq!(Expiration::relative(30), Expiration::After(30));
    }

    #[test]
    fn test_absolute_is_stamped_from_now() {
        let before = unix_now();
        match Expiration::absolute(60) {
            Expiration::At(ts) => {
                assert!(ts >= before + 60);
                assert!(ts <= unix_now() + 60);
            }
            other => panic!("expected absolute stamp, got {:?}", other),
        }
        assert_eq!(Expiration::absolute(0), Expiration::Never);
    }

    #[test]
    fn test_deadline() {
        assert_eq!(Expiration::Never.deadline(), None);
        assert_eq!(Expiration::At(42).deadline(), Some(42));
        assert!(Expiration::After(10).deadline().unwrap() >= unix_now() + 9);
    }

    #[test]
    fn test_error_display() {
        let err = CacheError::Unavailable { pool: "default".into() };
        assert_eq!(err.to_string(), "No reachable node in pool 'default'");
    }
}
