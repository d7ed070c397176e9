//! Configuration for the object cache.
//!
//! Read once at construction and immutable afterward.
//!
//! # Example
//!
//! ```
//! use object_cache::ObjectCacheConfig;
//!
//! // Minimal config (uses defaults)
//! let config = ObjectCacheConfig::default();
//! assert_eq!(config.retry_interval_secs, 15);
//! assert!(config.flushing_enabled);
//!
//! // Two pools: sessions get their own servers, everything else goes to default
//! let config: ObjectCacheConfig = serde_json::from_str(r#"{
//!     "key_salt": "shop-eu",
//!     "pools": {
//!         "default": ["10.0.0.1:6379", "10.0.0.2:6379:2"],
//!         "sessions": ["10.0.1.1"]
//!     },
//!     "global_groups": ["users", "usermeta"],
//!     "non_persistent_groups": ["counts"]
//! }"#).unwrap();
//! let topology = config.topology().unwrap();
//! assert_eq!(topology["default"][1].weight, 2);
//! ```

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;

use crate::storage::traits::CacheError;

/// Port used when a server entry omits one.
pub const DEFAULT_PORT: u16 = 6379;

/// Name of the fallback pool every deployment must have.
pub const DEFAULT_POOL: &str = "default";

/// Configuration for the object cache.
#[derive(Debug, Clone, Deserialize)]
pub struct ObjectCacheConfig {
    /// Per-deployment namespace isolation string, prepended to every key
    #[serde(default)]
    pub key_salt: String,

    /// Keep node connections open between calls
    #[serde(default = "default_persistent")]
    pub persistent: bool,

    /// Connect timeout per node
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Weight for server entries that do not carry their own
    #[serde(default = "default_weight")]
    pub weight: u32,

    /// How long a failed node is skipped before it is tried again
    #[serde(default = "default_retry_interval_secs")]
    pub retry_interval_secs: u64,

    /// Silence per-node connection failure logging
    #[serde(default)]
    pub disable_logging: bool,

    /// When false, `flush()` is a no-op that reports success
    #[serde(default = "default_flushing_enabled")]
    pub flushing_enabled: bool,

    /// Also invalidate the global scope on `flush()`
    #[serde(default)]
    pub flush_global_scope: bool,

    /// Expiration (seconds) applied when a write passes ttl 0. 0 = never.
    #[serde(default)]
    pub default_expiration: u64,

    /// Installation mode: writes turn into deletes
    #[serde(default)]
    pub installing: bool,

    /// Pool name → server entries (`host`, `host:port` or `host:port:weight`)
    #[serde(default)]
    pub pools: BTreeMap<String, Vec<String>>,

    /// Groups routed to pools other than their own name
    #[serde(default)]
    pub group_pools: BTreeMap<String, String>,

    /// Groups shared across every tenant
    #[serde(default)]
    pub global_groups: Vec<String>,

    /// Groups that never leave process memory
    #[serde(default)]
    pub non_persistent_groups: Vec<String>,
}

fn default_persistent() -> bool {
    true
}

fn default_connect_timeout_ms() -> u64 {
    1000
}

fn default_weight() -> u32 {
    1
}

fn default_retry_interval_secs() -> u64 {
    15
}

fn default_flushing_enabled() -> bool {
    true
}

impl Default for ObjectCacheConfig {
    fn default() -> Self {
        Self {
            key_salt: String::new(),
            persistent: default_persistent(),
            connect_timeout_ms: default_connect_timeout_ms(),
            weight: default_weight(),
            retry_interval_secs: default_retry_interval_secs(),
            disable_logging: false,
            flushing_enabled: default_flushing_enabled(),
            flush_global_scope: false,
            default_expiration: 0,
            installing: false,
            pools: BTreeMap::new(),
            group_pools: BTreeMap::new(),
            global_groups: Vec::new(),
            non_persistent_groups: Vec::new(),
        }
    }
}

impl ObjectCacheConfig {
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    #[must_use]
    pub fn retry_interval(&self) -> Duration {
        Duration::from_secs(self.retry_interval_secs)
    }

    /// Parsed pool topology.
    ///
    /// With no pools configured, a single `default` pool on localhost is
    /// assumed. A non-empty topology must name a `default` pool.
    pub fn topology(&self) -> Result<BTreeMap<String, Vec<ServerSpec>>, CacheError> {
        if self.pools.is_empty() {
            let mut topology = BTreeMap::new();
            topology.insert(
                DEFAULT_POOL.to_string(),
                vec![ServerSpec { host: "127.0.0.1".into(), port: DEFAULT_PORT, weight: self.weight }],
            );
            return Ok(topology);
        }

        if !self.pools.contains_key(DEFAULT_POOL) {
            return Err(CacheError::Config(format!("pool topology has no '{}' pool", DEFAULT_POOL)));
        }

        self.pools
            .iter()
            .map(|(name, servers)| {
                if servers.is_empty() {
                    return Err(CacheError::Config(format!("pool '{}' has no servers", name)));
                }
                let specs = servers
                    .iter()
                    .map(|s| ServerSpec::parse(s, self.weight))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok((name.clone(), specs))
            })
            .collect()
    }
}

/// One node of a pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSpec {
    pub host: String,
    pub port: u16,
    /// Share of the pool's selection buckets this node occupies
    pub weight: u32,
}

impl ServerSpec {
    /// Parse `host`, `host:port` or `host:port:weight`.
    ///
    /// A missing or zero port falls back to [`DEFAULT_PORT`].
    pub fn parse(entry: &str, default_weight: u32) -> Result<Self, CacheError> {
        let mut parts = entry.trim().split(':');
        let host = parts.next().unwrap_or_default().trim();
        if host.is_empty() {
            return Err(CacheError::Config(format!("server entry '{}' has no host", entry)));
        }

        let port = match parts.next().map(str::trim) {
            None | Some("") => DEFAULT_PORT,
            Some(p) => match p.parse::<u16>() {
                Ok(0) => DEFAULT_PORT,
                Ok(port) => port,
                Err(_) => {
                    return Err(CacheError::Config(format!("server entry '{}' has a bad port", entry)))
                }
            },
        };

        let weight = match parts.next().map(str::trim) {
            None | Some("") => default_weight,
            Some(w) => w
                .parse::<u32>()
                .map_err(|_| CacheError::Config(format!("server entry '{}' has a bad weight", entry)))?,
        };

        if parts.next().is_some() {
            return Err(CacheError::Config(format!("server entry '{}' has too many fields", entry)));
        }

        Ok(Self { host: host.to_string(), port, weight: weight.max(1) })
    }

    #[must_use]
    pub fn redis_url(&self) -> String {
        format!("redis://{}:{}/", self.host, self.port)
    }
}

impl std::fmt::Display for ServerSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ObjectCacheConfig::default();
        assert!(config.persistent);
        assert_eq!(config.connect_timeout(), Duration::from_secs(1));
        assert_eq!(config.weight, 1);
        assert_eq!(config.retry_interval(), Duration::from_secs(15));
        assert!(config.flushing_enabled);
        assert!(!config.flush_global_scope);
        assert_eq!(config.default_expiration, 0);
    }

    #[test]
    fn test_deserialize_fills_defaults() {
        let config: ObjectCacheConfig = serde_json::from_str(r#"{"key_salt": "abc"}"#).unwrap();
        assert_eq!(config.key_salt, "abc");
        assert_eq!(config.retry_interval_secs, 15);
        assert!(config.flushing_enabled);
    }

    #[test]
    fn test_empty_topology_gets_localhost_default() {
        let topology = ObjectCacheConfig::default().topology().unwrap();
        assert_eq!(topology.len(), 1);
        assert_eq!(topology[DEFAULT_POOL][0].to_string(), "127.0.0.1:6379");
    }

    #[test]
    fn test_topology_requires_default_pool() {
        let mut config = ObjectCacheConfig::default();
        config.pools.insert("sessions".into(), vec!["10.0.0.1".into()]);
        assert!(matches!(config.topology(), Err(CacheError::Config(_))));
    }

    #[test]
    fn test_topology_rejects_empty_pool() {
        let mut config = ObjectCacheConfig::default();
        config.pools.insert(DEFAULT_POOL.into(), vec![]);
        assert!(config.topology().is_err());
    }

    #[test]
    fn test_server_spec_forms() {
        let bare = ServerSpec::parse("cache1", 1).unwrap();
        assert_eq!((bare.host.as_str(), bare.port, bare.weight), ("cache1", 6379, 1));

        let with_port = ServerSpec::parse("cache2:6380", 3).unwrap();
        assert_eq!((with_port.port, with_port.weight), (6380, 3));

        let weighted = ServerSpec::parse(" cache3:6381:5 ", 1).unwrap();
        assert_eq!((weighted.host.as_str(), weighted.port, weighted.weight), ("cache3", 6381, 5));

        let zero_port = ServerSpec::parse("cache4:0", 1).unwrap();
        assert_eq!(zero_port.port, DEFAULT_PORT);
    }

    #[test]
    fn test_server_spec_errors() {
        assert!(ServerSpec::parse("", 1).is_err());
        assert!(ServerSpec::parse("host:notaport", 1).is_err());
        assert!(ServerSpec::parse("host:6379:heavy", 1).is_err());
        assert!(ServerSpec::parse("host:6379:1:extra", 1).is_err());
    }

    #[test]
    fn test_zero_weight_is_clamped() {
        assert_eq!(ServerSpec::parse("h:1:0", 1).unwrap().weight, 1);
    }

    #[test]
    fn test_redis_url() {
        let spec = ServerSpec::parse("10.1.2.3:7000", 1).unwrap();
        assert_eq!(spec.redis_url(), "redis://10.1.2.3:7000/");
    }
}
