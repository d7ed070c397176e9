//! Redis pool backend for the remote tier.
//!
//! A pool is a set of Redis nodes. Each key lives on exactly one node, chosen
//! from a bucket ring where every node holds `weight` buckets:
//!
//! ```text
//! buckets: [n0, n1, n1, n2]      (n1 has weight 2)
//! node(key) = buckets[sha256(key) % buckets.len()]
//! ```
//!
//! A node that cannot be reached is skipped for the retry interval; keys that
//! map to it move to the next healthy node in the ring until then. Error
//! replies from a live node (a non-integer counter, WRONGTYPE) are returned to
//! the caller and leave the node in service.
//!
//! Values are stored as JSON text, so integers written by `set` are plain
//! digit strings the increment script can operate on. A JSON string such as
//! `"5"` is stored quoted and is not a counter.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use redis::aio::MultiplexedConnection;
use redis::{cmd, Client, RedisError, RedisResult, Script};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use super::traits::{CacheError, Expiration, RemoteCache};
use crate::config::{ObjectCacheConfig, ServerSpec};
use crate::resilience::circuit_breaker::{CircuitBreaker, CircuitConfig, CircuitError};

/// Memcached `incr`/`decr` semantics: missing keys stay missing, the result
/// floors at zero and the existing expiry is kept.
const DELTA_SCRIPT: &str = r#"
local current = redis.call('GET', KEYS[1])
if not current then
    return false
end
if not string.match(current, '^%-?%d+$') then
    return redis.error_reply('value is not an integer')
end
local n = tonumber(current) + tonumber(ARGV[1])
if n < 0 then
    n = 0
end
redis.call('SET', KEYS[1], string.format('%d', n), 'KEEPTTL')
return n
"#;

struct RedisNode {
    spec: ServerSpec,
    client: Client,
    /// Kept open between calls when the pool is persistent
    cached: Mutex<Option<MultiplexedConnection>>,
    breaker: CircuitBreaker,
}

pub struct RedisPool {
    name: String,
    nodes: Vec<RedisNode>,
    buckets: Vec<usize>,
    persistent: bool,
    connect_timeout: Duration,
    log_failures: bool,
    delta_script: Script,
}

fn backend(e: RedisError) -> CacheError {
    CacheError::Backend(e.to_string())
}

/// Whether an error means the node itself is gone, as opposed to a reply.
fn is_node_failure(e: &RedisError) -> bool {
    e.is_io_error() || e.is_connection_refusal() || e.is_connection_dropped() || e.is_timeout()
}

fn encode(value: &Value) -> Result<Vec<u8>, CacheError> {
    serde_json::to_vec(value).map_err(|e| CacheError::Serialization(e.to_string()))
}

fn decode(bytes: &[u8]) -> Result<Value, CacheError> {
    serde_json::from_slice(bytes).map_err(|e| CacheError::Serialization(e.to_string()))
}

fn expiry_args(command: &mut redis::Cmd, expire: Expiration) {
    match expire {
        Expiration::Never => {}
        Expiration::After(secs) => {
            command.arg("EX").arg(secs);
        }
        Expiration::At(ts) => {
            command.arg("EXAT").arg(ts);
        }
    }
}

impl RedisPool {
    /// Build a pool. Nodes connect lazily on first use.
    pub fn new(
        name: impl Into<String>,
        servers: Vec<ServerSpec>,
        config: &ObjectCacheConfig,
    ) -> Result<Self, CacheError> {
        let name = name.into();
        if servers.is_empty() {
            return Err(CacheError::Config(format!("pool '{}' has no servers", name)));
        }

        let mut nodes = Vec::with_capacity(servers.len());
        let mut buckets = Vec::new();
        for (index, spec) in servers.into_iter().enumerate() {
            let client = Client::open(spec.redis_url()).map_err(backend)?;
            buckets.extend(std::iter::repeat(index).take(spec.weight.max(1) as usize));
            nodes.push(RedisNode {
                breaker: CircuitBreaker::new(
                    format!("{}/{}", name, spec),
                    CircuitConfig::retry_interval(config.retry_interval()),
                ),
                spec,
                client,
                cached: Mutex::new(None),
            });
        }

        Ok(Self {
            name,
            nodes,
            buckets,
            persistent: config.persistent,
            connect_timeout: config.connect_timeout(),
            log_failures: !config.disable_logging,
            delta_script: Script::new(DELTA_SCRIPT),
        })
    }

    /// Bucket index a key hashes to.
    fn bucket_for(&self, key: &str) -> usize {
        let digest = Sha256::digest(key.as_bytes());
        let mut head = [0u8; 8];
        head.copy_from_slice(&digest[..8]);
        (u64::from_be_bytes(head) % self.buckets.len() as u64) as usize
    }

    /// Distinct nodes in ring order starting at the key's bucket.
    fn candidates(&self, key: &str) -> Vec<usize> {
        let start = self.bucket_for(key);
        let mut order = Vec::with_capacity(self.nodes.len());
        for offset in 0..self.buckets.len() {
            let node = self.buckets[(start + offset) % self.buckets.len()];
            if !order.contains(&node) {
                order.push(node);
            }
        }
        order
    }

    async fn connect(&self, node: &RedisNode) -> Result<MultiplexedConnection, CacheError> {
        if self.persistent {
            let cached = node.cached.lock().clone();
            if let Some(conn) = cached {
                return Ok(conn);
            }
        }

        let conn = tokio::time::timeout(self.connect_timeout, node.client.get_multiplexed_async_connection())
            .await
            .map_err(|_| CacheError::Backend(format!("connect to {} timed out", node.spec)))?
            .map_err(backend)?;

        if self.persistent {
            *node.cached.lock() = Some(conn.clone());
        }
        Ok(conn)
    }

    fn on_failure(&self, node: &RedisNode, error: &CacheError) {
        // A broken persistent connection is re-opened on the next call.
        node.cached.lock().take();
        if self.log_failures {
            warn!(
                pool = %self.name,
                host = %node.spec.host,
                port = node.spec.port,
                error = %error,
                "Cache node connection failure"
            );
        }
        crate::metrics::record_node_failure(&self.name, &node.spec.to_string());
    }

    /// Run `command` against the node owning `key`.
    ///
    /// Nodes inside their retry interval are passed over without a network
    /// call. The first node actually tried decides the outcome. Only connect
    /// and transport failures count against the node's breaker.
    async fn run<T, F, Fut>(&self, key: &str, command: F) -> Result<T, CacheError>
    where
        F: Fn(MultiplexedConnection) -> Fut,
        Fut: std::future::Future<Output = RedisResult<T>>,
    {
        for index in self.candidates(key) {
            let node = &self.nodes[index];
            let outcome = node
                .breaker
                .call(|| async {
                    let conn = match self.connect(node).await {
                        Ok(conn) => conn,
                        Err(e) => return Err(e),
                    };
                    match command(conn).await {
                        Ok(value) => Ok(Ok(value)),
                        Err(e) if is_node_failure(&e) => Err(backend(e)),
                        Err(e) => Ok(Err(backend(e))),
                    }
                })
                .await;

            match outcome {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(e)) => {
                    debug!(pool = %self.name, node = %node.spec, error = %e, "Cache node error reply");
                    return Err(e);
                }
                Err(CircuitError::Rejected) => continue,
                Err(CircuitError::Inner(e)) => {
                    self.on_failure(node, &e);
                    return Err(e);
                }
            }
        }
        Err(CacheError::Unavailable { pool: self.name.clone() })
    }

    /// Node that would serve `key` right now.
    fn owner(&self, key: &str) -> usize {
        self.buckets[self.bucket_for(key)]
    }

    async fn write(
        &self,
        key: &str,
        value: &Value,
        expire: Expiration,
        condition: Option<&'static str>,
    ) -> Result<bool, CacheError> {
        let payload = encode(value)?;
        self.run(key, |mut conn| {
            let mut command = cmd("SET");
            command.arg(key).arg(&payload);
            if let Some(flag) = condition {
                command.arg(flag);
            }
            expiry_args(&mut command, expire);
            async move {
                let reply: Option<String> = command.query_async(&mut conn).await?;
                Ok(reply.is_some())
            }
        })
        .await
    }

    async fn delta(&self, key: &str, delta: i64) -> Result<Option<i64>, CacheError> {
        self.run(key, |mut conn| {
            let mut invocation = self.delta_script.key(key);
            invocation.arg(delta);
            async move {
                let value: Option<i64> = invocation.invoke_async(&mut conn).await?;
                Ok(value)
            }
        })
        .await
    }
}

#[async_trait]
impl RemoteCache for RedisPool {
    async fn get(&self, key: &str) -> Result<Option<Value>, CacheError> {
        let raw: Option<Vec<u8>> = self
            .run(key, |mut conn| {
                let mut command = cmd("GET");
                command.arg(key);
                async move { command.query_async(&mut conn).await }
            })
            .await?;
        raw.map(|bytes| decode(&bytes)).transpose()
    }

    /// One `MGET` per node holding any of the keys.
    ///
    /// A node that fails contributes nothing; the call only errors when no
    /// node answered.
    async fn get_multi(&self, keys: &[String]) -> Result<HashMap<String, Value>, CacheError> {
        let mut by_node: HashMap<usize, Vec<String>> = HashMap::new();
        for key in keys {
            by_node.entry(self.owner(key)).or_default().push(key.clone());
        }

        let mut found = HashMap::with_capacity(keys.len());
        let mut answered = 0usize;
        let mut last_error = None;

        for (_, node_keys) in by_node {
            // Route on the first key so a down owner fails over like single gets do.
            let outcome: Result<Vec<Option<Vec<u8>>>, CacheError> = self
                .run(&node_keys[0], |mut conn| {
                    let mut command = cmd("MGET");
                    command.arg(&node_keys);
                    async move { command.query_async(&mut conn).await }
                })
                .await;

            match outcome {
                Ok(values) => {
                    answered += 1;
                    for (key, raw) in node_keys.iter().zip(values) {
                        if let Some(bytes) = raw {
                            match decode(&bytes) {
                                Ok(value) => {
                                    found.insert(key.clone(), value);
                                }
                                Err(e) => debug!(key = %key, error = %e, "Skipping undecodable value"),
                            }
                        }
                    }
                }
                Err(e) => last_error = Some(e),
            }
        }

        match last_error {
            Some(e) if answered == 0 => Err(e),
            _ => Ok(found),
        }
    }

    async fn add(&self, key: &str, value: &Value, expire: Expiration) -> Result<bool, CacheError> {
        self.write(key, value, expire, Some("NX")).await
    }

    async fn set(&self, key: &str, value: &Value, expire: Expiration) -> Result<bool, CacheError> {
        self.write(key, value, expire, None).await
    }

    async fn replace(&self, key: &str, value: &Value, expire: Expiration) -> Result<bool, CacheError> {
        self.write(key, value, expire, Some("XX")).await
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        let removed: i64 = self
            .run(key, |mut conn| {
                let mut command = cmd("DEL");
                command.arg(key);
                async move { command.query_async(&mut conn).await }
            })
            .await?;
        Ok(removed > 0)
    }

    async fn increment(&self, key: &str, delta: u64) -> Result<Option<i64>, CacheError> {
        self.delta(key, i64::try_from(delta).unwrap_or(i64::MAX)).await
    }

    async fn decrement(&self, key: &str, delta: u64) -> Result<Option<i64>, CacheError> {
        self.delta(key, -i64::try_from(delta).unwrap_or(i64::MAX)).await
    }

    async fn close(&self) {
        for node in &self.nodes {
            node.cached.lock().take();
        }
        debug!(pool = %self.name, "Closed cache pool connections");
    }
}
