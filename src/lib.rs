//! # Object Cache
//!
//! A request-scoped object cache in front of pools of remote cache nodes,
//! with multi-tenant key namespacing and O(1) scope invalidation.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  ObjectCache (one per request)              │
//! │  • add / set / replace / delete / get / get_multi          │
//! │  • increment / decrement / flush / flush_local             │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       Local Cache                           │
//! │  • Every value, absence and refresh marker seen so far     │
//! │  • Version tokens for each scope touched                   │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!              (KeyNamespacer: salt:{token}{scope}:{group}:{id})
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  TierRouter (group → pool)                  │
//! │  • Weighted node ring per pool                             │
//! │  • Failed nodes skipped for the retry interval             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use object_cache::{ObjectCache, ObjectCacheConfig, StaticTenant};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config: ObjectCacheConfig = serde_json::from_str(r#"{
//!         "key_salt": "shop-eu",
//!         "pools": { "default": ["127.0.0.1:6379"] },
//!         "global_groups": ["users"]
//!     }"#).expect("valid config");
//!
//!     let cache = ObjectCache::connect(config, &StaticTenant::multi("12"))
//!         .expect("valid topology");
//!
//!     cache.set("42", json!({"title": "Hello"}), "posts", 300).await;
//!     if let Some(post) = cache.get("42", "posts", false).await {
//!         println!("Found: {}", post);
//!     }
//!
//!     // Orphan every key of tenant 12 in one write
//!     cache.flush().await;
//!     cache.close().await;
//! }
//! ```
//!
//! ## Features
//!
//! - **Scope Flush**: version tokens make invalidation a single remote write
//! - **Tenant Isolation**: keys embed the tenant scope; global groups are shared
//! - **Non-persistent Groups**: values that never leave process memory
//! - **Batched Reads**: one multi-key call per pool, never one per key
//! - **Refresh Markers**: force readers back to their source of truth
//! - **Node Failover**: per-node circuit breakers with a retry interval
//!
//! ## Modules
//!
//! - [`coordinator`]: The [`ObjectCache`] facade
//! - [`keys`] / [`version`]: Key namespacing and version tokens
//! - [`routing`]: Group → pool routing
//! - [`local`] / [`entry`]: Request-local cache
//! - [`batch`]: Multi-key reads
//! - [`stats`] / [`metrics`]: Diagnostics
//! - [`storage`]: Remote backends (Redis, in-memory)
//! - [`resilience`]: Node circuit breakers

pub mod config;
pub mod entry;
pub mod tenant;
pub mod groups;
pub mod keys;
pub mod version;
pub mod routing;
pub mod local;
pub mod batch;
pub mod stats;
pub mod storage;
pub mod resilience;
pub mod coordinator;
pub mod metrics;

// Note: We don't expose a `tracing` module to avoid conflict with the tracing crate

pub use config::{ObjectCacheConfig, ServerSpec};
pub use coordinator::{CacheOp, ObjectCache};
pub use entry::{Entry, REFRESH_MARKER};
pub use tenant::{Scope, StaticTenant, TenantResolver};
pub use groups::GroupRegistry;
pub use keys::KeyNamespacer;
pub use version::VersionStore;
pub use routing::TierRouter;
pub use local::LocalCache;
pub use batch::{BatchFetcher, MultiResult};
pub use stats::{StatsCollector, StatsSnapshot};
pub use storage::traits::{CacheError, Expiration, RemoteCache};
pub use storage::redis::RedisPool;
pub use resilience::circuit_breaker::{CircuitBreaker, CircuitConfig, CircuitError};
