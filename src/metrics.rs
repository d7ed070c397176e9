// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics instrumentation for the object cache.
//!
//! Uses the `metrics` crate for backend-agnostic metrics collection.
//! The host application is responsible for choosing the exporter (Prometheus, OTEL, etc.)
//!
//! # Metric Naming Convention
//! - `object_cache_` prefix for all metrics
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Labels
//! - `operation`: get, get_multi, add, set, replace, delete, increment, decrement
//! - `group`: caller-supplied cache group
//! - `status`: hit, miss, success, error
//! - `pool` / `node`: remote pool and node address

use metrics::{counter, gauge, histogram};
use std::time::Duration;

/// Record a remote operation against a group
pub fn record_operation(operation: &str, group: &str) {
    counter!(
        "object_cache_operations_total",
        "operation" => operation.to_string(),
        "group" => group.to_string()
    )
    .increment(1);
}

/// Record remote operation latency
pub fn record_latency(operation: &str, group: &str, duration: Duration) {
    histogram!(
        "object_cache_operation_seconds",
        "operation" => operation.to_string(),
        "group" => group.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Record how many ids a batched read asked for
pub fn record_batch_size(operation: &str, count: usize) {
    histogram!(
        "object_cache_batch_size",
        "operation" => operation.to_string()
    )
    .record(count as f64);
}

/// Record a lookup answered from the request-local cache
pub fn record_local_hit(group: &str) {
    counter!(
        "object_cache_local_hits_total",
        "group" => group.to_string()
    )
    .increment(1);
}

/// Record the outcome of a remote read (`hit` / `miss`)
pub fn record_lookup(group: &str, status: &str) {
    counter!(
        "object_cache_lookups_total",
        "group" => group.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Set current request-local cache entry count
pub fn set_local_cache_entries(count: usize) {
    gauge!("object_cache_local_entries").set(count as f64);
}

/// Record a version-token bump (`success` / `error`)
pub fn record_version_bump(status: &str) {
    counter!(
        "object_cache_version_bumps_total",
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record a flush (`success` / `error` / `disabled`)
pub fn record_flush(status: &str) {
    counter!(
        "object_cache_flushes_total",
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record a remote call that failed and was degraded to a miss/false
pub fn record_error(operation: &str, group: &str) {
    counter!(
        "object_cache_errors_total",
        "operation" => operation.to_string(),
        "group" => group.to_string()
    )
    .increment(1);
}

/// Record a node connection/command failure
pub fn record_node_failure(pool: &str, node: &str) {
    counter!(
        "object_cache_node_failures_total",
        "pool" => pool.to_string(),
        "node" => node.to_string()
    )
    .increment(1);
}

/// Record a node breaker call outcome (`success` / `failure` / `rejected`)
pub fn record_circuit_call(circuit: &str, outcome: &str) {
    counter!(
        "object_cache_circuit_breaker_calls_total",
        "circuit" => circuit.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}
