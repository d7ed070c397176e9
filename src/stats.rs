//! Operation counters and per-group command logs.
//!
//! Diagnostic only: recording never fails and never blocks an operation on
//! anything but a short in-process lock. Rendering is left to the caller via
//! [`StatsSnapshot`].

use std::collections::BTreeMap;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;

/// Counters present from the start of every cycle.
const BASE_OPS: [&str; 4] = ["get", "add", "delete", "set"];

#[derive(Debug, Default)]
struct StatsInner {
    counts: BTreeMap<String, u64>,
    times: BTreeMap<String, Duration>,
    group_ops: BTreeMap<String, Vec<String>>,
}

impl StatsInner {
    fn reset(&mut self) {
        self.counts.clear();
        self.times.clear();
        for op in BASE_OPS {
            self.counts.insert(op.to_string(), 0);
            self.times.insert(format!("{}_time", op), Duration::ZERO);
        }
    }
}

#[derive(Debug)]
pub struct StatsCollector {
    inner: Mutex<StatsInner>,
}

/// Read-only copy of the collected stats.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StatsSnapshot {
    /// Operation kind → number of remote calls
    pub counts: BTreeMap<String, u64>,
    /// `<op>_time` → cumulative seconds
    pub times: BTreeMap<String, f64>,
    /// Group → `"<op> <id>"` lines in execution order
    pub group_ops: BTreeMap<String, Vec<String>>,
}

impl StatsSnapshot {
    #[must_use]
    pub fn count(&self, op: &str) -> u64 {
        self.counts.get(op).copied().unwrap_or(0)
    }

    #[must_use]
    pub fn ops_for(&self, group: &str) -> &[String] {
        self.group_ops.get(group).map(Vec::as_slice).unwrap_or(&[])
    }
}

impl Default for StatsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl StatsCollector {
    #[must_use]
    pub fn new() -> Self {
        let mut inner = StatsInner::default();
        inner.reset();
        Self { inner: Mutex::new(inner) }
    }

    /// Count one `op` against `group`, add its latency, and log `"<op> <id>"`.
    pub fn record(&self, op: &str, group: &str, id: &str, elapsed: Duration) {
        {
            let mut inner = self.inner.lock();
            *inner.counts.entry(op.to_string()).or_insert(0) += 1;
            *inner.times.entry(format!("{}_time", op)).or_insert(Duration::ZERO) += elapsed;
            inner
                .group_ops
                .entry(group.to_string())
                .or_default()
                .push(format!("{} {}", op, id));
        }
        crate::metrics::record_operation(op, group);
        crate::metrics::record_latency(op, group, elapsed);
    }

    /// Count one batched `op` once, logging every id under its group.
    pub fn record_batch(&self, op: &str, ids: &[(String, String)], elapsed: Duration) {
        {
            let mut inner = self.inner.lock();
            *inner.counts.entry(op.to_string()).or_insert(0) += 1;
            *inner.times.entry(format!("{}_time", op)).or_insert(Duration::ZERO) += elapsed;
            for (group, id) in ids {
                inner
                    .group_ops
                    .entry(group.clone())
                    .or_default()
                    .push(format!("{} {}", op, id));
            }
        }
        crate::metrics::record_batch_size(op, ids.len());
        crate::metrics::record_latency(op, "batch", elapsed);
    }

    /// Restore the base counters if something emptied them.
    pub fn reset_if_empty(&self) {
        let mut inner = self.inner.lock();
        if inner.counts.is_empty() {
            inner.reset();
        }
    }

    /// Forget the command logs, keeping the counters.
    pub fn clear_group_ops(&self) {
        self.inner.lock().group_ops.clear();
    }

    /// Drop everything, including the base counters.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.counts.clear();
        inner.times.clear();
        inner.group_ops.clear();
    }

    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        let inner = self.inner.lock();
        StatsSnapshot {
            counts: inner.counts.clone(),
            times: inner
                .times
                .iter()
                .map(|(k, v)| (k.clone(), v.as_secs_f64()))
                .collect(),
            group_ops: inner.group_ops.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_with_base_counters() {
        let snapshot = StatsCollector::new().snapshot();
        for op in BASE_OPS {
            assert_eq!(snapshot.count(op), 0);
            assert_eq!(snapshot.times[&format!("{}_time", op)], 0.0);
        }
        assert!(snapshot.group_ops.is_empty());
    }

    #[test]
    fn test_record_counts_times_and_logs() {
        let stats = StatsCollector::new();
        stats.record("get", "posts", "42", Duration::from_millis(2));
        stats.record("get", "posts", "43", Duration::from_millis(3));
        stats.record("set", "users", "7", Duration::from_millis(1));

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.count("get"), 2);
        assert_eq!(snapshot.count("set"), 1);
        assert!((snapshot.times["get_time"] - 0.005).abs() < 1e-9);
        assert_eq!(snapshot.ops_for("posts"), ["get 42", "get 43"]);
        assert_eq!(snapshot.ops_for("users"), ["set 7"]);
        assert!(snapshot.ops_for("nothing").is_empty());
    }

    #[test]
    fn test_new_op_kinds_appear() {
        let stats = StatsCollector::new();
        stats.record("replace", "g", "1", Duration::ZERO);
        assert_eq!(stats.snapshot().count("replace"), 1);
    }

    #[test]
    fn test_record_batch_counts_once() {
        let stats = StatsCollector::new();
        let ids = vec![
            ("posts".to_string(), "1".to_string()),
            ("posts".to_string(), "2".to_string()),
            ("terms".to_string(), "9".to_string()),
        ];
        stats.record_batch("get_multi", &ids, Duration::from_millis(4));

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.count("get_multi"), 1);
        assert_eq!(snapshot.ops_for("posts"), ["get_multi 1", "get_multi 2"]);
        assert_eq!(snapshot.ops_for("terms"), ["get_multi 9"]);
    }

    #[test]
    fn test_reset_if_empty() {
        let stats = StatsCollector::new();
        stats.record("get", "g", "1", Duration::ZERO);

        stats.reset_if_empty();
        assert_eq!(stats.snapshot().count("get"), 1);

        stats.clear();
        assert!(stats.snapshot().counts.is_empty());
        stats.reset_if_empty();
        assert_eq!(stats.snapshot().counts.len(), BASE_OPS.len());
    }

    #[test]
    fn test_clear_group_ops_keeps_counts() {
        let stats = StatsCollector::new();
        stats.record("delete", "g", "1", Duration::ZERO);
        stats.clear_group_ops();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.count("delete"), 1);
        assert!(snapshot.group_ops.is_empty());
    }

    #[test]
    fn test_snapshot_serializes() {
        let stats = StatsCollector::new();
        stats.record("get", "g", "1", Duration::ZERO);
        let json = serde_json::to_value(stats.snapshot()).unwrap();
        assert_eq!(json["counts"]["get"], 1);
        assert_eq!(json["group_ops"]["g"][0], "get 1");
    }
}
