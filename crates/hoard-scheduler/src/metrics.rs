//! In-process execution metrics.

use std::collections::BTreeMap;

use dashmap::DashMap;
use serde::Serialize;

/// Records the outcome of every execution.
pub trait Metrics: Send + Sync {
    fn record_execution(&self, plan: &str, status: u16, size: u64, duration_secs: f64);
}

/// Latency observations for one plan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Latency {
    pub count: u64,
    pub sum_secs: f64,
    pub max_secs: f64,
}

impl Latency {
    fn observe(&mut self, secs: f64) {
        self.count += 1;
        self.sum_secs += secs;
        self.max_secs = self.max_secs.max(secs);
    }

    pub fn mean_secs(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum_secs / self.count as f64)
    }
}

/// Point-in-time copy of [`BackupMetrics`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    /// Executions by plan, then by status code.
    pub totals: BTreeMap<String, BTreeMap<u16, u64>>,
    /// Size in bytes of the last successful artifact per plan.
    pub last_size: BTreeMap<String, u64>,
    pub latency: BTreeMap<String, Latency>,
}

/// Counters, gauges and latency observations keyed by plan.
#[derive(Debug, Default)]
pub struct BackupMetrics {
    totals: DashMap<(String, u16), u64>,
    last_size: DashMap<String, u64>,
    latency: DashMap<String, Latency>,
}

impl BackupMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn total(&self, plan: &str, status: u16) -> u64 {
        self.totals
            .get(&(plan.to_string(), status))
            .map(|count| *count)
            .unwrap_or(0)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let mut snapshot = MetricsSnapshot::default();
        for entry in self.totals.iter() {
            let (plan, status) = entry.key();
            snapshot
                .totals
                .entry(plan.clone())
                .or_default()
                .insert(*status, *entry.value());
        }
        for entry in self.last_size.iter() {
            snapshot.last_size.insert(entry.key().clone(), *entry.value());
        }
        for entry in self.latency.iter() {
            snapshot.latency.insert(entry.key().clone(), *entry.value());
        }
        snapshot
    }
}

impl Metrics for BackupMetrics {
    fn record_execution(&self, plan: &str, status: u16, size: u64, duration_secs: f64) {
        *self.totals.entry((plan.to_string(), status)).or_insert(0) += 1;
        if size > 0 {
            self.last_size.insert(plan.to_string(), size);
        }
        self.latency
            .entry(plan.to_string())
            .or_default()
            .observe(duration_secs);
    }
}
