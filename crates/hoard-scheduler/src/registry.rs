//! Per-plan execution claims.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

/// Tracks which plans have an execution in flight.
///
/// Scheduled and on-demand executions share one registry, so a plan never
/// runs twice at once regardless of what started it.
#[derive(Debug, Clone, Default)]
pub struct ExecutionRegistry {
    running: Arc<DashMap<String, DateTime<Utc>>>,
}

impl ExecutionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `plan`, or `None` if it is already claimed.
    ///
    /// The claim is released when the returned guard is dropped.
    pub fn try_claim(&self, plan: &str) -> Option<ExecutionGuard> {
        match self.running.entry(plan.to_string()) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                slot.insert(Utc::now());
                Some(ExecutionGuard {
                    plan: plan.to_string(),
                    running: Arc::clone(&self.running),
                })
            }
        }
    }

    pub fn is_running(&self, plan: &str) -> bool {
        self.running.contains_key(plan)
    }

    /// Plans currently executing with their start times, ordered by name.
    pub fn running(&self) -> Vec<(String, DateTime<Utc>)> {
        let mut running: Vec<_> = self
            .running
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect();
        running.sort();
        running
    }
}

/// Releases a plan's claim on drop.
#[derive(Debug)]
pub struct ExecutionGuard {
    plan: String,
    running: Arc<DashMap<String, DateTime<Utc>>>,
}

impl ExecutionGuard {
    pub fn plan(&self) -> &str {
        &self.plan
    }
}

impl Drop for ExecutionGuard {
    fn drop(&mut self) {
        self.running.remove(&self.plan);
    }
}
