//! Scheduler types.

use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use cron::Schedule;
use hoard_backup::BackupResult;
use hoard_config::Plan;
use serde::{Deserialize, Serialize};

use crate::SchedulerError;

/// Daily tmp cleanup, at midnight.
pub const MAINTENANCE_CRON: &str = "0 0 0 * * *";

/// Name of the maintenance entry in logs.
pub const MAINTENANCE: &str = "maintenance";

/// Parse a 5-field (minute precision) or 6-field (with seconds) cron expression.
pub fn parse_cron(plan: &str, expr: &str) -> Result<Schedule, SchedulerError> {
    let expr = expr.trim();
    let normalized = if expr.split_whitespace().count() == 5 {
        format!("0 {expr}")
    } else {
        expr.to_string()
    };
    Schedule::from_str(&normalized).map_err(|e| SchedulerError::InvalidCron {
        plan: plan.to_string(),
        expr: expr.to_string(),
        reason: e.to_string(),
    })
}

/// What a schedule entry runs.
#[derive(Debug, Clone)]
pub enum EntryKind {
    Backup(Arc<Plan>),
    Maintenance,
}

/// A cron schedule with its next fire time.
#[derive(Debug, Clone)]
pub struct ScheduleEntry {
    pub kind: EntryKind,
    schedule: Schedule,
    /// `None` when the expression has no future occurrence.
    pub next_run: Option<DateTime<Utc>>,
}

impl ScheduleEntry {
    /// Entry for a plan's backups.
    pub fn backup(plan: Arc<Plan>, now: DateTime<Utc>) -> Result<Self, SchedulerError> {
        let schedule = parse_cron(&plan.name, &plan.scheduler.cron)?;
        Ok(Self::with_schedule(EntryKind::Backup(plan), schedule, now))
    }

    /// Entry for the daily working directory cleanup.
    pub fn maintenance(now: DateTime<Utc>) -> Result<Self, SchedulerError> {
        let schedule = parse_cron(MAINTENANCE, MAINTENANCE_CRON)?;
        Ok(Self::with_schedule(EntryKind::Maintenance, schedule, now))
    }

    fn with_schedule(kind: EntryKind, schedule: Schedule, now: DateTime<Utc>) -> Self {
        let next_run = schedule.after(&now).next();
        Self {
            kind,
            schedule,
            next_run,
        }
    }

    pub fn name(&self) -> &str {
        match &self.kind {
            EntryKind::Backup(plan) => &plan.name,
            EntryKind::Maintenance => MAINTENANCE,
        }
    }

    pub fn plan(&self) -> Option<&Arc<Plan>> {
        match &self.kind {
            EntryKind::Backup(plan) => Some(plan),
            EntryKind::Maintenance => None,
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.next_run.is_some_and(|next| next <= now)
    }

    /// Move to the first occurrence after `now`.
    ///
    /// Occurrences missed while the process was busy or asleep are not
    /// replayed.
    pub fn advance(&mut self, now: DateTime<Utc>) {
        self.next_run = self.schedule.after(&now).next();
    }
}

/// Why an execution was started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    Scheduled,
    OnDemand,
}

/// One backup execution to run.
#[derive(Debug, Clone)]
pub struct BackupJob {
    pub plan: Arc<Plan>,
    pub trigger: Trigger,
}

impl BackupJob {
    /// Notification subject for the outcome of this job.
    pub fn subject(&self, result: &BackupResult) -> String {
        let name = &self.plan.name;
        match (self.trigger, result.is_success()) {
            (Trigger::Scheduled, true) => format!("{name} backup finished"),
            (Trigger::Scheduled, false) => format!("BACKUP FAILED: {name} backup failed"),
            (Trigger::OnDemand, true) => format!("{name} on demand backup finished"),
            (Trigger::OnDemand, false) => format!("BACKUP FAILED: {name} on demand backup failed"),
        }
    }
}

/// Persisted per-plan status row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Status {
    pub plan: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_run: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run_status: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run_log: Option<String>,
}

impl Status {
    /// A row that has only a next run.
    pub fn scheduled(plan: impl Into<String>, next_run: Option<DateTime<Utc>>) -> Self {
        Self {
            plan: plan.into(),
            next_run,
            last_run: None,
            last_run_status: None,
            last_run_log: None,
        }
    }

    /// The row recorded when an execution completes.
    pub fn from_result(result: &BackupResult, next_run: Option<DateTime<Utc>>) -> Self {
        Self {
            plan: result.plan.clone(),
            next_run,
            last_run: Some(result.timestamp),
            last_run_status: Some(result.status),
            last_run_log: Some(result.log_line()),
        }
    }
}
