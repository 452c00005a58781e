//! Scheduling for hoard.
//!
//! The [`Scheduler`] fires each plan on its cron expression, never runs
//! two executions of the same plan at once, and records every outcome in
//! the [`StatusStore`] before notifying and updating metrics.

mod error;
mod metrics;
mod notify;
mod registry;
mod scheduler;
mod store;
mod types;

pub use error::{NotifierError, SchedulerError, StatusStoreError};
pub use metrics::{BackupMetrics, Latency, Metrics, MetricsSnapshot};
pub use notify::{Notifier, WebhookNotifier};
pub use registry::{ExecutionGuard, ExecutionRegistry};
pub use scheduler::{JobContext, Scheduler, run_job};
pub use store::StatusStore;
pub use types::{
    BackupJob, EntryKind, MAINTENANCE, MAINTENANCE_CRON, ScheduleEntry, Status, Trigger, parse_cron,
};
