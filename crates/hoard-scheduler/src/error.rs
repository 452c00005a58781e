//! Error types for the scheduler.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur in scheduler operations.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// A plan's cron expression could not be parsed.
    #[error("plan {plan} has an invalid cron expression {expr:?}: {reason}")]
    InvalidCron {
        plan: String,
        expr: String,
        reason: String,
    },

    /// No loaded plan has this name.
    #[error("plan not found: {0}")]
    PlanNotFound(String),

    /// The plan already has an execution in flight.
    #[error("plan {0} is already running")]
    PlanBusy(String),

    /// The scheduler no longer accepts executions.
    #[error("scheduler is shutting down")]
    ShuttingDown,

    /// Status store error.
    #[error("status store error: {0}")]
    Store(#[from] StatusStoreError),
}

/// Errors from reading or persisting the status store.
#[derive(Debug, Error)]
pub enum StatusStoreError {
    /// Filesystem operation failed.
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The persisted snapshot is not valid JSON.
    #[error("corrupt status store {}: {source}", path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The snapshot could not be serialized.
    #[error("serializing status store: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Errors from delivering notifications.
#[derive(Debug, Error)]
pub enum NotifierError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The webhook answered with a non-success status.
    #[error("{sink} webhook rejected notification with status {status}")]
    Rejected { sink: &'static str, status: u16 },
}
