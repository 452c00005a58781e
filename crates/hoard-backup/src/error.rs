//! Error types for backup executions.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while producing or shipping a backup.
#[derive(Debug, Error)]
pub enum BackupError {
    /// Filesystem operation failed.
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// External tool exited unsuccessfully.
    #[error("{program} failed ({status}): {output}")]
    Command {
        program: String,
        status: String,
        output: String,
    },

    /// Operation exceeded its time budget and was cancelled.
    #[error("{operation} timed out after {}s", after.as_secs())]
    Timeout { operation: String, after: Duration },

    /// Every attempt of a retried operation failed.
    #[error("{source} (gave up after {attempts} attempts)")]
    RetryExhausted {
        attempts: u32,
        #[source]
        source: Box<BackupError>,
    },

    /// The dump could not be verified.
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// A destination rejected the artifact.
    #[error("destination {destination} failed: {source}")]
    Destination {
        destination: String,
        #[source]
        source: Box<BackupError>,
    },

    /// Tool output reported an error despite a clean exit.
    #[error("{tool} reported an error: {output}")]
    Rejected { tool: String, output: String },

    /// Encryption produced no usable artifact.
    #[error("encryption failed: {0}")]
    Encryption(String),

    /// The produced artifact is missing or unreadable.
    #[error("artifact {0} is missing")]
    Artifact(String),
}

impl BackupError {
    /// Build a closure that wraps an IO error with context.
    pub fn io(context: impl Into<String>) -> impl FnOnce(std::io::Error) -> Self {
        let context = context.into();
        move |source| BackupError::Io { context, source }
    }

    /// Number of attempts recorded on a retry failure.
    pub fn attempts(&self) -> Option<u32> {
        match self {
            BackupError::RetryExhausted { attempts, .. } => Some(*attempts),
            _ => None,
        }
    }
}

/// Reasons a dump failed validation.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// The restore invocation itself failed.
    #[error("restore failed: {0}")]
    Restore(String),

    /// The restore tool reported missing or failed documents.
    #[error("restore reported {restored} documents restored and {failed} failed")]
    RestoreSummary { restored: u64, failed: u64 },

    /// The restore output carried no document summary.
    #[error("restore output has no document summary")]
    MissingSummary,

    /// A restored collection has no entry in the dump inventory.
    #[error("collection {0} not found in backup")]
    MissingInBackup(String),

    /// A dumped collection was not restored.
    #[error("collection {0} from backup not found in restored database")]
    MissingInRestore(String),

    /// Collection counts differ between dump and restore.
    #[error("backup collection count {backup} and restore collection count {restored} differ")]
    CountMismatch { backup: usize, restored: usize },

    /// The validation database could not be reached.
    #[error("connecting to validation database failed: {0}")]
    Connection(String),

    /// The validation database could not be listed.
    #[error("listing validation database collections failed: {0}")]
    Inspection(String),

    /// Dropping the validation database failed.
    #[error("dropping validation database {database} failed: {reason}")]
    Cleanup { database: String, reason: String },

    /// A validation failure followed by a cleanup failure.
    #[error("{primary}; cleanup also failed: {cleanup}")]
    Combined {
        primary: Box<ValidationError>,
        cleanup: Box<ValidationError>,
    },
}

impl ValidationError {
    /// Whether the dump and the restored database disagree.
    pub fn is_mismatch(&self) -> bool {
        match self {
            ValidationError::RestoreSummary { .. }
            | ValidationError::MissingSummary
            | ValidationError::MissingInBackup(_)
            | ValidationError::MissingInRestore(_)
            | ValidationError::CountMismatch { .. } => true,
            ValidationError::Combined { primary, .. } => primary.is_mismatch(),
            _ => false,
        }
    }

    /// Whether the failure came from reaching the validation database.
    pub fn is_connection(&self) -> bool {
        match self {
            ValidationError::Connection(_) | ValidationError::Inspection(_) => true,
            ValidationError::Combined { primary, .. } => primary.is_connection(),
            _ => false,
        }
    }
}
