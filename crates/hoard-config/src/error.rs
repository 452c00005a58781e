//! Error types for plan loading.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while loading plans.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No plan file with the requested name.
    #[error("plan {name} not found in {}", dir.display())]
    NotFound { name: String, dir: PathBuf },

    /// The plan file or directory could not be read.
    #[error("reading {} failed: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The plan file is not valid YAML for a plan.
    #[error("parsing {} failed: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// The directory holds no plan files.
    #[error("no backup plans found in {}", .0.display())]
    NoPlans(PathBuf),

    /// The plan parsed but cannot be executed.
    #[error("invalid plan {plan}: {reason}")]
    Invalid { plan: String, reason: String },
}
