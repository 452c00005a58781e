//! Backup plan model and loader for hoard.
//!
//! Plans are declarative YAML files, one per plan, named after the plan.
//! This crate parses them, applies environment overrides, and rejects
//! plans that could not be executed safely.

mod app;
mod error;
mod loader;
mod plan;

pub use app::AppConfig;
pub use error::ConfigError;
pub use loader::{load_plan, load_plans};
pub use plan::{
    Azure, DEFAULT_TIMEOUT_MINUTES, DestinationConfig, Encryption, GCloud, Gpg, LocalConfig, Plan,
    Rclone, RetryPolicy, S3, ScheduleConfig, Sftp, Slack, Target, Team, Validation,
};
