//! Backup executions for hoard.
//!
//! A [`Pipeline`] runs one plan end to end: dump with retries, optional
//! restore-and-compare validation, optional gpg encryption, sequential
//! fanout to the plan's destinations, and cleanup of the working copy.
//! Every external tool sits behind an async trait so executions can be
//! exercised without MongoDB or cloud credentials.

pub mod command;
pub mod destinations;
pub mod encryption;
mod error;
pub mod fanout;
pub mod inventory;
pub mod maintenance;
pub mod pipeline;
pub mod retention;
pub mod retry;
pub mod tools;
pub mod validation;

pub use destinations::{Artifact, CliDestinations, DestinationClient, DestinationFactory};
pub use encryption::{EncryptionTool, GpgCli};
pub use error::{BackupError, ValidationError};
pub use fanout::{DestinationFanout, FanoutReport};
pub use inventory::{DumpInventory, RestoreSummary};
pub use maintenance::tmp_cleanup;
pub use pipeline::{
    BackupResult, BackupRunner, Failure, Pipeline, STATUS_FAILED, STATUS_OK, Stage, Toolkit,
    human_size,
};
pub use retry::{Attempted, RetryExecutor};
pub use tools::{
    CollectionInfo, DumpTool, MongoDump, MongoRestore, MongoShell, RestoreTool,
    ValidationConnector, ValidationSession,
};
pub use validation::{ValidationReport, ValidationRunner, ValidationState, restore_archive};
