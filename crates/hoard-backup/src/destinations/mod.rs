//! Destination clients for produced artifacts.
//!
//! Each configured destination of a plan becomes one [`DestinationClient`].
//! Remote clients drive the vendor CLI through [`CommandSpec`].

mod azure;
mod gcs;
mod local;
mod rclone;
mod s3;
mod sftp;

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use hoard_config::{AppConfig, DestinationConfig, Plan};

use crate::BackupError;
use crate::command::CommandSpec;

pub use azure::AzureClient;
pub use gcs::GcsClient;
pub use local::LocalClient;
pub use rclone::RcloneClient;
pub use s3::S3Client;
pub use sftp::SftpClient;

/// A produced artifact and its optional dump log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub plan: String,
    pub path: PathBuf,
    pub log: Option<PathBuf>,
}

impl Artifact {
    pub fn new(plan: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            plan: plan.into(),
            path: path.into(),
            log: None,
        }
    }

    pub fn with_log(mut self, log: impl Into<PathBuf>) -> Self {
        self.log = Some(log.into());
        self
    }

    /// Final path component of the artifact.
    pub fn file_name(&self) -> String {
        file_name(&self.path)
    }
}

pub(crate) fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Delivers an artifact to one destination.
#[async_trait]
pub trait DestinationClient: Send + Sync {
    /// Short destination name used in logs and errors.
    fn kind(&self) -> &'static str;

    /// Upload `artifact`, returning the tool log.
    async fn upload(&self, artifact: &Artifact, timeout: Duration) -> Result<String, BackupError>;
}

/// Builds the destination clients of a plan.
pub trait DestinationFactory: Send + Sync {
    fn clients(&self, plan: &Plan, app: &AppConfig) -> Vec<Box<dyn DestinationClient>>;
}

/// Clients backed by the local filesystem and vendor CLIs.
#[derive(Debug, Clone, Default)]
pub struct CliDestinations;

impl DestinationFactory for CliDestinations {
    fn clients(&self, plan: &Plan, app: &AppConfig) -> Vec<Box<dyn DestinationClient>> {
        plan.destinations()
            .into_iter()
            .map(|config| client_for(config, plan, app))
            .collect()
    }
}

/// Build the client for one destination of `plan`.
pub fn client_for(
    config: DestinationConfig,
    plan: &Plan,
    app: &AppConfig,
) -> Box<dyn DestinationClient> {
    match config {
        DestinationConfig::Local(_) => Box::new(LocalClient::new(
            app.plan_storage_dir(&plan.name),
            plan.name.clone(),
            plan.scheduler.retention,
        )),
        DestinationConfig::Sftp(sftp) => Box::new(SftpClient::new(sftp)),
        DestinationConfig::S3(s3) => Box::new(S3Client::new(
            s3,
            app.plan_storage_dir(&plan.name),
            plan.name.clone(),
            app.use_aws_cli,
        )),
        DestinationConfig::GCloud(gcloud) => Box::new(GcsClient::new(gcloud)),
        DestinationConfig::Azure(azure) => Box::new(AzureClient::new(azure)),
        DestinationConfig::Rclone(rclone) => Box::new(RcloneClient::new(rclone)),
    }
}

/// Run `commands` in order, concatenating their output.
pub(crate) async fn run_all(
    commands: &[CommandSpec],
    timeout: Duration,
) -> Result<String, BackupError> {
    let mut log = String::new();
    for command in commands {
        log.push_str(&command.run(timeout).await?);
    }
    Ok(log)
}
