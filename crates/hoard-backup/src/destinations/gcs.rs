use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use hoard_config::GCloud;

use super::{Artifact, DestinationClient, file_name, run_all};
use crate::BackupError;
use crate::command::CommandSpec;

/// Uploads to Google Cloud Storage with `gcloud` and `gsutil`.
#[derive(Debug, Clone)]
pub struct GcsClient {
    config: GCloud,
}

impl GcsClient {
    pub fn new(config: GCloud) -> Self {
        Self { config }
    }

    pub fn commands(&self, artifact: &Path) -> Vec<CommandSpec> {
        let mut commands = Vec::new();
        if !self.config.key_file_path.is_empty() {
            commands.push(
                CommandSpec::new("gcloud")
                    .args(["auth", "activate-service-account"])
                    .arg(format!("--key-file={}", self.config.key_file_path)),
            );
        }
        commands.push(
            CommandSpec::new("gsutil")
                .arg("cp")
                .arg(artifact.display().to_string())
                .arg(format!(
                    "gs://{}/{}",
                    self.config.bucket.trim_end_matches('/'),
                    file_name(artifact)
                )),
        );
        commands
    }
}

#[async_trait]
impl DestinationClient for GcsClient {
    fn kind(&self) -> &'static str {
        "gcloud"
    }

    async fn upload(&self, artifact: &Artifact, timeout: Duration) -> Result<String, BackupError> {
        let output = run_all(&self.commands(&artifact.path), timeout).await?;
        Ok(format!(
            "GCloud upload finished {} -> gs://{}\n{}",
            artifact.file_name(),
            self.config.bucket,
            output.trim()
        ))
    }
}
