use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use hoard_config::Azure;
use tracing::debug;

use super::{Artifact, DestinationClient, file_name};
use crate::BackupError;
use crate::command::CommandSpec;

const CONNECTION_ENV: &str = "AZURE_STORAGE_CONNECTION_STRING";

/// Uploads to Azure Blob Storage with the `az` CLI.
#[derive(Debug, Clone)]
pub struct AzureClient {
    config: Azure,
}

impl AzureClient {
    pub fn new(config: Azure) -> Self {
        Self { config }
    }

    fn az(&self) -> CommandSpec {
        CommandSpec::new("az")
            .env(CONNECTION_ENV, self.config.connection_string.clone())
            .redact(self.config.connection_string.clone())
    }

    pub fn create_container(&self) -> CommandSpec {
        self.az()
            .args(["storage", "container", "create", "--name"])
            .arg(self.config.container_name.clone())
    }

    pub fn upload_blob(&self, artifact: &Path) -> CommandSpec {
        self.az()
            .args(["storage", "blob", "upload", "--container-name"])
            .arg(self.config.container_name.clone())
            .arg("--file")
            .arg(artifact.display().to_string())
            .arg("--name")
            .arg(file_name(artifact))
            .arg("--overwrite")
    }
}

#[async_trait]
impl DestinationClient for AzureClient {
    fn kind(&self) -> &'static str {
        "azure"
    }

    async fn upload(&self, artifact: &Artifact, timeout: Duration) -> Result<String, BackupError> {
        // `container create` reports an existing container as created: false
        let created = self.create_container().run(timeout).await?;
        debug!(container = %self.config.container_name, output = %created.trim(), "ensured container");

        let output = self.upload_blob(&artifact.path).run(timeout).await?;
        Ok(format!(
            "Azure upload finished {} -> {}\n{}",
            artifact.file_name(),
            self.config.container_name,
            output.trim()
        ))
    }
}
