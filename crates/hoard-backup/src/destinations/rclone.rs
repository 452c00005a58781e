use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use hoard_config::Rclone;

use super::{Artifact, DestinationClient};
use crate::BackupError;
use crate::command::CommandSpec;

/// Copies artifacts to any rclone remote.
#[derive(Debug, Clone)]
pub struct RcloneClient {
    config: Rclone,
}

impl RcloneClient {
    pub fn new(config: Rclone) -> Self {
        Self { config }
    }

    pub fn command(&self, artifact: &Path) -> CommandSpec {
        let mut spec = CommandSpec::new("rclone");
        if !self.config.config_file_path.is_empty() {
            spec = spec
                .arg("--config")
                .arg(self.config.config_file_path.clone());
        }
        spec.arg("copy")
            .arg(artifact.display().to_string())
            .arg(format!(
                "{}:{}",
                self.config.config_section,
                self.config.bucket.trim_end_matches('/')
            ))
    }
}

#[async_trait]
impl DestinationClient for RcloneClient {
    fn kind(&self) -> &'static str {
        "rclone"
    }

    async fn upload(&self, artifact: &Artifact, timeout: Duration) -> Result<String, BackupError> {
        let output = self.command(&artifact.path).run(timeout).await?;
        Ok(format!(
            "Rclone upload finished {} -> {}:{}\n{}",
            artifact.file_name(),
            self.config.config_section,
            self.config.bucket,
            output.trim()
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_command() {
        let client = RcloneClient::new(Rclone {
            bucket: "backups/mongo/".to_string(),
            config_file_path: "/config/rclone.conf".to_string(),
            config_section: "b2".to_string(),
        });
        assert_eq!(
            client.command(Path::new("/tmp/app-1.gz")).to_string(),
            "rclone --config /config/rclone.conf copy /tmp/app-1.gz b2:backups/mongo"
        );
    }
}
