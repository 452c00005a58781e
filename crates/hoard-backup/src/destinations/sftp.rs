use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use hoard_config::Sftp;

use super::{Artifact, DestinationClient, file_name, run_all};
use crate::BackupError;
use crate::command::CommandSpec;

const DEFAULT_SSH_PORT: u16 = 22;

/// Uploads over SSH with `scp`, using `sshpass` for password auth.
#[derive(Debug, Clone)]
pub struct SftpClient {
    config: Sftp,
}

impl SftpClient {
    pub fn new(config: Sftp) -> Self {
        Self { config }
    }

    pub fn command(&self, source: &Path) -> CommandSpec {
        let config = &self.config;
        let port = match config.port {
            0 => DEFAULT_SSH_PORT,
            port => port,
        };

        let secret = if !config.private_key.is_empty() {
            &config.passphrase
        } else {
            &config.password
        };
        let mut spec = if secret.is_empty() {
            // batch mode: fail instead of prompting
            CommandSpec::new("scp").arg("-B")
        } else {
            let mut sshpass = CommandSpec::new("sshpass");
            if !config.private_key.is_empty() {
                sshpass = sshpass.args(["-P", "passphrase"]);
            }
            sshpass.arg("-p").secret_arg(secret.clone()).arg("scp")
        };

        spec = spec
            .arg("-P")
            .arg(port.to_string())
            .args(["-o", "StrictHostKeyChecking=no"]);
        if !config.private_key.is_empty() {
            spec = spec.arg("-i").arg(config.private_key.clone());
        }

        let remote_dir = config.dir.trim_end_matches('/');
        let remote = if remote_dir.is_empty() {
            file_name(source)
        } else {
            format!("{remote_dir}/{}", file_name(source))
        };
        spec.arg(source.display().to_string())
            .arg(format!("{}@{}:{}", config.username, config.host, remote))
    }
}

#[async_trait]
impl DestinationClient for SftpClient {
    fn kind(&self) -> &'static str {
        "sftp"
    }

    async fn upload(&self, artifact: &Artifact, timeout: Duration) -> Result<String, BackupError> {
        let mut commands = vec![self.command(&artifact.path)];
        if let Some(log) = &artifact.log
            && tokio::fs::try_exists(log).await.unwrap_or(false)
        {
            commands.push(self.command(log));
        }
        run_all(&commands, timeout).await?;
        Ok(format!(
            "SFTP upload finished {} -> {}@{}:{}",
            artifact.file_name(),
            self.config.username,
            self.config.host,
            self.config.dir
        ))
    }
}
