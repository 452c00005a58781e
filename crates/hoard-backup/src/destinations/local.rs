use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use super::{Artifact, DestinationClient, file_name};
use crate::BackupError;
use crate::retention::apply_retention;

/// Copies artifacts into the plan's storage directory and prunes it.
#[derive(Debug, Clone)]
pub struct LocalClient {
    dir: PathBuf,
    plan: String,
    retention: i64,
}

impl LocalClient {
    pub fn new(dir: impl Into<PathBuf>, plan: impl Into<String>, retention: i64) -> Self {
        Self {
            dir: dir.into(),
            plan: plan.into(),
            retention,
        }
    }

    async fn copy_into_dir(&self, source: &Path) -> Result<u64, BackupError> {
        let dest = self.dir.join(file_name(source));
        tokio::fs::copy(source, &dest).await.map_err(BackupError::io(format!(
            "copying {} to {}",
            source.display(),
            dest.display()
        )))
    }
}

#[async_trait]
impl DestinationClient for LocalClient {
    fn kind(&self) -> &'static str {
        "local"
    }

    async fn upload(&self, artifact: &Artifact, _timeout: Duration) -> Result<String, BackupError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(BackupError::io(format!("creating {}", self.dir.display())))?;

        let bytes = self.copy_into_dir(&artifact.path).await?;
        if let Some(log) = &artifact.log
            && tokio::fs::try_exists(log).await.unwrap_or(false)
        {
            self.copy_into_dir(log).await?;
        }

        let removed = apply_retention(&self.dir, &self.plan, self.retention).await?;
        info!(
            plan = %self.plan,
            dir = %self.dir.display(),
            bytes,
            pruned = removed.len(),
            "stored local copy"
        );
        Ok(format!(
            "Local backup copied {} to {}, {} old file(s) removed",
            artifact.file_name(),
            self.dir.display(),
            removed.len()
        ))
    }
}
