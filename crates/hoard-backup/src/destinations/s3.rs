use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use hoard_config::S3;
use tracing::{debug, info, warn};

use super::{Artifact, DestinationClient};
use crate::BackupError;
use crate::command::CommandSpec;

/// Marker `mc` prints for failures it does not reflect in its exit code.
const ERROR_MARKER: &str = "<ERROR>";

/// Uploads to S3-compatible storage with `mc`, or `aws s3` on AWS.
#[derive(Debug, Clone)]
pub struct S3Client {
    config: S3,
    local_dir: PathBuf,
    plan: String,
    use_aws_cli: bool,
}

impl S3Client {
    pub fn new(
        config: S3,
        local_dir: impl Into<PathBuf>,
        plan: impl Into<String>,
        use_aws_cli: bool,
    ) -> Self {
        Self {
            config,
            local_dir: local_dir.into(),
            plan: plan.into(),
            use_aws_cli,
        }
    }

    fn uses_aws(&self) -> bool {
        self.use_aws_cli && endpoint_host(&self.config.url).ends_with("amazonaws.com")
    }

    fn remote(&self) -> String {
        format!("{}/{}", self.plan, self.config.bucket.trim_end_matches('/'))
    }

    fn alias_set(&self) -> CommandSpec {
        self.with_alias_args(CommandSpec::new("mc").args(["alias", "set"]))
    }

    fn alias_fallback(&self) -> CommandSpec {
        self.with_alias_args(CommandSpec::new("mc").args(["config", "host", "add"]))
    }

    fn with_alias_args(&self, spec: CommandSpec) -> CommandSpec {
        let mut spec = spec
            .arg(self.plan.clone())
            .arg(self.config.url.clone())
            .arg(self.config.access_key.clone())
            .secret_arg(self.config.secret_key.clone());
        if !self.config.api.is_empty() {
            spec = spec.arg("--api").arg(self.config.api.clone());
        }
        spec
    }

    /// `mc` upload of a single artifact, or mirror of the plan directory.
    pub fn mc_upload(&self, artifact: &Path) -> CommandSpec {
        if self.config.sync {
            CommandSpec::new("mc")
                .args(["mirror", "--overwrite", "--remove"])
                .arg(self.local_dir.display().to_string())
                .arg(format!("{}/{}", self.remote(), self.plan))
        } else {
            CommandSpec::new("mc")
                .args(["cp", "--quiet"])
                .arg(artifact.display().to_string())
                .arg(format!("{}/{}", self.remote(), super::file_name(artifact)))
        }
    }

    /// `aws s3` upload of a single artifact, or sync of the plan directory.
    pub fn aws_upload(&self, artifact: &Path) -> CommandSpec {
        let bucket = format!("s3://{}", self.config.bucket.trim_end_matches('/'));
        let mut spec = if self.config.sync {
            CommandSpec::new("aws")
                .args(["s3", "sync"])
                .arg(self.local_dir.display().to_string())
                .arg(format!("{bucket}/{}", self.plan))
                .arg("--delete")
        } else {
            CommandSpec::new("aws")
                .args(["s3", "cp"])
                .arg(artifact.display().to_string())
                .arg(format!("{bucket}/{}", super::file_name(artifact)))
        };
        if !self.config.kms_key_id.is_empty() {
            spec = spec
                .args(["--sse", "aws:kms", "--sse-kms-key-id"])
                .arg(self.config.kms_key_id.clone());
        }
        if !self.config.storage_class.is_empty() {
            spec = spec
                .arg("--storage-class")
                .arg(self.config.storage_class.clone());
        }
        spec.env("AWS_ACCESS_KEY_ID", self.config.access_key.clone())
            .env("AWS_SECRET_ACCESS_KEY", self.config.secret_key.clone())
            .redact(self.config.secret_key.clone())
    }

    async fn upload_with_mc(&self, artifact: &Path, timeout: Duration) -> Result<String, BackupError> {
        let mut log = match self.alias_set().run(timeout).await {
            Ok(out) => out,
            Err(e) => {
                debug!(error = %e, "mc alias set failed, trying legacy config host add");
                self.alias_fallback().run(timeout).await?
            }
        };

        if self.config.create_bucket_if_needed {
            let bucket = self.remote();
            let listed = CommandSpec::new("mc")
                .arg("ls")
                .arg(bucket.clone())
                .run(timeout)
                .await;
            if listed.is_err() {
                info!(bucket = %self.config.bucket, "creating bucket");
                log.push_str(
                    &CommandSpec::new("mc")
                        .args(["mb", "--ignore-existing"])
                        .arg(bucket)
                        .run(timeout)
                        .await?,
                );
            }
        }

        log.push_str(&self.mc_upload(artifact).run(timeout).await?);
        Ok(log)
    }
}

/// Host portion of an endpoint URL.
fn endpoint_host(url: &str) -> &str {
    let rest = url.split_once("://").map_or(url, |(_, rest)| rest);
    rest.split(['/', ':']).next().unwrap_or_default()
}

/// Fail when the output carries an error marker despite a clean exit.
fn check_output(tool: &str, output: String) -> Result<String, BackupError> {
    if output.contains(ERROR_MARKER) {
        return Err(BackupError::Rejected {
            tool: tool.to_string(),
            output: crate::command::single_line(&output),
        });
    }
    Ok(output)
}

#[async_trait]
impl DestinationClient for S3Client {
    fn kind(&self) -> &'static str {
        "s3"
    }

    async fn upload(&self, artifact: &Artifact, timeout: Duration) -> Result<String, BackupError> {
        if self.config.sync && !tokio::fs::try_exists(&self.local_dir).await.unwrap_or(false) {
            warn!(dir = %self.local_dir.display(), "s3 sync source directory missing");
        }

        let output = if self.uses_aws() {
            let upload = self.aws_upload(&artifact.path);
            let output = upload.run(timeout).await?;
            check_output("aws", upload.scrub(&output))?
        } else {
            check_output("mc", self.upload_with_mc(&artifact.path, timeout).await?)?
        };

        Ok(format!(
            "S3 upload finished {} -> {}\n{}",
            artifact.file_name(),
            self.config.bucket,
            output.trim()
        ))
    }
}
