//! External tool checks run before the daemon starts.

use std::collections::BTreeSet;
use std::time::Duration;

use hoard_backup::command::tool_version;
use hoard_config::{AppConfig, Plan};
use miette::Result;
use tracing::{info, warn};

/// Tools without which no plan can run.
const REQUIRED: [&str; 2] = ["mongodump", "mongorestore"];

const CHECK_TIMEOUT: Duration = Duration::from_secs(30);

/// Outcome of the tool checks.
#[derive(Debug, Default)]
pub struct ToolReport {
    /// Tool and the first line of its `--version` output.
    pub versions: Vec<(String, String)>,
    /// Optional tools that could not be run.
    pub missing: Vec<String>,
}

/// Optional tools the loaded plans need.
pub fn optional_tools(plans: &[Plan]) -> BTreeSet<&'static str> {
    let mut tools = BTreeSet::new();
    for plan in plans {
        if plan.validation.is_some() {
            tools.insert("mongosh");
        }
        if plan.gpg().is_some() {
            tools.insert("gpg");
        }
        if let Some(sftp) = &plan.sftp {
            tools.insert("scp");
            if !sftp.password.is_empty() || !sftp.passphrase.is_empty() {
                tools.insert("sshpass");
            }
        }
        if plan.s3.is_some() {
            tools.extend(["mc", "aws"]);
        }
        if plan.gcloud.is_some() {
            tools.extend(["gcloud", "gsutil"]);
        }
        if plan.azure.is_some() {
            tools.insert("az");
        }
        if plan.rclone.is_some() {
            tools.insert("rclone");
        }
    }
    tools
}

/// Check every tool the plans need.
///
/// Fails when a MongoDB dump or restore tool is unavailable. Other missing
/// tools are warnings. `use_aws_cli` is set from whether `aws` runs.
pub async fn run(plans: &[Plan], app: &mut AppConfig) -> Result<ToolReport> {
    let mut report = ToolReport::default();

    for tool in REQUIRED {
        let version = tool_version(tool, CHECK_TIMEOUT)
            .await
            .map_err(|e| miette::miette!("{} is required: {}", tool, e))?;
        info!(tool, version = %version, "found tool");
        report.versions.push((tool.to_string(), version));
    }

    for tool in optional_tools(plans) {
        match tool_version(tool, CHECK_TIMEOUT).await {
            Ok(version) => {
                info!(tool, version = %version, "found tool");
                report.versions.push((tool.to_string(), version));
            }
            Err(e) => {
                warn!(tool, error = %e, "optional tool unavailable");
                report.missing.push(tool.to_string());
            }
        }
    }

    app.use_aws_cli = report.versions.iter().any(|(tool, _)| tool == "aws");
    if !app.use_aws_cli && report.missing.iter().any(|t| t == "aws") {
        warn!("aws CLI unavailable, using mc for S3 uploads");
    }

    Ok(report)
}
