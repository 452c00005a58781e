//! Backup plan types.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Per-operation timeout used when a plan leaves it unset.
pub const DEFAULT_TIMEOUT_MINUTES: u64 = 60;

/// A named, immutable backup configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Plan {
    /// Unique plan name, taken from the file stem.
    #[serde(skip)]
    pub name: String,
    /// Database to back up.
    pub target: Target,
    /// When and how long to run.
    pub scheduler: ScheduleConfig,
    /// Dump retry policy.
    pub retry: RetryPolicy,
    /// Scratch database used to verify the dump restores.
    pub validation: Option<Validation>,
    /// Encryption applied to the artifact before fanout.
    pub encryption: Option<Encryption>,
    /// Local retained copies.
    pub local: LocalConfig,
    pub sftp: Option<Sftp>,
    pub s3: Option<S3>,
    pub gcloud: Option<GCloud>,
    pub azure: Option<Azure>,
    pub rclone: Option<Rclone>,
    pub slack: Option<Slack>,
    pub team: Option<Team>,
}

/// Connection descriptor for a MongoDB deployment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Target {
    pub database: String,
    pub host: String,
    /// Full connection string. Takes precedence over host, port and credentials.
    pub uri: String,
    pub password: String,
    pub port: u16,
    pub username: String,
    /// Write an uncompressed archive.
    pub no_gzip: bool,
    /// Extra arguments appended to dump and restore invocations.
    pub params: String,
}

impl Target {
    /// Connection URI for drivers and shells.
    pub fn connection_uri(&self) -> String {
        if !self.uri.is_empty() {
            return self.uri.clone();
        }
        if !self.username.is_empty() && !self.password.is_empty() {
            format!(
                "mongodb://{}:{}@{}:{}",
                self.username, self.password, self.host, self.port
            )
        } else {
            format!("mongodb://{}:{}", self.host, self.port)
        }
    }

    /// Whether both descriptors point at the same server.
    fn same_server(&self, other: &Target) -> bool {
        if !self.uri.is_empty() || !other.uri.is_empty() {
            return self.uri == other.uri;
        }
        self.host == other.host && self.port == other.port
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScheduleConfig {
    /// Cron expression, 5-field standard or 6-field with seconds.
    pub cron: String,
    /// Number of artifacts kept per destination; zero or less keeps everything.
    pub retention: i64,
    /// Timeout in minutes for each blocking operation.
    pub timeout: u64,
}

/// How often and how slowly to retry a failed dump.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub attempts: u32,
    /// Seconds multiplied by `2^attempt` between attempts.
    pub backoff_factor: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Validation {
    pub database: Target,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Encryption {
    pub gpg: Option<Gpg>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Gpg {
    pub key_server: String,
    pub recipients: Vec<String>,
    pub key_file: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LocalConfig {
    /// Copy artifacts into the plan's storage directory.
    pub enabled: bool,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Sftp {
    pub dir: String,
    pub host: String,
    pub password: String,
    pub private_key: String,
    pub passphrase: String,
    pub port: u16,
    pub username: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct S3 {
    pub bucket: String,
    pub access_key: String,
    pub api: String,
    pub secret_key: String,
    pub url: String,
    pub kms_key_id: String,
    pub storage_class: String,
    #[serde(alias = "createbucketifneeded")]
    pub create_bucket_if_needed: bool,
    /// Mirror the local plan directory instead of copying one artifact.
    pub sync: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GCloud {
    pub bucket: String,
    pub key_file_path: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Azure {
    pub container_name: String,
    pub connection_string: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Rclone {
    pub bucket: String,
    pub config_file_path: String,
    pub config_section: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Slack {
    pub url: String,
    pub channel: String,
    pub username: String,
    /// Only notify on failures.
    pub warn_only: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Team {
    pub webhook_url: String,
    pub theme_color: String,
    /// Only notify on failures.
    pub warn_only: bool,
}

/// One configured destination for a produced artifact.
#[derive(Debug, Clone, PartialEq)]
pub enum DestinationConfig {
    Local(LocalConfig),
    Sftp(Sftp),
    S3(S3),
    GCloud(GCloud),
    Azure(Azure),
    Rclone(Rclone),
}

impl DestinationConfig {
    /// Short name used in logs and errors.
    pub fn kind(&self) -> &'static str {
        match self {
            DestinationConfig::Local(_) => "local",
            DestinationConfig::Sftp(_) => "sftp",
            DestinationConfig::S3(_) => "s3",
            DestinationConfig::GCloud(_) => "gcloud",
            DestinationConfig::Azure(_) => "azure",
            DestinationConfig::Rclone(_) => "rclone",
        }
    }
}

impl Plan {
    /// Create an empty plan with the given name and cron expression.
    pub fn new(name: impl Into<String>, cron: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            scheduler: ScheduleConfig {
                cron: cron.into(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Timeout for each blocking operation of an execution.
    pub fn timeout(&self) -> Duration {
        let minutes = match self.scheduler.timeout {
            0 => DEFAULT_TIMEOUT_MINUTES,
            minutes => minutes,
        };
        Duration::from_secs(minutes * 60)
    }

    /// Configured destinations in fanout order.
    pub fn destinations(&self) -> Vec<DestinationConfig> {
        let mut destinations = Vec::new();
        if self.local.enabled {
            destinations.push(DestinationConfig::Local(self.local.clone()));
        }
        if let Some(sftp) = &self.sftp {
            destinations.push(DestinationConfig::Sftp(sftp.clone()));
        }
        if let Some(s3) = &self.s3 {
            destinations.push(DestinationConfig::S3(s3.clone()));
        }
        if let Some(gcloud) = &self.gcloud {
            destinations.push(DestinationConfig::GCloud(gcloud.clone()));
        }
        if let Some(azure) = &self.azure {
            destinations.push(DestinationConfig::Azure(azure.clone()));
        }
        if let Some(rclone) = &self.rclone {
            destinations.push(DestinationConfig::Rclone(rclone.clone()));
        }
        destinations
    }

    /// Gpg settings, if the plan encrypts its artifacts.
    pub fn gpg(&self) -> Option<&Gpg> {
        self.encryption.as_ref().and_then(|e| e.gpg.as_ref())
    }

    /// Reject plans that cannot run safely.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |reason: &str| ConfigError::Invalid {
            plan: self.name.clone(),
            reason: reason.to_string(),
        };

        if self.name.is_empty() {
            return Err(invalid("plan name is empty"));
        }
        if self.name.contains(['/', '\\']) {
            return Err(invalid("plan name must not contain path separators"));
        }
        if self.scheduler.cron.trim().is_empty() {
            return Err(invalid("scheduler.cron is required"));
        }
        if self.target.uri.is_empty() && self.target.host.is_empty() {
            return Err(invalid("target needs a uri or a host"));
        }
        if let Some(validation) = &self.validation {
            let scratch = &validation.database;
            if scratch.database.is_empty() {
                return Err(invalid("validation.database.database is required"));
            }
            if scratch.same_server(&self.target) && scratch.database == self.target.database {
                return Err(invalid(
                    "validation database must differ from the target database",
                ));
            }
        }
        if let Some(encryption) = &self.encryption {
            match &encryption.gpg {
                Some(gpg) if !gpg.recipients.is_empty() => {}
                _ => return Err(invalid("encryption.gpg.recipients is required")),
            }
        }
        if let Some(s3) = &self.s3
            && s3.sync
            && !self.local.enabled
        {
            return Err(invalid("s3.sync requires local retention to be enabled"));
        }
        Ok(())
    }
}
