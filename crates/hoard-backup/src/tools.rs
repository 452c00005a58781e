//! Database tool seams and their MongoDB CLI implementations.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use hoard_config::Target;
use serde::Deserialize;
use tracing::debug;

use crate::BackupError;
use crate::command::{CommandSpec, uri_password};

/// Produces an archive of a target database.
#[async_trait]
pub trait DumpTool: Send + Sync {
    /// Dump `target` into `archive`, returning the tool output.
    async fn dump(
        &self,
        target: &Target,
        archive: &Path,
        timeout: Duration,
    ) -> Result<String, BackupError>;
}

/// Restores an archive into a database.
#[async_trait]
pub trait RestoreTool: Send + Sync {
    /// Restore `archive`, dumped from `source`, into `target`.
    async fn restore(
        &self,
        archive: &Path,
        source: &Target,
        target: &Target,
        timeout: Duration,
    ) -> Result<String, BackupError>;
}

/// Opens sessions against the validation database.
#[async_trait]
pub trait ValidationConnector: Send + Sync {
    async fn connect(
        &self,
        target: &Target,
        timeout: Duration,
    ) -> Result<Box<dyn ValidationSession>, BackupError>;
}

/// An open connection to the validation database.
#[async_trait]
pub trait ValidationSession: Send + Sync {
    async fn list_collections(&self) -> Result<Vec<CollectionInfo>, BackupError>;
    async fn drop_database(&self) -> Result<(), BackupError>;
}

/// A collection as reported by `listCollections`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CollectionInfo {
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: CollectionKind,
}

impl CollectionInfo {
    pub fn collection(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: CollectionKind::Collection,
        }
    }

    pub fn view(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: CollectionKind::View,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectionKind {
    #[default]
    Collection,
    View,
    Timeseries,
    #[serde(other)]
    Other,
}

/// Connection arguments shared by mongodump and mongorestore.
fn connection_args(mut spec: CommandSpec, target: &Target) -> CommandSpec {
    if !target.uri.is_empty() {
        spec = spec.arg("--uri").arg(target.uri.clone());
        if let Some(password) = uri_password(&target.uri) {
            spec = spec.redact(password);
        }
        return spec;
    }

    spec = spec
        .arg("--host")
        .arg(target.host.clone())
        .arg("--port")
        .arg(target.port.to_string());
    if !target.username.is_empty() && !target.password.is_empty() {
        spec = spec
            .arg("-u")
            .arg(target.username.clone())
            .arg("-p")
            .secret_arg(target.password.clone());
    }
    spec
}

fn extra_params(spec: CommandSpec, params: &str) -> CommandSpec {
    spec.args(params.split_whitespace())
}

/// `mongodump` into a single archive file.
#[derive(Debug, Clone, Default)]
pub struct MongoDump;

impl MongoDump {
    pub fn command(target: &Target, archive: &Path) -> CommandSpec {
        let mut spec = CommandSpec::new("mongodump").arg(format!("--archive={}", archive.display()));
        if !target.no_gzip {
            spec = spec.arg("--gzip");
        }
        spec = connection_args(spec, target);
        if !target.database.is_empty() {
            spec = spec.arg("--db").arg(target.database.clone());
        }
        extra_params(spec, &target.params)
    }
}

#[async_trait]
impl DumpTool for MongoDump {
    async fn dump(
        &self,
        target: &Target,
        archive: &Path,
        timeout: Duration,
    ) -> Result<String, BackupError> {
        Self::command(target, archive).run(timeout).await
    }
}

/// `mongorestore` from a single archive file.
#[derive(Debug, Clone, Default)]
pub struct MongoRestore;

impl MongoRestore {
    pub fn command(archive: &Path, source: &Target, target: &Target) -> CommandSpec {
        let mut spec = CommandSpec::new("mongorestore").arg(format!("--archive={}", archive.display()));
        if !source.no_gzip {
            spec = spec.arg("--gzip");
        }
        spec = connection_args(spec, target);
        if !source.database.is_empty()
            && !target.database.is_empty()
            && source.database != target.database
        {
            spec = spec
                .arg(format!("--nsInclude={}.*", source.database))
                .arg(format!("--nsFrom={}.*", source.database))
                .arg(format!("--nsTo={}.*", target.database));
        }
        extra_params(spec, &target.params)
    }
}

#[async_trait]
impl RestoreTool for MongoRestore {
    async fn restore(
        &self,
        archive: &Path,
        source: &Target,
        target: &Target,
        timeout: Duration,
    ) -> Result<String, BackupError> {
        Self::command(archive, source, target).run(timeout).await
    }
}

/// Validation sessions driven through `mongosh --eval`.
#[derive(Debug, Clone, Default)]
pub struct MongoShell;

/// Session state: every call spawns a short-lived shell.
#[derive(Debug, Clone)]
struct MongoShellSession {
    uri: String,
    database: String,
    timeout: Duration,
}

impl MongoShellSession {
    fn eval(&self, script: String) -> CommandSpec {
        let mut spec = CommandSpec::new("mongosh")
            .arg(self.uri.clone())
            .arg("--quiet")
            .arg("--eval")
            .arg(script);
        if let Some(password) = uri_password(&self.uri) {
            spec = spec.redact(password);
        }
        spec
    }

    fn database_expr(&self) -> String {
        let quoted = serde_json::to_string(&self.database).unwrap_or_else(|_| "\"\"".to_string());
        format!("db.getSiblingDB({quoted})")
    }
}

#[async_trait]
impl ValidationConnector for MongoShell {
    async fn connect(
        &self,
        target: &Target,
        timeout: Duration,
    ) -> Result<Box<dyn ValidationSession>, BackupError> {
        let session = MongoShellSession {
            uri: target.connection_uri(),
            database: target.database.clone(),
            timeout,
        };
        session
            .eval("db.runCommand({ ping: 1 }).ok".to_string())
            .run(timeout)
            .await?;
        debug!(database = %session.database, "connected to validation database");
        Ok(Box::new(session))
    }
}

#[async_trait]
impl ValidationSession for MongoShellSession {
    async fn list_collections(&self) -> Result<Vec<CollectionInfo>, BackupError> {
        let script = format!(
            "EJSON.stringify({}.getCollectionInfos({{}}, {{ nameOnly: true }}))",
            self.database_expr()
        );
        let output = self.eval(script).run(self.timeout).await?;
        parse_collection_infos(&output)
    }

    async fn drop_database(&self) -> Result<(), BackupError> {
        let script = format!("{}.dropDatabase().ok", self.database_expr());
        self.eval(script).run(self.timeout).await?;
        Ok(())
    }
}

/// Parse the JSON array printed by `getCollectionInfos`.
///
/// The shell may print warnings before the result, so only the last line
/// holding an array is considered.
pub(crate) fn parse_collection_infos(output: &str) -> Result<Vec<CollectionInfo>, BackupError> {
    let line = output
        .lines()
        .rev()
        .map(str::trim)
        .find(|line| line.starts_with('['))
        .ok_or_else(|| BackupError::Rejected {
            tool: "mongosh".to_string(),
            output: output.trim().to_string(),
        })?;

    serde_json::from_str(line).map_err(|e| BackupError::Rejected {
        tool: "mongosh".to_string(),
        output: format!("unparseable collection list: {e}"),
    })
}
