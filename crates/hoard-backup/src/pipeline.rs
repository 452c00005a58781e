//! One backup execution: dump, validate, encrypt, fan out, clean up.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hoard_config::{AppConfig, Plan};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};

use crate::destinations::{Artifact, CliDestinations, DestinationFactory, file_name};
use crate::encryption::{EncryptionTool, GpgCli, encrypted_path, secure_remove};
use crate::fanout::DestinationFanout;
use crate::inventory::DumpInventory;
use crate::retry::{Attempted, RetryExecutor};
use crate::tools::{DumpTool, MongoDump, MongoRestore, MongoShell, RestoreTool, ValidationConnector};
use crate::validation::ValidationRunner;
use crate::BackupError;

pub const STATUS_OK: u16 = 200;
pub const STATUS_FAILED: u16 = 500;

/// Step of an execution, recorded on failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Dump,
    Validate,
    Encrypt,
    Fanout,
    Cleanup,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Dump => "dump",
            Stage::Validate => "validate",
            Stage::Encrypt => "encrypt",
            Stage::Fanout => "fanout",
            Stage::Cleanup => "cleanup",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    pub stage: Stage,
    pub message: String,
}

/// Outcome of one execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupResult {
    pub plan: String,
    /// File name of the produced artifact.
    pub name: String,
    /// Artifact size in bytes.
    pub size: u64,
    pub timestamp: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration: Duration,
    /// 200 on success, 500 on failure.
    pub status: u16,
    pub failure: Option<Failure>,
}

impl BackupResult {
    /// A failed result that never produced an artifact.
    pub fn failed(plan: &str, stage: Stage, message: impl Into<String>, started: DateTime<Utc>) -> Self {
        let finished_at = Utc::now().max(started);
        Self {
            plan: plan.to_string(),
            name: String::new(),
            size: 0,
            timestamp: started,
            finished_at,
            duration: (finished_at - started).to_std().unwrap_or_default(),
            status: STATUS_FAILED,
            failure: Some(Failure {
                stage,
                message: message.into(),
            }),
        }
    }

    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }

    /// Human-readable outcome, as stored in the status log.
    pub fn log_line(&self) -> String {
        match &self.failure {
            None => format!(
                "Backup finished in {} archive {} size {}",
                format_duration(self.duration),
                self.name,
                human_size(self.size)
            ),
            Some(failure) => format!("BACKUP FAILED: {}", failure.message),
        }
    }
}

/// Runs one execution of a plan. This is the seam the scheduler drives.
#[async_trait]
pub trait BackupRunner: Send + Sync {
    async fn run(&self, plan: &Plan) -> BackupResult;
}

/// The external tools an execution depends on.
#[derive(Clone)]
pub struct Toolkit {
    pub dump: Arc<dyn DumpTool>,
    pub restore: Arc<dyn RestoreTool>,
    pub connector: Arc<dyn ValidationConnector>,
    pub encryptor: Arc<dyn EncryptionTool>,
    pub destinations: Arc<dyn DestinationFactory>,
}

impl Toolkit {
    /// MongoDB database tools, gpg and the vendor upload CLIs.
    pub fn cli() -> Self {
        Self {
            dump: Arc::new(MongoDump),
            restore: Arc::new(MongoRestore),
            connector: Arc::new(MongoShell),
            encryptor: Arc::new(GpgCli),
            destinations: Arc::new(CliDestinations),
        }
    }
}

/// Working copy paths of one execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkingPaths {
    pub archive: PathBuf,
    pub log: PathBuf,
}

impl WorkingPaths {
    pub fn new(tmp_path: &Path, plan: &Plan, unix_ts: i64) -> Self {
        let extension = if plan.target.no_gzip { "archive" } else { "gz" };
        Self {
            archive: tmp_path.join(format!("{}-{}.{}", plan.name, unix_ts, extension)),
            log: tmp_path.join(format!("{}-{}.log", plan.name, unix_ts)),
        }
    }
}

struct StageError {
    stage: Stage,
    error: BackupError,
}

trait AtStage<T> {
    fn at(self, stage: Stage) -> Result<T, StageError>;
}

impl<T> AtStage<T> for Result<T, BackupError> {
    fn at(self, stage: Stage) -> Result<T, StageError> {
        self.map_err(|error| StageError { stage, error })
    }
}

/// What the execution produced so far.
struct Produced {
    name: String,
    size: u64,
}

/// The job execution pipeline.
pub struct Pipeline {
    app: Arc<AppConfig>,
    tools: Toolkit,
}

impl Pipeline {
    pub fn new(app: Arc<AppConfig>, tools: Toolkit) -> Self {
        Self { app, tools }
    }

    #[instrument(skip_all, fields(plan = %plan.name))]
    pub async fn execute(&self, plan: &Plan) -> BackupResult {
        let started = Utc::now();
        let paths = WorkingPaths::new(&self.app.tmp_path, plan, started.timestamp());
        let mut produced = Produced {
            name: file_name(&paths.archive),
            size: 0,
        };

        info!(archive = %paths.archive.display(), "backup started");
        let outcome = self.stages(plan, &paths, &mut produced).await;

        let finished_at = Utc::now().max(started);
        let failure = outcome.err().map(|e| Failure {
            stage: e.stage,
            message: format!("{} {} stage failed: {}", plan.name, e.stage, e.error),
        });
        let result = BackupResult {
            plan: plan.name.clone(),
            name: produced.name,
            size: produced.size,
            timestamp: started,
            finished_at,
            duration: (finished_at - started).to_std().unwrap_or_default(),
            status: if failure.is_some() { STATUS_FAILED } else { STATUS_OK },
            failure,
        };

        match &result.failure {
            None => info!(
                archive = %result.name,
                size = result.size,
                duration_secs = result.duration.as_secs_f64(),
                "backup finished"
            ),
            Some(failure) => error!(stage = %failure.stage, error = %failure.message, "backup failed"),
        }
        result
    }

    async fn stages(
        &self,
        plan: &Plan,
        paths: &WorkingPaths,
        produced: &mut Produced,
    ) -> Result<(), StageError> {
        let timeout = plan.timeout();
        tokio::fs::create_dir_all(&self.app.tmp_path)
            .await
            .map_err(BackupError::io(format!("creating {}", self.app.tmp_path.display())))
            .at(Stage::Dump)?;

        let dumped = match self.dump(plan, &paths.archive, timeout).await {
            Ok(dumped) => dumped,
            Err(e) => {
                if let Err(cleanup) = remove_if_exists(&paths.archive).await {
                    warn!(error = %cleanup, "could not remove partial archive");
                }
                return Err(e).at(Stage::Dump);
            }
        };
        if !dumped.output.trim().is_empty() {
            tokio::fs::write(&paths.log, &dumped.output)
                .await
                .map_err(BackupError::io(format!("writing {}", paths.log.display())))
                .at(Stage::Dump)?;
        }
        produced.size = artifact_size(&paths.archive).await.at(Stage::Dump)?;

        let inventory = DumpInventory::parse(&dumped.output);
        info!(
            stage = %Stage::Dump,
            attempts = dumped.attempts,
            collections = inventory.len(),
            size = produced.size,
            "dump finished"
        );

        if let Some(validation) = &plan.validation {
            ValidationRunner::new(self.tools.restore.clone(), self.tools.connector.clone())
                .validate(
                    &paths.archive,
                    &plan.target,
                    &validation.database,
                    &inventory,
                    timeout,
                )
                .await
                .map_err(BackupError::from)
                .at(Stage::Validate)?;
        }

        let mut artifact_path = paths.archive.clone();
        if let Some(gpg) = plan.gpg() {
            let encrypted = encrypted_path(&paths.archive);
            self.tools
                .encryptor
                .encrypt(&paths.archive, &encrypted, gpg, timeout)
                .await
                .at(Stage::Encrypt)?;
            secure_remove(&paths.archive).await.at(Stage::Encrypt)?;

            produced.name = file_name(&encrypted);
            produced.size = artifact_size(&encrypted).await.at(Stage::Encrypt)?;
            info!(stage = %Stage::Encrypt, archive = %produced.name, "artifact encrypted");
            artifact_path = encrypted;
        }

        let mut artifact = Artifact::new(plan.name.clone(), artifact_path.clone());
        if tokio::fs::try_exists(&paths.log).await.unwrap_or(false) {
            artifact = artifact.with_log(paths.log.clone());
        }

        let fanout = DestinationFanout::new(self.tools.destinations.clients(plan, &self.app));
        if fanout.is_empty() {
            warn!(archive = %artifact_path.display(), "no destinations configured, keeping working copy");
            return Ok(());
        }
        let report = fanout.run(&artifact, timeout).await.at(Stage::Fanout)?;
        info!(stage = %Stage::Fanout, destinations = ?report.destinations(), "fanout finished");

        remove_if_exists(&artifact_path).await.at(Stage::Cleanup)?;
        remove_if_exists(&paths.log).await.at(Stage::Cleanup)?;
        Ok(())
    }

    async fn dump(
        &self,
        plan: &Plan,
        archive: &Path,
        timeout: Duration,
    ) -> Result<Attempted<String>, BackupError> {
        let executor = RetryExecutor::new(plan.retry, timeout).with_operation("dump");
        executor
            .run(|attempt| {
                let dump = self.tools.dump.clone();
                let target = plan.target.clone();
                let archive = archive.to_path_buf();
                async move {
                    if attempt > 1 {
                        remove_if_exists(&archive).await?;
                    }
                    dump.dump(&target, &archive, timeout).await
                }
            })
            .await
    }
}

#[async_trait]
impl BackupRunner for Pipeline {
    async fn run(&self, plan: &Plan) -> BackupResult {
        self.execute(plan).await
    }
}

async fn artifact_size(path: &Path) -> Result<u64, BackupError> {
    match tokio::fs::metadata(path).await {
        Ok(metadata) if metadata.is_file() => Ok(metadata.len()),
        _ => Err(BackupError::Artifact(path.display().to_string())),
    }
}

async fn remove_if_exists(path: &Path) -> Result<(), BackupError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(BackupError::io(format!("removing {}", path.display()))(e)),
    }
}

/// Decimal byte size, e.g. `83 MB`.
pub fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 7] = ["B", "kB", "MB", "GB", "TB", "PB", "EB"];
    if bytes < 10 {
        return format!("{bytes} B");
    }
    let mut exponent = 0;
    let mut scaled = bytes;
    while scaled >= 1000 && exponent < UNITS.len() - 1 {
        scaled /= 1000;
        exponent += 1;
    }
    let value = bytes as f64 / 1000f64.powi(exponent as i32);
    let value = (value * 10.0 + 0.5).floor() / 10.0;
    if exponent == 0 || value >= 10.0 {
        format!("{value:.0} {}", UNITS[exponent])
    } else {
        format!("{value:.1} {}", UNITS[exponent])
    }
}

/// Compact duration, e.g. `1h2m3s` or `4.25s`.
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        return format!("{:.2}s", duration.as_secs_f64());
    }
    let (hours, minutes, seconds) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if hours > 0 {
        format!("{hours}h{minutes}m{seconds}s")
    } else {
        format!("{minutes}m{seconds}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::destinations::DestinationClient;
    use crate::tools::{CollectionInfo, ValidationSession};
    use hoard_config::{Encryption, Gpg, RetryPolicy, Target, Validation};
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tempfile::{TempDir, tempdir};

    const DUMP_OUTPUT: &str = "done dumping app.users (2 documents)\ndone dumping app.orders (1 document)\n";

    #[derive(Default)]
    struct FakeDump {
        fail_first: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl DumpTool for FakeDump {
        async fn dump(&self, _target: &Target, archive: &Path, _timeout: Duration) -> Result<String, BackupError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            // leave a partial file behind on failure
            tokio::fs::write(archive, b"partial").await.unwrap();
            if call <= self.fail_first {
                return Err(BackupError::Command {
                    program: "mongodump".to_string(),
                    status: "exit status: 1".to_string(),
                    output: "connection reset".to_string(),
                });
            }
            tokio::fs::write(archive, b"complete archive").await.unwrap();
            Ok(DUMP_OUTPUT.to_string())
        }
    }

    const RESTORE_OK: &str = "3 document(s) restored successfully. 0 document(s) failed to restore.";

    struct FakeRestore {
        output: &'static str,
    }

    #[async_trait]
    impl RestoreTool for FakeRestore {
        async fn restore(&self, _: &Path, _: &Target, _: &Target, _: Duration) -> Result<String, BackupError> {
            Ok(self.output.to_string())
        }
    }

    #[derive(Clone)]
    struct FakeScratch {
        collections: Vec<CollectionInfo>,
        dropped: Arc<AtomicU32>,
    }

    #[async_trait]
    impl ValidationConnector for FakeScratch {
        async fn connect(&self, _: &Target, _: Duration) -> Result<Box<dyn ValidationSession>, BackupError> {
            Ok(Box::new(self.clone()))
        }
    }

    #[async_trait]
    impl ValidationSession for FakeScratch {
        async fn list_collections(&self) -> Result<Vec<CollectionInfo>, BackupError> {
            Ok(self.collections.clone())
        }

        async fn drop_database(&self) -> Result<(), BackupError> {
            self.dropped.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FakeGpg;

    #[async_trait]
    impl EncryptionTool for FakeGpg {
        async fn encrypt(&self, input: &Path, output: &Path, _: &Gpg, _: Duration) -> Result<String, BackupError> {
            let mut data = tokio::fs::read(input).await.unwrap();
            data.reverse();
            tokio::fs::write(output, data).await.unwrap();
            Ok(String::new())
        }
    }

    /// Uploads seen by destinations: (kind, artifact file name, log present).
    type Uploads = Arc<Mutex<Vec<(&'static str, String, bool)>>>;

    struct FakeClient {
        kind: &'static str,
        fail: bool,
        uploads: Uploads,
    }

    #[async_trait]
    impl DestinationClient for FakeClient {
        fn kind(&self) -> &'static str {
            self.kind
        }

        async fn upload(&self, artifact: &Artifact, _: Duration) -> Result<String, BackupError> {
            assert!(artifact.path.exists(), "artifact must exist during upload");
            self.uploads.lock().unwrap().push((
                self.kind,
                artifact.file_name(),
                artifact.log.is_some(),
            ));
            if self.fail {
                return Err(BackupError::Rejected {
                    tool: self.kind.to_string(),
                    output: "quota exceeded".to_string(),
                });
            }
            Ok("uploaded".to_string())
        }
    }

    struct FakeDestinations {
        kinds: Vec<(&'static str, bool)>,
        uploads: Uploads,
    }

    impl DestinationFactory for FakeDestinations {
        fn clients(&self, _: &Plan, _: &AppConfig) -> Vec<Box<dyn DestinationClient>> {
            self.kinds
                .iter()
                .map(|&(kind, fail)| {
                    Box::new(FakeClient {
                        kind,
                        fail,
                        uploads: self.uploads.clone(),
                    }) as Box<dyn DestinationClient>
                })
                .collect()
        }
    }

    struct Harness {
        tmp: TempDir,
        pipeline: Pipeline,
        dump: Arc<FakeDump>,
        uploads: Uploads,
        dropped: Arc<AtomicU32>,
    }

    fn harness(fail_first: u32, destinations: Vec<(&'static str, bool)>, restored: Vec<CollectionInfo>) -> Harness {
        harness_restoring(RESTORE_OK, fail_first, destinations, restored)
    }

    fn harness_restoring(
        restore_output: &'static str,
        fail_first: u32,
        destinations: Vec<(&'static str, bool)>,
        restored: Vec<CollectionInfo>,
    ) -> Harness {
        let tmp = tempdir().unwrap();
        let app = AppConfig::new(
            tmp.path().join("config"),
            tmp.path().join("storage"),
            tmp.path().join("tmp"),
            tmp.path().join("data"),
        );
        let dump = Arc::new(FakeDump {
            fail_first,
            ..Default::default()
        });
        let uploads = Uploads::default();
        let dropped = Arc::new(AtomicU32::new(0));
        let tools = Toolkit {
            dump: dump.clone(),
            restore: Arc::new(FakeRestore { output: restore_output }),
            connector: Arc::new(FakeScratch {
                collections: restored,
                dropped: dropped.clone(),
            }),
            encryptor: Arc::new(FakeGpg),
            destinations: Arc::new(FakeDestinations {
                kinds: destinations,
                uploads: uploads.clone(),
            }),
        };
        Harness {
            tmp,
            pipeline: Pipeline::new(Arc::new(app), tools),
            dump,
            uploads,
            dropped,
        }
    }

    fn plan() -> Plan {
        let mut plan = Plan::new("app", "0 * * * *");
        plan.target.host = "localhost".to_string();
        plan.target.port = 27017;
        plan.target.database = "app".to_string();
        plan
    }

    fn with_validation(mut plan: Plan) -> Plan {
        plan.validation = Some(Validation {
            database: Target {
                host: "localhost".to_string(),
                port: 27018,
                database: "app_check".to_string(),
                ..Default::default()
            },
        });
        plan
    }

    fn tmp_files(harness: &Harness) -> Vec<String> {
        let dir = harness.tmp.path().join("tmp");
        let mut names: Vec<_> = std::fs::read_dir(dir)
            .map(|entries| {
                entries
                    .map(|e| e.unwrap().file_name().into_string().unwrap())
                    .collect()
            })
            .unwrap_or_default();
        names.sort();
        names
    }

    // === Unit Tests ===

    #[test]
    fn test_human_size() {
        assert_eq!(human_size(0), "0 B");
        assert_eq!(human_size(999), "999 B");
        assert_eq!(human_size(1000), "1.0 kB");
        assert_eq!(human_size(1500), "1.5 kB");
        assert_eq!(human_size(82_854_982), "83 MB");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(4250)), "4.25s");
        assert_eq!(format_duration(Duration::from_secs(125)), "2m5s");
        assert_eq!(format_duration(Duration::from_secs(3723)), "1h2m3s");
    }

    #[test]
    fn test_working_paths() {
        let mut plan = plan();
        let paths = WorkingPaths::new(Path::new("/tmp"), &plan, 1_700_000_000);
        assert_eq!(paths.archive, PathBuf::from("/tmp/app-1700000000.gz"));
        assert_eq!(paths.log, PathBuf::from("/tmp/app-1700000000.log"));

        plan.target.no_gzip = true;
        let paths = WorkingPaths::new(Path::new("/tmp"), &plan, 1_700_000_000);
        assert_eq!(paths.archive, PathBuf::from("/tmp/app-1700000000.archive"));
    }

    #[test]
    fn test_log_line() {
        let started = Utc::now();
        let failed = BackupResult::failed("app", Stage::Dump, "app dump stage failed: boom", started);
        assert_eq!(failed.log_line(), "BACKUP FAILED: app dump stage failed: boom");
        assert_eq!(failed.status, STATUS_FAILED);
        assert!(!failed.is_success());

        let ok = BackupResult {
            name: "app-1.gz".to_string(),
            size: 1500,
            status: STATUS_OK,
            failure: None,
            duration: Duration::from_secs(3),
            ..failed
        };
        assert_eq!(ok.log_line(), "Backup finished in 3.00s archive app-1.gz size 1.5 kB");
    }

    // === Pipeline ===

    #[tokio::test]
    async fn test_successful_run_cleans_working_copy() {
        let h = harness(0, vec![("local", false), ("s3", false)], vec![]);
        let result = h.pipeline.execute(&plan()).await;

        assert_eq!(result.status, STATUS_OK, "{:?}", result.failure);
        assert!(result.is_success());
        assert_eq!(result.name, format!("app-{}.gz", result.timestamp.timestamp()));
        assert_eq!(result.size, b"complete archive".len() as u64);
        assert_eq!(
            *h.uploads.lock().unwrap(),
            vec![("local", result.name.clone(), true), ("s3", result.name.clone(), true)]
        );
        assert!(tmp_files(&h).is_empty());
    }

    #[tokio::test]
    async fn test_dump_retries_then_succeeds() {
        let h = harness(2, vec![("local", false)], vec![]);
        let mut plan = plan();
        plan.retry = RetryPolicy {
            attempts: 2,
            backoff_factor: 0.0,
        };

        let result = h.pipeline.execute(&plan).await;
        assert!(result.is_success());
        assert_eq!(h.dump.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_dump_failure_removes_partial_archive() {
        let h = harness(5, vec![("local", false)], vec![]);
        let mut plan = plan();
        plan.retry.attempts = 1;

        let result = h.pipeline.execute(&plan).await;
        assert_eq!(result.status, STATUS_FAILED);
        let failure = result.failure.unwrap();
        assert_eq!(failure.stage, Stage::Dump);
        assert!(failure.message.starts_with("app dump stage failed"));
        assert!(failure.message.contains("2 attempts"));
        assert_eq!(h.dump.calls.load(Ordering::SeqCst), 2);
        assert!(h.uploads.lock().unwrap().is_empty());
        assert!(tmp_files(&h).is_empty());
    }

    #[tokio::test]
    async fn test_validation_mismatch_blocks_fanout() {
        let h = harness(0, vec![("local", false)], vec![CollectionInfo::collection("users")]);
        let result = h.pipeline.execute(&with_validation(plan())).await;

        let failure = result.failure.unwrap();
        assert_eq!(failure.stage, Stage::Validate);
        assert!(failure.message.contains("orders"));
        assert!(h.uploads.lock().unwrap().is_empty());
        // working copy kept for inspection
        assert_eq!(tmp_files(&h).len(), 2);
    }

    #[tokio::test]
    async fn test_nothing_restored_fails_validation_and_drops_scratch() {
        let restored = vec![
            CollectionInfo::collection("orders"),
            CollectionInfo::collection("users"),
        ];
        let h = harness_restoring(
            "0 document(s) restored successfully. 0 document(s) failed to restore.",
            0,
            vec![("local", false)],
            restored,
        );
        let result = h.pipeline.execute(&with_validation(plan())).await;

        assert_eq!(result.status, STATUS_FAILED);
        let failure = result.failure.unwrap();
        assert_eq!(failure.stage, Stage::Validate);
        assert_eq!(h.dropped.load(Ordering::SeqCst), 1);
        assert!(h.uploads.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_validated_and_encrypted() {
        let restored = vec![
            CollectionInfo::collection("orders"),
            CollectionInfo::collection("users"),
        ];
        let h = harness(0, vec![("local", false)], restored);
        let mut plan = with_validation(plan());
        plan.encryption = Some(Encryption {
            gpg: Some(Gpg {
                recipients: vec!["ops@example.com".to_string()],
                ..Default::default()
            }),
        });

        let result = h.pipeline.execute(&plan).await;
        assert!(result.is_success(), "{:?}", result.failure);
        assert!(result.name.ends_with(".gz.encrypted"));
        assert_eq!(
            h.uploads.lock().unwrap()[0],
            ("local", result.name.clone(), true)
        );
        assert!(tmp_files(&h).is_empty());
    }

    #[tokio::test]
    async fn test_no_destinations_keeps_working_copy() {
        let h = harness(0, vec![], vec![]);
        let result = h.pipeline.execute(&plan()).await;

        assert!(result.is_success());
        assert_eq!(tmp_files(&h), vec![
            format!("app-{}.gz", result.timestamp.timestamp()),
            format!("app-{}.log", result.timestamp.timestamp()),
        ]);
    }

    #[tokio::test]
    async fn test_destination_failure_stops_fanout() {
        let h = harness(0, vec![("local", false), ("sftp", true), ("s3", false)], vec![]);
        let result = h.pipeline.execute(&plan()).await;

        let failure = result.failure.unwrap();
        assert_eq!(failure.stage, Stage::Fanout);
        assert!(failure.message.contains("sftp"));
        let kinds: Vec<_> = h.uploads.lock().unwrap().iter().map(|u| u.0).collect();
        assert_eq!(kinds, vec!["local", "sftp"]);
        assert_eq!(tmp_files(&h).len(), 2);
    }

    // === Property Tests ===

    proptest! {
        // Duration is always finished_at - timestamp and never negative
        #[test]
        fn failed_result_duration_is_consistent(offset_secs in 0i64..100_000) {
            let started = Utc::now() - chrono::Duration::seconds(offset_secs);
            let result = BackupResult::failed("app", Stage::Fanout, "x", started);
            prop_assert!(result.finished_at >= result.timestamp);
            prop_assert_eq!(
                result.duration,
                (result.finished_at - result.timestamp).to_std().unwrap()
            );
        }
    }
}
