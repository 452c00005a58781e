//! Restore-and-compare verification of a dump.

use std::collections::{BTreeSet, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use hoard_config::{Plan, Target};
use tracing::{info, instrument, warn};

use crate::inventory::{DumpInventory, RestoreSummary, check_restore_output};
use crate::{BackupError, ValidationError};
use crate::tools::{CollectionInfo, CollectionKind, RestoreTool, ValidationConnector, ValidationSession};

/// Views catalog, skipped on both sides of the comparison.
const SYSTEM_VIEWS: &str = "system.views";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationState {
    Restoring,
    Comparing,
    Cleaning,
    Validated,
    Failed,
}

/// Outcome of a successful validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationReport {
    pub state: ValidationState,
    /// Ordinary collections matched between dump and restore.
    pub collections: usize,
    pub documents_restored: u64,
}

/// Restores a dump into a scratch database and compares it with the
/// dump inventory. The scratch database is always dropped afterwards.
#[derive(Clone)]
pub struct ValidationRunner {
    restore: Arc<dyn RestoreTool>,
    connector: Arc<dyn ValidationConnector>,
}

impl ValidationRunner {
    pub fn new(restore: Arc<dyn RestoreTool>, connector: Arc<dyn ValidationConnector>) -> Self {
        Self { restore, connector }
    }

    #[instrument(skip_all, fields(scratch = %scratch.database))]
    pub async fn validate(
        &self,
        archive: &Path,
        source: &Target,
        scratch: &Target,
        inventory: &DumpInventory,
        timeout: Duration,
    ) -> Result<ValidationReport, ValidationError> {
        let mut state = ValidationState::Restoring;
        info!(?state, archive = %archive.display(), "restoring dump into validation database");

        let output = self
            .restore
            .restore(archive, source, scratch, timeout)
            .await
            .map_err(|e| ValidationError::Restore(e.to_string()))?;

        let session = match tokio::time::timeout(timeout, self.connector.connect(scratch, timeout)).await {
            Ok(Ok(session)) => session,
            Ok(Err(e)) => return Err(ValidationError::Connection(e.to_string())),
            Err(_) => {
                return Err(ValidationError::Connection(format!(
                    "timed out after {}s",
                    timeout.as_secs()
                )));
            }
        };

        state = ValidationState::Comparing;
        info!(?state, collections = inventory.len(), "comparing restored database");
        let compared = compare(&output, inventory, session.as_ref(), timeout).await;

        state = ValidationState::Cleaning;
        info!(?state, "dropping validation database");
        let cleaned = drop_scratch(session.as_ref(), &scratch.database, timeout).await;

        let result = match (compared, cleaned) {
            (Ok(report), Ok(())) => Ok(report),
            (Err(primary), Ok(())) => Err(primary),
            (Ok(_), Err(cleanup)) => Err(cleanup),
            (Err(primary), Err(cleanup)) => Err(ValidationError::Combined {
                primary: Box::new(primary),
                cleanup: Box::new(cleanup),
            }),
        };

        match &result {
            Ok(report) => info!(
                state = ?report.state,
                collections = report.collections,
                documents = report.documents_restored,
                "dump validated"
            ),
            Err(e) => warn!(state = ?ValidationState::Failed, error = %e, "dump failed validation"),
        }
        result
    }
}

async fn compare(
    restore_output: &str,
    inventory: &DumpInventory,
    session: &dyn ValidationSession,
    timeout: Duration,
) -> Result<ValidationReport, ValidationError> {
    let summary = check_restore_output(restore_output)?;

    let restored = match tokio::time::timeout(timeout, session.list_collections()).await {
        Ok(Ok(restored)) => restored,
        Ok(Err(e)) => return Err(ValidationError::Inspection(e.to_string())),
        Err(_) => {
            return Err(ValidationError::Inspection(format!(
                "timed out after {}s",
                timeout.as_secs()
            )));
        }
    };

    let collections = reconcile(inventory, &restored)?;
    Ok(ValidationReport {
        state: ValidationState::Validated,
        collections,
        documents_restored: summary.restored,
    })
}

async fn drop_scratch(
    session: &dyn ValidationSession,
    database: &str,
    timeout: Duration,
) -> Result<(), ValidationError> {
    let reason = match tokio::time::timeout(timeout, session.drop_database()).await {
        Ok(Ok(())) => return Ok(()),
        Ok(Err(e)) => e.to_string(),
        Err(_) => format!("timed out after {}s", timeout.as_secs()),
    };
    Err(ValidationError::Cleanup {
        database: database.to_string(),
        reason,
    })
}

/// Restore `archive` into the plan's own target and check the summary.
#[instrument(skip_all, fields(plan = %plan.name, archive = %archive.display()))]
pub async fn restore_archive(
    tool: &dyn RestoreTool,
    plan: &Plan,
    archive: &Path,
) -> Result<RestoreSummary, BackupError> {
    let output = tool
        .restore(archive, &plan.target, &plan.target, plan.timeout())
        .await?;
    let summary = check_restore_output(&output)?;
    info!(documents = summary.restored, "archive restored");
    Ok(summary)
}

/// Match restored collections against the dump inventory.
///
/// Views and `system.views` are ignored on both sides. Returns the number
/// of matched collections.
pub fn reconcile(
    inventory: &DumpInventory,
    restored: &[CollectionInfo],
) -> Result<usize, ValidationError> {
    let mut skipped: HashSet<&str> = HashSet::from([SYSTEM_VIEWS]);
    skipped.extend(
        restored
            .iter()
            .filter(|c| c.kind == CollectionKind::View)
            .map(|c| c.name.as_str()),
    );

    let restored: BTreeSet<&str> = restored
        .iter()
        .map(|c| c.name.as_str())
        .filter(|name| !skipped.contains(name))
        .collect();
    let dumped: BTreeSet<&str> = inventory
        .names()
        .filter(|name| !skipped.contains(name))
        .collect();

    if let Some(name) = restored.difference(&dumped).next() {
        return Err(ValidationError::MissingInBackup(name.to_string()));
    }
    if let Some(name) = dumped.difference(&restored).next() {
        return Err(ValidationError::MissingInRestore(name.to_string()));
    }
    if dumped.len() != restored.len() {
        return Err(ValidationError::CountMismatch {
            backup: dumped.len(),
            restored: restored.len(),
        });
    }
    Ok(restored.len())
}
