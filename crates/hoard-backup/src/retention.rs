//! Pruning of retained artifacts in a plan directory.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::{debug, info};

use crate::BackupError;

const LOG_SUFFIX: &str = ".log";

/// Artifact and log stem, `<plan>-<unix-ts>`, if `file_name` belongs to `plan`.
pub fn artifact_stem<'a>(plan: &str, file_name: &'a str) -> Option<&'a str> {
    let rest = file_name.strip_prefix(plan)?.strip_prefix('-')?;
    let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
    if digits == 0 || rest.as_bytes().get(digits) != Some(&b'.') {
        return None;
    }
    Some(&file_name[..plan.len() + 1 + digits])
}

#[derive(Debug)]
struct Entry {
    path: PathBuf,
    name: String,
    modified: SystemTime,
}

/// Keep the `retention` newest artifacts of `plan` in `dir` and their logs.
///
/// Newest is by modification time, ties broken by file name. Logs without
/// a kept artifact are removed too. `retention <= 0` keeps everything.
/// Returns the removed paths.
pub async fn apply_retention(
    dir: &Path,
    plan: &str,
    retention: i64,
) -> Result<Vec<PathBuf>, BackupError> {
    if retention <= 0 {
        return Ok(Vec::new());
    }
    let keep = usize::try_from(retention).unwrap_or(usize::MAX);

    let mut artifacts = Vec::new();
    let mut logs = Vec::new();
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(BackupError::io(format!("listing {}", dir.display())))?;
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(BackupError::io(format!("listing {}", dir.display())))?
    {
        let Ok(name) = entry.file_name().into_string() else {
            continue;
        };
        if artifact_stem(plan, &name).is_none() {
            continue;
        }
        let metadata = entry
            .metadata()
            .await
            .map_err(BackupError::io(format!("inspecting {name}")))?;
        if !metadata.is_file() {
            continue;
        }
        let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        let entry = Entry {
            path: entry.path(),
            name,
            modified,
        };
        if entry.name.ends_with(LOG_SUFFIX) {
            logs.push(entry);
        } else {
            artifacts.push(entry);
        }
    }

    artifacts.sort_by(|a, b| b.modified.cmp(&a.modified).then_with(|| b.name.cmp(&a.name)));
    let (kept, expired) = artifacts.split_at(keep.min(artifacts.len()));
    let kept_stems: HashSet<&str> = kept
        .iter()
        .filter_map(|e| artifact_stem(plan, &e.name))
        .collect();

    let mut removed = Vec::new();
    let orphaned_logs = logs.iter().filter(|log| {
        artifact_stem(plan, &log.name).is_none_or(|stem| !kept_stems.contains(stem))
    });
    for entry in expired.iter().chain(orphaned_logs) {
        tokio::fs::remove_file(&entry.path)
            .await
            .map_err(BackupError::io(format!("removing {}", entry.path.display())))?;
        debug!(path = %entry.path.display(), "removed expired file");
        removed.push(entry.path.clone());
    }

    if !removed.is_empty() {
        info!(plan, dir = %dir.display(), kept = kept.len(), removed = removed.len(), "applied retention");
    }
    Ok(removed)
}
