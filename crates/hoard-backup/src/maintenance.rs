//! Periodic cleanup of the working directory.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use hoard_config::AppConfig;
use tracing::{debug, info, warn};

use crate::BackupError;

/// Files untouched for this long are considered abandoned.
pub const STALE_AFTER: Duration = Duration::from_secs(24 * 60 * 60);

/// Remove regular files under `tmp_path` older than [`STALE_AFTER`].
///
/// The status store file is never removed, even when it lives inside the
/// working directory.
pub async fn tmp_cleanup(app: &AppConfig) -> Result<Vec<PathBuf>, BackupError> {
    let cutoff = SystemTime::now()
        .checked_sub(STALE_AFTER)
        .unwrap_or(SystemTime::UNIX_EPOCH);
    let dir = app.tmp_path.clone();
    let store = app.clone();

    let removed = tokio::task::spawn_blocking(move || {
        sweep(&dir, cutoff, &|path| store.is_status_store(path))
    })
    .await
    .map_err(|e| BackupError::io("tmp cleanup task")(std::io::Error::other(e)))??;

    info!(tmp = %app.tmp_path.display(), removed = removed.len(), "tmp cleanup finished");
    Ok(removed)
}

/// Recursively delete files modified before `cutoff`, except those `keep` accepts.
fn sweep(
    dir: &Path,
    cutoff: SystemTime,
    keep: &dyn Fn(&Path) -> bool,
) -> Result<Vec<PathBuf>, BackupError> {
    let mut removed = Vec::new();
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(removed),
        Err(e) => return Err(BackupError::io(format!("listing {}", dir.display()))(e)),
    };

    for entry in entries {
        let entry = entry.map_err(BackupError::io(format!("listing {}", dir.display())))?;
        let path = entry.path();
        let file_type = entry
            .file_type()
            .map_err(BackupError::io(format!("inspecting {}", path.display())))?;

        if file_type.is_dir() {
            removed.extend(sweep(&path, cutoff, keep)?);
            continue;
        }
        if !file_type.is_file() || keep(&path) {
            continue;
        }

        let modified = match entry.metadata().and_then(|m| m.modified()) {
            Ok(modified) => modified,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cannot read modification time");
                continue;
            }
        };
        if modified < cutoff {
            std::fs::remove_file(&path)
                .map_err(BackupError::io(format!("removing {}", path.display())))?;
            debug!(path = %path.display(), "removed stale file");
            removed.push(path);
        }
    }
    Ok(removed)
}
