//! Persisted per-plan status.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::{Status, StatusStoreError};

/// JSON-backed status rows keyed by plan name.
///
/// Every mutation writes a full snapshot while holding the write lock, so
/// the file always holds a complete, consistent document.
#[derive(Debug)]
pub struct StatusStore {
    path: PathBuf,
    rows: RwLock<BTreeMap<String, Status>>,
}

impl StatusStore {
    /// Open the store at `path`. A missing file is an empty store.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StatusStoreError> {
        let path = path.into();
        let rows = match fs::read(&path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => BTreeMap::new(),
            Ok(bytes) => {
                let list: Vec<Status> =
                    serde_json::from_slice(&bytes).map_err(|source| StatusStoreError::Corrupt {
                        path: path.clone(),
                        source,
                    })?;
                list.into_iter().map(|s| (s.plan.clone(), s)).collect()
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(source) => return Err(StatusStoreError::Io { path, source }),
        };

        info!(path = %path.display(), rows = rows.len(), "opened status store");
        Ok(Self {
            path,
            rows: RwLock::new(rows),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace the row for `status.plan`.
    pub async fn put(&self, status: Status) -> Result<(), StatusStoreError> {
        let mut rows = self.rows.write().await;
        rows.insert(status.plan.clone(), status);
        self.persist(&rows).await
    }

    /// Record next run times.
    ///
    /// Existing rows keep their last run fields; plans without a row get a
    /// new one.
    pub async fn sync(
        &self,
        next_runs: &[(String, Option<DateTime<Utc>>)],
    ) -> Result<(), StatusStoreError> {
        let mut rows = self.rows.write().await;
        for (plan, next_run) in next_runs {
            rows.entry(plan.clone())
                .and_modify(|row| row.next_run = *next_run)
                .or_insert_with(|| Status::scheduled(plan.clone(), *next_run));
        }
        self.persist(&rows).await
    }

    pub async fn get(&self, plan: &str) -> Option<Status> {
        self.rows.read().await.get(plan).cloned()
    }

    /// All rows ordered by plan name, including rows for plans no longer loaded.
    pub async fn list(&self) -> Vec<Status> {
        self.rows.read().await.values().cloned().collect()
    }

    async fn persist(&self, rows: &BTreeMap<String, Status>) -> Result<(), StatusStoreError> {
        let list: Vec<&Status> = rows.values().collect();
        let json = serde_json::to_vec_pretty(&list)?;
        let io = |source| StatusStoreError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await.map_err(io)?;
        }

        // Write to temp file first, then rename
        let temp_path = self.path.with_extension("tmp");
        let mut file = fs::File::create(&temp_path).await.map_err(io)?;
        file.write_all(&json).await.map_err(io)?;
        file.sync_all().await.map_err(io)?;
        fs::rename(&temp_path, &self.path).await.map_err(io)?;

        debug!(path = %self.path.display(), rows = rows.len(), "persisted status store");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn at(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, h, 0, 0).unwrap()
    }

    fn finished(plan: &str, status: u16) -> Status {
        Status {
            plan: plan.to_string(),
            next_run: Some(at(3)),
            last_run: Some(at(1)),
            last_run_status: Some(status),
            last_run_log: Some("Backup finished in 2.00s archive x.gz size 1 kB".to_string()),
        }
    }

    #[tokio::test]
    async fn test_missing_file_is_empty() {
        let dir = tempdir().unwrap();
        let store = StatusStore::open(dir.path().join("status.json")).await.unwrap();
        assert!(store.list().await.is_empty());
        assert!(store.get("app").await.is_none());
    }

    #[tokio::test]
    async fn test_corrupt_file_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("status.json");
        std::fs::write(&path, b"{not json").unwrap();

        let err = StatusStore::open(&path).await.unwrap_err();
        assert!(matches!(err, StatusStoreError::Corrupt { .. }));
    }

    #[tokio::test]
    async fn test_put_persists_across_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data/status.json");

        let store = StatusStore::open(&path).await.unwrap();
        store.put(finished("app", 200)).await.unwrap();
        assert!(!path.with_extension("tmp").exists());

        let reopened = StatusStore::open(&path).await.unwrap();
        assert_eq!(reopened.get("app").await, Some(finished("app", 200)));
    }

    #[tokio::test]
    async fn test_sync_only_touches_next_run() {
        let dir = tempdir().unwrap();
        let store = StatusStore::open(dir.path().join("status.json")).await.unwrap();
        store.put(finished("app", 500)).await.unwrap();

        store
            .sync(&[
                ("app".to_string(), Some(at(9))),
                ("billing".to_string(), Some(at(10))),
            ])
            .await
            .unwrap();

        let app = store.get("app").await.unwrap();
        assert_eq!(app.next_run, Some(at(9)));
        assert_eq!(app.last_run_status, Some(500));
        assert_eq!(app.last_run, Some(at(1)));

        assert_eq!(
            store.get("billing").await,
            Some(Status::scheduled("billing", Some(at(10))))
        );
    }

    #[tokio::test]
    async fn test_list_is_ordered_and_keeps_orphans() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("status.json");
        let store = StatusStore::open(&path).await.unwrap();
        store.put(finished("zeta", 200)).await.unwrap();
        store.put(finished("alpha", 200)).await.unwrap();

        // "zeta" is no longer a loaded plan
        store
            .sync(&[("alpha".to_string(), Some(at(4)))])
            .await
            .unwrap();

        let plans: Vec<_> = store.list().await.into_iter().map(|s| s.plan).collect();
        assert_eq!(plans, vec!["alpha", "zeta"]);
    }

    #[tokio::test]
    async fn test_concurrent_puts_leave_valid_snapshot() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("status.json");
        let store = Arc::new(StatusStore::open(&path).await.unwrap());

        let mut handles = Vec::new();
        for i in 0..20 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store.put(finished(&format!("plan-{i:02}"), 200)).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let reopened = StatusStore::open(&path).await.unwrap();
        assert_eq!(reopened.list().await.len(), 20);
    }

    #[tokio::test]
    async fn test_snapshot_format() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("status.json");
        let store = StatusStore::open(&path).await.unwrap();
        store
            .sync(&[("app".to_string(), Some(at(2)))])
            .await
            .unwrap();

        let value: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(
            value,
            serde_json::json!([{ "plan": "app", "nextRun": "2024-05-01T02:00:00Z" }])
        );
    }
}
