//! Process-wide configuration.

use std::path::{Path, PathBuf};

/// File name of the persisted status store inside `data_path`.
const STATUS_STORE_FILE: &str = "hoard-status.json";

/// Settings shared by every execution.
///
/// Built once at startup and passed explicitly to the pipeline and the
/// destination clients.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Directory holding the plan files.
    pub config_path: PathBuf,
    /// Root of the local retention directories, one per plan.
    pub storage_path: PathBuf,
    /// Working directory for dumps in progress.
    pub tmp_path: PathBuf,
    /// Directory holding the status store.
    pub data_path: PathBuf,
    /// Upload to AWS endpoints with the `aws` CLI instead of `mc`.
    pub use_aws_cli: bool,
}

impl AppConfig {
    /// Create a configuration rooted at the given directories.
    pub fn new(
        config_path: impl Into<PathBuf>,
        storage_path: impl Into<PathBuf>,
        tmp_path: impl Into<PathBuf>,
        data_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            config_path: config_path.into(),
            storage_path: storage_path.into(),
            tmp_path: tmp_path.into(),
            data_path: data_path.into(),
            use_aws_cli: false,
        }
    }

    /// Path of the persisted status store.
    pub fn status_store_path(&self) -> PathBuf {
        self.data_path.join(STATUS_STORE_FILE)
    }

    /// Local retention directory for a plan.
    pub fn plan_storage_dir(&self, plan: &str) -> PathBuf {
        self.storage_path.join(plan)
    }

    /// Whether `path` is the status store file.
    pub fn is_status_store(&self, path: &Path) -> bool {
        path == self.status_store_path()
            || path.file_name().is_some_and(|name| name == STATUS_STORE_FILE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths() {
        let config = AppConfig::new("/config", "/storage", "/tmp", "/data");
        assert_eq!(
            config.status_store_path(),
            PathBuf::from("/data/hoard-status.json")
        );
        assert_eq!(
            config.plan_storage_dir("mongo-test"),
            PathBuf::from("/storage/mongo-test")
        );
        assert!(config.is_status_store(Path::new("/data/hoard-status.json")));
        assert!(config.is_status_store(Path::new("/tmp/hoard-status.json")));
        assert!(!config.is_status_store(Path::new("/tmp/mongo-test-1.gz")));
    }
}
