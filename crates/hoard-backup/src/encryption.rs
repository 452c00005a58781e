//! Artifact encryption and secure removal of plaintext.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use hoard_config::Gpg;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::BackupError;
use crate::command::CommandSpec;

/// Suffix appended to encrypted artifacts.
pub const ENCRYPTED_SUFFIX: &str = ".encrypted";

/// Encrypts an artifact for a set of recipients.
#[async_trait]
pub trait EncryptionTool: Send + Sync {
    async fn encrypt(
        &self,
        input: &Path,
        output: &Path,
        settings: &Gpg,
        timeout: Duration,
    ) -> Result<String, BackupError>;
}

/// Path of the encrypted counterpart of `artifact`.
pub fn encrypted_path(artifact: &Path) -> PathBuf {
    let mut name = artifact.as_os_str().to_owned();
    name.push(ENCRYPTED_SUFFIX);
    PathBuf::from(name)
}

/// The `gpg` command-line tool.
#[derive(Debug, Clone, Default)]
pub struct GpgCli;

impl GpgCli {
    /// Command that makes the recipients' public keys available, if any.
    pub fn import_command(settings: &Gpg) -> Option<CommandSpec> {
        if !settings.key_file.is_empty() {
            return Some(
                CommandSpec::new("gpg")
                    .args(["--batch", "--import"])
                    .arg(settings.key_file.clone()),
            );
        }
        if !settings.key_server.is_empty() {
            return Some(
                CommandSpec::new("gpg")
                    .args(["--batch", "--keyserver"])
                    .arg(settings.key_server.clone())
                    .arg("--recv-keys")
                    .args(settings.recipients.iter().cloned()),
            );
        }
        None
    }

    pub fn encrypt_command(input: &Path, output: &Path, settings: &Gpg) -> CommandSpec {
        let mut spec = CommandSpec::new("gpg")
            .args(["--batch", "--yes", "--trust-model", "always", "--output"])
            .arg(output.display().to_string())
            .arg("--encrypt");
        for recipient in &settings.recipients {
            spec = spec.arg("--recipient").arg(recipient.clone());
        }
        spec.arg(input.display().to_string())
    }
}

#[async_trait]
impl EncryptionTool for GpgCli {
    async fn encrypt(
        &self,
        input: &Path,
        output: &Path,
        settings: &Gpg,
        timeout: Duration,
    ) -> Result<String, BackupError> {
        let mut log = String::new();
        if let Some(import) = Self::import_command(settings) {
            log.push_str(&import.run(timeout).await?);
        }
        log.push_str(&Self::encrypt_command(input, output, settings).run(timeout).await?);

        if !tokio::fs::try_exists(output).await.unwrap_or(false) {
            return Err(BackupError::Encryption(format!(
                "gpg did not produce {}",
                output.display()
            )));
        }
        info!(output = %output.display(), "encrypted artifact");
        Ok(log)
    }
}

/// Overwrite a file with zeros, flush it to disk and remove it.
pub async fn secure_remove(path: &Path) -> Result<(), BackupError> {
    const CHUNK: usize = 64 * 1024;

    let context = || format!("securely removing {}", path.display());
    let len = tokio::fs::metadata(path)
        .await
        .map_err(BackupError::io(context()))?
        .len();

    let mut file = OpenOptions::new()
        .write(true)
        .open(path)
        .await
        .map_err(BackupError::io(context()))?;

    let zeros = vec![0u8; CHUNK];
    let mut remaining = len;
    while remaining > 0 {
        let n = remaining.min(CHUNK as u64) as usize;
        file.write_all(&zeros[..n])
            .await
            .map_err(BackupError::io(context()))?;
        remaining -= n as u64;
    }
    file.sync_all().await.map_err(BackupError::io(context()))?;
    drop(file);

    tokio::fs::remove_file(path)
        .await
        .map_err(BackupError::io(context()))?;
    debug!(path = %path.display(), bytes = len, "securely removed plaintext");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    fn settings() -> Gpg {
        Gpg {
            key_server: "hkps://keys.openpgp.org".to_string(),
            recipients: vec!["ops@example.com".to_string(), "dba@example.com".to_string()],
            key_file: String::new(),
        }
    }

    #[test]
    fn test_encrypted_path() {
        assert_eq!(
            encrypted_path(Path::new("/tmp/app-1.gz")),
            PathBuf::from("/tmp/app-1.gz.encrypted")
        );
    }

    #[test]
    fn test_import_prefers_key_file() {
        let mut gpg = settings();
        assert_eq!(
            GpgCli::import_command(&gpg).unwrap().to_string(),
            "gpg --batch --keyserver hkps://keys.openpgp.org --recv-keys ops@example.com dba@example.com"
        );

        gpg.key_file = "/keys/ops.asc".to_string();
        assert_eq!(
            GpgCli::import_command(&gpg).unwrap().to_string(),
            "gpg --batch --import /keys/ops.asc"
        );

        gpg.key_file.clear();
        gpg.key_server.clear();
        assert!(GpgCli::import_command(&gpg).is_none());
    }

    #[test]
    fn test_encrypt_command() {
        let spec = GpgCli::encrypt_command(
            Path::new("/tmp/app-1.gz"),
            Path::new("/tmp/app-1.gz.encrypted"),
            &settings(),
        );
        assert_eq!(
            spec.to_string(),
            "gpg --batch --yes --trust-model always --output /tmp/app-1.gz.encrypted --encrypt \
             --recipient ops@example.com --recipient dba@example.com /tmp/app-1.gz"
        );
    }

    #[tokio::test]
    async fn test_secure_remove() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("plain.gz");
        tokio::fs::write(&path, vec![7u8; 100_000]).await.unwrap();

        secure_remove(&path).await.unwrap();
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_secure_remove_missing_file() {
        let dir = tempdir().unwrap();
        let err = secure_remove(&dir.path().join("missing")).await.unwrap_err();
        assert!(matches!(err, BackupError::Io { .. }));
    }
}
