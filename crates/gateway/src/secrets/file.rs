//! # File secret store
//!
//! Reads secrets mounted as files, one file per secret
//! (Docker / Kubernetes secret volumes).

use std::path::PathBuf;

use super::{SecretError, SecretStore};

/// Reads `<dir>/<name>`. Trailing whitespace is stripped.
pub struct FileSecretStore {
    dir: PathBuf,
}

impl FileSecretStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait::async_trait]
impl SecretStore for FileSecretStore {
    async fn fetch_secret(&self, name: &str) -> Result<String, SecretError> {
        // a name with path components could escape the secret directory
        if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
            return Err(SecretError::NotFound(name.to_string()));
        }
        let path = self.dir.join(name);
        match tokio::fs::read_to_string(&path).await {
            Ok(value) => {
                let value = value.trim_end().to_string();
                if value.is_empty() {
                    return Err(SecretError::NotFound(name.to_string()));
                }
                Ok(value)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(SecretError::NotFound(name.to_string()))
            }
            Err(e) => Err(SecretError::Unavailable(format!(
                "failed to read {}: {e}",
                path.display()
            ))),
        }
    }

    fn kind(&self) -> &'static str {
        "file"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_reads_and_trims_secret_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("signing-key"), "c2VjcmV0LWtleQ==\n").unwrap();
        let store = FileSecretStore::new(dir.path());
        assert_eq!(store.fetch_secret("signing-key").await.unwrap(), "c2VjcmV0LWtleQ==");
    }

    #[tokio::test]
    async fn test_missing_or_empty_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("empty"), "\n").unwrap();
        let store = FileSecretStore::new(dir.path());
        assert!(matches!(
            store.fetch_secret("absent").await,
            Err(SecretError::NotFound(_))
        ));
        assert!(matches!(
            store.fetch_secret("empty").await,
            Err(SecretError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_rejects_path_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSecretStore::new(dir.path().join("secrets"));
        assert!(matches!(
            store.fetch_secret("../etc/passwd").await,
            Err(SecretError::NotFound(_))
        ));
    }
}
