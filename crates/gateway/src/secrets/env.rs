//! # Environment secret store

use super::{SecretError, SecretStore};

/// Reads secrets from environment variables of the same name.
#[derive(Default)]
pub struct EnvSecretStore;

impl EnvSecretStore {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl SecretStore for EnvSecretStore {
    async fn fetch_secret(&self, name: &str) -> Result<String, SecretError> {
        match std::env::var(name) {
            Ok(value) if !value.trim().is_empty() => Ok(value),
            Ok(_) | Err(std::env::VarError::NotPresent) => Err(SecretError::NotFound(name.to_string())),
            Err(std::env::VarError::NotUnicode(_)) => Err(SecretError::Invalid {
                name: name.to_string(),
                reason: "value is not valid UTF-8".to_string(),
            }),
        }
    }

    fn kind(&self) -> &'static str {
        "env"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_variable_is_not_found() {
        let store = EnvSecretStore::new();
        let err = store
            .fetch_secret("SHARELINK_TEST_SECRET_THAT_IS_NEVER_SET")
            .await
            .unwrap_err();
        assert!(matches!(err, SecretError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_reads_present_variable() {
        // PATH is set in every test environment
        let store = EnvSecretStore::new();
        assert!(store.fetch_secret("PATH").await.is_ok());
    }
}
