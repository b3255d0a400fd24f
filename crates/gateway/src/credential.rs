//! # Signing credential providers
//!
//! One capability (`provide`) with a strategy per credential source. The
//! provider is chosen from configuration and called exactly once at startup;
//! the resulting credential is immutable for the rest of the process.

use sharelink_crypto::SigningCredential;

use crate::config::{ConfigError, CredentialSource, Redacted};
use crate::secrets::{
    EnvSecretStore, FileSecretStore, KeyVaultSecretStore, SecretError, SecretStore,
};

/// Produces the signing credential.
#[async_trait::async_trait]
pub trait SigningCredentialProvider: Send + Sync {
    async fn provide(&self) -> Result<SigningCredential, SecretError>;

    /// Short description for logs (never the key).
    fn describe(&self) -> String;
}

/// Key supplied directly in configuration.
pub struct DirectKey {
    key: Redacted,
}

impl DirectKey {
    pub fn new(key: Redacted) -> Self {
        Self { key }
    }
}

#[async_trait::async_trait]
impl SigningCredentialProvider for DirectKey {
    async fn provide(&self) -> Result<SigningCredential, SecretError> {
        decode("SHARELINK_SIGNING_KEY", self.key.expose())
    }

    fn describe(&self) -> String {
        "direct key".to_string()
    }
}

/// Key stored as a named secret in a secret store.
pub struct SecretStoreKey {
    store: Box<dyn SecretStore>,
    secret_name: String,
}

impl SecretStoreKey {
    pub fn new(store: Box<dyn SecretStore>, secret_name: impl Into<String>) -> Self {
        Self {
            store,
            secret_name: secret_name.into(),
        }
    }
}

#[async_trait::async_trait]
impl SigningCredentialProvider for SecretStoreKey {
    async fn provide(&self) -> Result<SigningCredential, SecretError> {
        let value = self.store.fetch_secret(&self.secret_name).await?;
        decode(&self.secret_name, &value)
    }

    fn describe(&self) -> String {
        format!("{} secret {}", self.store.kind(), self.secret_name)
    }
}

fn decode(name: &str, encoded: &str) -> Result<SigningCredential, SecretError> {
    SigningCredential::from_base64(encoded).map_err(|e| SecretError::Invalid {
        name: name.to_string(),
        reason: e.to_string(),
    })
}

/// Selects the provider for `source`.
pub fn provider_from_config(
    source: &CredentialSource,
    http_client: &reqwest::Client,
) -> Result<Box<dyn SigningCredentialProvider>, ConfigError> {
    let provider: Box<dyn SigningCredentialProvider> = match source {
        CredentialSource::Direct { key } => Box::new(DirectKey::new(key.clone())),
        CredentialSource::Env { secret_name } => Box::new(SecretStoreKey::new(
            Box::new(EnvSecretStore::new()),
            secret_name.clone(),
        )),
        CredentialSource::File { dir, secret_name } => Box::new(SecretStoreKey::new(
            Box::new(FileSecretStore::new(dir.clone())),
            secret_name.clone(),
        )),
        CredentialSource::KeyVault {
            vault_url,
            secret_name,
            auth,
        } => {
            if !vault_url.starts_with("https://") && !vault_url.starts_with("http://") {
                return Err(ConfigError::Invalid {
                    name: "SHARELINK_KEY_VAULT_URL",
                    reason: "must be an http(s) URL".to_string(),
                });
            }
            Box::new(SecretStoreKey::new(
                Box::new(KeyVaultSecretStore::new(
                    http_client.clone(),
                    vault_url,
                    auth.clone(),
                )),
                secret_name.clone(),
            ))
        }
    };
    Ok(provider)
}
