//! # Secret store clients
//!
//! The signing credential is fetched from a secret store once at startup.
//! Only the client side of the store is implemented here.
//!
//! ## Stores
//! - `EnvSecretStore`: process environment
//! - `FileSecretStore`: one file per secret in a directory (mounted secrets)
//! - `KeyVaultSecretStore`: Azure Key Vault REST API

pub mod env;
pub mod file;
pub mod key_vault;

pub use env::EnvSecretStore;
pub use file::FileSecretStore;
pub use key_vault::KeyVaultSecretStore;

/// Secret store error type. Never carries the secret value.
#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    /// The store has no secret under this name
    #[error("secret {0} not found")]
    NotFound(String),
    /// The store could not be reached or refused the request
    #[error("secret store unavailable: {0}")]
    Unavailable(String),
    /// The secret exists but is not a usable signing credential
    #[error("secret {name} is not a valid signing credential: {reason}")]
    Invalid { name: String, reason: String },
}

/// Secret store interface.
#[async_trait::async_trait]
pub trait SecretStore: Send + Sync {
    /// Fetches the current value of the secret `name`.
    async fn fetch_secret(&self, name: &str) -> Result<String, SecretError>;

    /// Short store name for logs.
    fn kind(&self) -> &'static str;
}
