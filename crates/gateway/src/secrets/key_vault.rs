//! # Azure Key Vault secret store
//!
//! Fetches secrets through the Key Vault REST API
//! (`GET {vault}/secrets/{name}?api-version=7.4`) with a bearer token from
//! either the instance metadata endpoint (managed identity) or the
//! client-credentials flow (service principal).

use serde::Deserialize;

use super::{SecretError, SecretStore};
use crate::config::VaultAuth;

/// Key Vault REST API version
const API_VERSION: &str = "7.4";
/// Token audience for Key Vault
const VAULT_RESOURCE: &str = "https://vault.azure.net";
/// Instance metadata token endpoint
const IMDS_TOKEN_ENDPOINT: &str = "http://169.254.169.254/metadata/identity/oauth2/token";
/// Login authority for the client-credentials flow
const LOGIN_AUTHORITY: &str = "https://login.microsoftonline.com";

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Deserialize)]
struct SecretBundle {
    value: String,
}

/// Azure Key Vault secret store.
pub struct KeyVaultSecretStore {
    http_client: reqwest::Client,
    vault_url: String,
    auth: VaultAuth,
    imds_endpoint: String,
    authority: String,
}

impl KeyVaultSecretStore {
    pub fn new(http_client: reqwest::Client, vault_url: &str, auth: VaultAuth) -> Self {
        Self {
            http_client,
            vault_url: vault_url.trim_end_matches('/').to_string(),
            auth,
            imds_endpoint: IMDS_TOKEN_ENDPOINT.to_string(),
            authority: LOGIN_AUTHORITY.to_string(),
        }
    }

    /// Overrides the token endpoints (sovereign clouds, tests).
    pub fn with_token_endpoints(mut self, imds_endpoint: &str, authority: &str) -> Self {
        self.imds_endpoint = imds_endpoint.to_string();
        self.authority = authority.trim_end_matches('/').to_string();
        self
    }

    async fn access_token(&self) -> Result<String, SecretError> {
        let request = match &self.auth {
            VaultAuth::ManagedIdentity => self
                .http_client
                .get(&self.imds_endpoint)
                .header("Metadata", "true")
                .query(&[("api-version", "2018-02-01"), ("resource", VAULT_RESOURCE)]),
            VaultAuth::ServicePrincipal {
                tenant_id,
                client_id,
                client_secret,
            } => {
                let scope = format!("{VAULT_RESOURCE}/.default");
                self.http_client
                    .post(format!("{}/{tenant_id}/oauth2/v2.0/token", self.authority))
                    .form(&[
                        ("grant_type", "client_credentials"),
                        ("client_id", client_id.as_str()),
                        ("client_secret", client_secret.expose()),
                        ("scope", scope.as_str()),
                    ])
            }
        };

        let response = request
            .send()
            .await
            .map_err(|e| SecretError::Unavailable(format!("token request failed: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(SecretError::Unavailable(format!(
                "token endpoint returned HTTP {status}"
            )));
        }
        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| SecretError::Unavailable(format!("token response unreadable: {e}")))?;
        Ok(token.access_token)
    }
}

#[async_trait::async_trait]
impl SecretStore for KeyVaultSecretStore {
    async fn fetch_secret(&self, name: &str) -> Result<String, SecretError> {
        let token = self.access_token().await?;
        let url = format!("{}/secrets/{name}", self.vault_url);
        let response = self
            .http_client
            .get(&url)
            .query(&[("api-version", API_VERSION)])
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| SecretError::Unavailable(format!("GET {url} failed: {e}")))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(SecretError::NotFound(name.to_string()));
        }
        if !status.is_success() {
            return Err(SecretError::Unavailable(format!("GET {url} returned HTTP {status}")));
        }
        let bundle: SecretBundle = response
            .json()
            .await
            .map_err(|e| SecretError::Unavailable(format!("secret response unreadable: {e}")))?;
        Ok(bundle.value)
    }

    fn kind(&self) -> &'static str {
        "key-vault"
    }
}
