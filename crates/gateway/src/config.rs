//! # Gateway configuration and shared state
//!
//! Settings are read once from the environment. Every setting is required;
//! nothing falls back to a value baked into the code. A missing or malformed
//! setting aborts startup before any traffic is served.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::TimeDelta;

use crate::issuer::SignedUrlIssuer;
use crate::storage::ObjectStore;

/// Configuration error type.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required variable is not set (or set to an empty string)
    #[error("required setting {0} is not set")]
    Missing(&'static str),
    /// Variable is set but cannot be used
    #[error("setting {name} is invalid: {reason}")]
    Invalid { name: &'static str, reason: String },
    /// Selected backend was compiled out
    #[error("{0} support is not compiled into this build")]
    Unsupported(&'static str),
}

/// A secret string. `Debug` never prints the value.
#[derive(Clone, PartialEq, Eq)]
pub struct Redacted(String);

impl Redacted {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Redacted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<redacted>")
    }
}

/// S3-compatible backend settings.
#[derive(Debug, Clone)]
pub struct S3Config {
    /// e.g. `http://localhost:9000`, `https://s3.eu-west-1.amazonaws.com`
    pub endpoint: String,
    pub region: String,
    pub access_key: Redacted,
    pub secret_key: Redacted,
}

/// Where uploaded objects go.
#[derive(Debug, Clone)]
pub enum StorageConfig {
    /// In-process map
    Memory,
    /// S3-compatible API
    S3(S3Config),
    /// Azure Blob REST at the signed URL base endpoint
    Azure,
}

/// How the Key Vault client authenticates.
#[derive(Debug, Clone)]
pub enum VaultAuth {
    /// Token from the instance metadata endpoint
    ManagedIdentity,
    /// Client-credentials flow for an app registration
    ServicePrincipal {
        tenant_id: String,
        client_id: String,
        client_secret: Redacted,
    },
}

/// Where the signing credential comes from.
#[derive(Debug, Clone)]
pub enum CredentialSource {
    /// Base64 key given directly in configuration
    Direct { key: Redacted },
    /// Named environment variable
    Env { secret_name: String },
    /// File `<dir>/<secret_name>` (mounted secrets)
    File { dir: String, secret_name: String },
    /// Azure Key Vault secret
    KeyVault {
        vault_url: String,
        secret_name: String,
        auth: VaultAuth,
    },
}

/// Gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Socket address to bind
    pub listen_addr: SocketAddr,
    /// Storage account identity
    pub account: String,
    /// Container receiving uploads
    pub container: String,
    /// Base endpoint of issued URLs
    pub signed_url_base: String,
    /// Validity window of issued links
    pub link_validity: TimeDelta,
    /// Upper bound on an upload request body
    pub max_upload_bytes: usize,
    /// Deadline for each storage call
    pub storage_timeout: Duration,
    pub storage: StorageConfig,
    pub credential: CredentialSource,
}

impl GatewayConfig {
    /// Reads the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads the configuration through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(lookup);

        let listen_addr = env.parse("SHARELINK_LISTEN_ADDR")?;
        let account = env.required("SHARELINK_STORAGE_ACCOUNT")?;
        let container = env.required("SHARELINK_CONTAINER")?;
        let signed_url_base = env.required("SHARELINK_SIGNED_URL_BASE")?;
        if !signed_url_base.starts_with("https://") && !signed_url_base.starts_with("http://") {
            return Err(ConfigError::Invalid {
                name: "SHARELINK_SIGNED_URL_BASE",
                reason: "must be an http(s) URL".to_string(),
            });
        }

        let validity_secs: i64 = env.parse("SHARELINK_LINK_VALIDITY_SECS")?;
        if validity_secs <= 0 {
            return Err(ConfigError::Invalid {
                name: "SHARELINK_LINK_VALIDITY_SECS",
                reason: format!("must be positive, got {validity_secs}"),
            });
        }
        let link_validity =
            TimeDelta::try_seconds(validity_secs).ok_or_else(|| ConfigError::Invalid {
                name: "SHARELINK_LINK_VALIDITY_SECS",
                reason: format!("{validity_secs} is out of range"),
            })?;

        let max_upload_bytes: usize = env.parse("SHARELINK_MAX_UPLOAD_BYTES")?;
        let timeout_secs: u64 = env.parse("SHARELINK_STORAGE_TIMEOUT_SECS")?;
        if timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                name: "SHARELINK_STORAGE_TIMEOUT_SECS",
                reason: "must be positive".to_string(),
            });
        }

        let storage = match env.required("SHARELINK_STORAGE_BACKEND")?.as_str() {
            "memory" => StorageConfig::Memory,
            "s3" => StorageConfig::S3(S3Config {
                endpoint: env.required("S3_ENDPOINT")?,
                region: env.required("S3_REGION")?,
                access_key: Redacted::new(env.required("S3_ACCESS_KEY")?),
                secret_key: Redacted::new(env.required("S3_SECRET_KEY")?),
            }),
            "azure" => StorageConfig::Azure,
            other => {
                return Err(ConfigError::Invalid {
                    name: "SHARELINK_STORAGE_BACKEND",
                    reason: format!("unknown backend {other:?} (expected memory, s3 or azure)"),
                })
            }
        };

        let credential = match env.required("SHARELINK_CREDENTIAL_SOURCE")?.as_str() {
            "direct" => CredentialSource::Direct {
                key: Redacted::new(env.required("SHARELINK_SIGNING_KEY")?),
            },
            "env" => CredentialSource::Env {
                secret_name: env.required("SHARELINK_SECRET_NAME")?,
            },
            "file" => CredentialSource::File {
                dir: env.required("SHARELINK_SECRET_DIR")?,
                secret_name: env.required("SHARELINK_SECRET_NAME")?,
            },
            "key-vault" => CredentialSource::KeyVault {
                vault_url: env.required("SHARELINK_KEY_VAULT_URL")?,
                secret_name: env.required("SHARELINK_SECRET_NAME")?,
                auth: match env.required("SHARELINK_VAULT_AUTH")?.as_str() {
                    "managed-identity" => VaultAuth::ManagedIdentity,
                    "service-principal" => VaultAuth::ServicePrincipal {
                        tenant_id: env.required("AZURE_TENANT_ID")?,
                        client_id: env.required("AZURE_CLIENT_ID")?,
                        client_secret: Redacted::new(env.required("AZURE_CLIENT_SECRET")?),
                    },
                    other => {
                        return Err(ConfigError::Invalid {
                            name: "SHARELINK_VAULT_AUTH",
                            reason: format!(
                                "unknown auth {other:?} (expected managed-identity or service-principal)"
                            ),
                        })
                    }
                },
            },
            other => {
                return Err(ConfigError::Invalid {
                    name: "SHARELINK_CREDENTIAL_SOURCE",
                    reason: format!(
                        "unknown source {other:?} (expected direct, env, file or key-vault)"
                    ),
                })
            }
        };

        Ok(Self {
            listen_addr,
            account,
            container,
            signed_url_base,
            link_validity,
            max_upload_bytes,
            storage_timeout: Duration::from_secs(timeout_secs),
            storage,
            credential,
        })
    }
}

/// Lookup wrapper with typed accessors.
struct Env<F>(F);

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn required(&self, name: &'static str) -> Result<String, ConfigError> {
        (self.0)(name)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .ok_or(ConfigError::Missing(name))
    }

    fn parse<T>(&self, name: &'static str) -> Result<T, ConfigError>
    where
        T: std::str::FromStr,
        T::Err: fmt::Display,
    {
        self.required(name)?
            .parse()
            .map_err(|e: T::Err| ConfigError::Invalid {
                name,
                reason: e.to_string(),
            })
    }
}

/// Gateway shared state.
pub struct GatewayState {
    /// Object store (already wrapped with the per-call deadline)
    pub store: Arc<dyn ObjectStore>,
    /// Issuer holding the signing credential
    pub issuer: Arc<SignedUrlIssuer>,
    /// Container receiving uploads
    pub container: String,
    /// Validity window of issued links
    pub link_validity: TimeDelta,
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn base_vars() -> HashMap<&'static str, &'static str> {
        HashMap::from([
            ("SHARELINK_LISTEN_ADDR", "127.0.0.1:3000"),
            ("SHARELINK_STORAGE_ACCOUNT", "sharesafely"),
            ("SHARELINK_CONTAINER", "share"),
            ("SHARELINK_SIGNED_URL_BASE", "https://sharesafely.blob.core.windows.net"),
            ("SHARELINK_LINK_VALIDITY_SECS", "86400"),
            ("SHARELINK_MAX_UPLOAD_BYTES", "10485760"),
            ("SHARELINK_STORAGE_TIMEOUT_SECS", "30"),
            ("SHARELINK_STORAGE_BACKEND", "azure"),
            ("SHARELINK_CREDENTIAL_SOURCE", "direct"),
            ("SHARELINK_SIGNING_KEY", "c2VjcmV0LWtleQ=="),
        ])
    }

    fn load(vars: &HashMap<&'static str, &'static str>) -> Result<GatewayConfig, ConfigError> {
        GatewayConfig::from_lookup(|name| vars.get(name).map(|v| v.to_string()))
    }

    #[test]
    fn test_loads_complete_configuration() {
        let config = load(&base_vars()).unwrap();
        assert_eq!(config.listen_addr, "127.0.0.1:3000".parse().unwrap());
        assert_eq!(config.account, "sharesafely");
        assert_eq!(config.container, "share");
        assert_eq!(config.link_validity, TimeDelta::days(1));
        assert_eq!(config.max_upload_bytes, 10 * 1024 * 1024);
        assert_eq!(config.storage_timeout, Duration::from_secs(30));
        assert!(matches!(config.storage, StorageConfig::Azure));
        assert!(matches!(config.credential, CredentialSource::Direct { .. }));
    }

    #[test]
    fn test_every_base_variable_is_required() {
        let vars = base_vars();
        for name in vars.keys() {
            let mut partial = vars.clone();
            partial.remove(name);
            let err = load(&partial).unwrap_err();
            assert!(
                matches!(err, ConfigError::Missing(missing) if missing == *name),
                "removing {name} gave {err:?}"
            );
        }
    }

    #[test]
    fn test_empty_value_counts_as_missing() {
        let mut vars = base_vars();
        vars.insert("SHARELINK_CONTAINER", "  ");
        assert!(matches!(
            load(&vars),
            Err(ConfigError::Missing("SHARELINK_CONTAINER"))
        ));
    }

    #[test]
    fn test_rejects_non_positive_validity() {
        for bad in ["0", "-5"] {
            let mut vars = base_vars();
            vars.insert("SHARELINK_LINK_VALIDITY_SECS", bad);
            assert!(matches!(
                load(&vars),
                Err(ConfigError::Invalid { name: "SHARELINK_LINK_VALIDITY_SECS", .. })
            ));
        }
        let mut vars = base_vars();
        vars.insert("SHARELINK_LINK_VALIDITY_SECS", "a day");
        assert!(matches!(load(&vars), Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn test_rejects_unknown_backend_and_bad_base() {
        let mut vars = base_vars();
        vars.insert("SHARELINK_STORAGE_BACKEND", "ftp");
        assert!(matches!(
            load(&vars),
            Err(ConfigError::Invalid { name: "SHARELINK_STORAGE_BACKEND", .. })
        ));

        let mut vars = base_vars();
        vars.insert("SHARELINK_SIGNED_URL_BASE", "sharesafely.blob.core.windows.net");
        assert!(matches!(
            load(&vars),
            Err(ConfigError::Invalid { name: "SHARELINK_SIGNED_URL_BASE", .. })
        ));
    }

    #[test]
    fn test_s3_backend_requires_its_settings() {
        let mut vars = base_vars();
        vars.insert("SHARELINK_STORAGE_BACKEND", "s3");
        vars.insert("S3_ENDPOINT", "http://localhost:9000");
        vars.insert("S3_REGION", "us-east-1");
        vars.insert("S3_ACCESS_KEY", "minio");
        assert!(matches!(load(&vars), Err(ConfigError::Missing("S3_SECRET_KEY"))));

        vars.insert("S3_SECRET_KEY", "minio-secret");
        let config = load(&vars).unwrap();
        let StorageConfig::S3(s3) = config.storage else {
            panic!("expected s3 storage");
        };
        assert_eq!(s3.secret_key.expose(), "minio-secret");
        assert!(!format!("{s3:?}").contains("minio-secret"));
    }

    #[test]
    fn test_key_vault_service_principal() {
        let mut vars = base_vars();
        vars.insert("SHARELINK_CREDENTIAL_SOURCE", "key-vault");
        vars.insert("SHARELINK_KEY_VAULT_URL", "https://vault.example.net/");
        vars.insert("SHARELINK_SECRET_NAME", "blob-storage-account-key");
        vars.insert("SHARELINK_VAULT_AUTH", "service-principal");
        vars.insert("AZURE_TENANT_ID", "tenant");
        vars.insert("AZURE_CLIENT_ID", "client");
        assert!(matches!(load(&vars), Err(ConfigError::Missing("AZURE_CLIENT_SECRET"))));

        vars.insert("AZURE_CLIENT_SECRET", "shh");
        let config = load(&vars).unwrap();
        match config.credential {
            CredentialSource::KeyVault {
                secret_name,
                auth: VaultAuth::ServicePrincipal { client_id, .. },
                ..
            } => {
                assert_eq!(secret_name, "blob-storage-account-key");
                assert_eq!(client_id, "client");
            }
            other => panic!("unexpected credential source {other:?}"),
        }
    }

    #[test]
    fn test_signing_key_is_not_debug_printed() {
        let config = load(&base_vars()).unwrap();
        assert!(!format!("{config:?}").contains("c2VjcmV0LWtleQ=="));
    }
}
