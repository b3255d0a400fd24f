//! # Application wiring
//!
//! One construction path from [`GatewayConfig`] to the running router:
//! credential provider, signing credential, issuer, object store, deadline
//! wrapper, routes.

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::get;
use axum::Router;
use chrono::TimeDelta;

use crate::config::{ConfigError, GatewayConfig, GatewayState, StorageConfig};
use crate::credential::provider_from_config;
use crate::endpoints::{
    handle_file, handle_health, handle_link, handle_upload, handle_upload_form,
};
use crate::issuer::SignedUrlIssuer;
use crate::storage::{MemoryObjectStore, ObjectStore, TimeoutStore};

/// Builds the shared state.
///
/// Fails when the signing credential cannot be obtained; the gateway never
/// starts without one.
pub async fn build_state(config: &GatewayConfig) -> anyhow::Result<Arc<GatewayState>> {
    let http_client = reqwest::Client::new();

    let provider = provider_from_config(&config.credential, &http_client)?;
    tracing::info!(source = %provider.describe(), "loading signing credential");
    let credential = Arc::new(provider.provide().await?);

    let issuer = Arc::new(SignedUrlIssuer::new(
        &config.account,
        &config.signed_url_base,
        credential,
    ));
    let backend = build_store(config, &http_client, issuer.clone())?;
    tracing::info!(
        backend = backend.backend(),
        account = %config.account,
        container = %config.container,
        signed_url_base = %config.signed_url_base,
        link_validity_secs = config.link_validity.num_seconds(),
        "object store ready"
    );

    Ok(Arc::new(GatewayState {
        store: Arc::new(TimeoutStore::new(backend, config.storage_timeout)),
        issuer,
        container: config.container.clone(),
        link_validity: config.link_validity,
    }))
}

#[allow(unused_variables)]
fn build_store(
    config: &GatewayConfig,
    http_client: &reqwest::Client,
    issuer: Arc<SignedUrlIssuer>,
) -> anyhow::Result<Arc<dyn ObjectStore>> {
    match &config.storage {
        StorageConfig::Memory => {
            tracing::warn!("memory object store: objects are lost on exit");
            Ok(Arc::new(MemoryObjectStore::new()))
        }
        #[cfg(feature = "vendor-aws")]
        StorageConfig::S3(s3) => Ok(Arc::new(crate::storage::S3ObjectStore::new(s3)?)),
        #[cfg(not(feature = "vendor-aws"))]
        StorageConfig::S3(_) => Err(ConfigError::Unsupported("s3").into()),
        #[cfg(feature = "vendor-azure")]
        StorageConfig::Azure => {
            // each backend call is bounded by the storage deadline
            let auth_validity =
                TimeDelta::from_std(config.storage_timeout).map_err(|e| ConfigError::Invalid {
                    name: "SHARELINK_STORAGE_TIMEOUT_SECS",
                    reason: e.to_string(),
                })?;
            Ok(Arc::new(crate::storage::AzureBlobStore::new(
                http_client.clone(),
                issuer,
                auth_validity,
            )))
        }
        #[cfg(not(feature = "vendor-azure"))]
        StorageConfig::Azure => Err(ConfigError::Unsupported("azure").into()),
    }
}

/// Routes over `state`. Request bodies above `max_upload_bytes` are refused.
pub fn router(state: Arc<GatewayState>, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/", get(handle_upload_form).post(handle_upload))
        .route("/link", get(handle_link))
        .route("/files/{container}/{*name}", get(handle_file))
        .route("/healthz", get(handle_health))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(state)
}
