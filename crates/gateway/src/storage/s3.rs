//! # S3-compatible object store
//!
//! Object store backed by AWS S3, MinIO, Cloudflare R2 and other S3-compatible
//! APIs. Each container maps to a bucket of the same name.

use std::collections::HashMap;
use std::sync::Arc;

use futures::{StreamExt, TryStreamExt};
use tokio::sync::RwLock;
use tokio_util::io::StreamReader;

use super::{ByteStream, ObjectStore, StorageError};
use crate::config::S3Config;

/// S3-compatible object store.
///
/// Bucket handles are created once per container and reused for the process
/// lifetime.
pub struct S3ObjectStore {
    region: s3::Region,
    credentials: s3::creds::Credentials,
    buckets: RwLock<HashMap<String, Arc<s3::Bucket>>>,
}

impl S3ObjectStore {
    /// Builds the store from configuration.
    pub fn new(config: &S3Config) -> anyhow::Result<Self> {
        let region = s3::Region::Custom {
            region: config.region.clone(),
            endpoint: config.endpoint.clone(),
        };
        let credentials = s3::creds::Credentials::new(
            Some(config.access_key.expose()),
            Some(config.secret_key.expose()),
            None,
            None,
            None,
        )?;
        tracing::info!(
            s3_endpoint = %config.endpoint,
            s3_region = %config.region,
            "S3 object store configured"
        );
        Ok(Self {
            region,
            credentials,
            buckets: RwLock::new(HashMap::new()),
        })
    }

    async fn bucket(&self, container: &str) -> Result<Arc<s3::Bucket>, StorageError> {
        if let Some(bucket) = self.buckets.read().await.get(container) {
            return Ok(bucket.clone());
        }
        let bucket = s3::Bucket::new(container, self.region.clone(), self.credentials.clone())
            .map_err(|e| StorageError::Unavailable(format!("bucket handle for {container}: {e}")))?
            .with_path_style();
        let bucket: Arc<s3::Bucket> = Arc::from(bucket);
        self.buckets
            .write()
            .await
            .entry(container.to_string())
            .or_insert_with(|| bucket.clone());
        Ok(bucket)
    }
}

/// Classifies an error raised by rust-s3: by HTTP status when it carries one,
/// otherwise by the S3 error code in its text.
fn s3_error(context: &str, e: s3::error::S3Error) -> StorageError {
    let message = format!("{context}: {e}");
    match e {
        s3::error::S3Error::HttpFailWithBody(401 | 403, _) => {
            StorageError::PermissionDenied(message)
        }
        s3::error::S3Error::HttpFailWithBody(413 | 507, _) => StorageError::QuotaExceeded(message),
        _ if message.contains("QuotaExceeded") => StorageError::QuotaExceeded(message),
        _ if message.contains("AccessDenied") => StorageError::PermissionDenied(message),
        _ => StorageError::Unavailable(message),
    }
}

#[async_trait::async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put(
        &self,
        container: &str,
        name: &str,
        content: ByteStream<'_>,
    ) -> Result<u64, StorageError> {
        let bucket = self.bucket(container).await?;
        let mut reader = StreamReader::new(content.map_err(std::io::Error::other));
        let response = bucket
            .put_object_stream(&mut reader, name)
            .await
            .map_err(|e| s3_error("put_object_stream", e))?;
        let status = response.status_code();
        if !(200..300).contains(&status) {
            return Err(StorageError::from_status(status, container, name, "put_object_stream"));
        }
        Ok(response.uploaded_bytes() as u64)
    }

    async fn get(&self, container: &str, name: &str) -> Result<ByteStream<'static>, StorageError> {
        let bucket = self.bucket(container).await?;
        let response = bucket
            .get_object_stream(name)
            .await
            .map_err(|e| s3_error("get_object_stream", e))?;
        if !(200..300).contains(&response.status_code) {
            return Err(StorageError::from_status(
                response.status_code,
                container,
                name,
                "get_object_stream",
            ));
        }
        Ok(response
            .bytes
            .map_err(|e| StorageError::Unavailable(format!("get_object_stream body: {e}")))
            .boxed())
    }

    fn backend(&self) -> &'static str {
        "s3"
    }
}

#[cfg(test)]
mod tests {
    use s3::error::S3Error;

    use super::*;

    #[test]
    fn test_s3_error_classification() {
        let denied = S3Error::HttpFailWithBody(
            403,
            "<Error><Code>AccessDenied</Code></Error>".to_string(),
        );
        assert!(matches!(
            s3_error("put_object_stream", denied),
            StorageError::PermissionDenied(_)
        ));

        let quota = S3Error::HttpFailWithBody(
            400,
            "<Error><Code>QuotaExceeded</Code></Error>".to_string(),
        );
        assert!(matches!(
            s3_error("put_object_stream", quota),
            StorageError::QuotaExceeded(_)
        ));

        let full = S3Error::HttpFailWithBody(507, String::new());
        assert!(matches!(
            s3_error("put_object_stream", full),
            StorageError::QuotaExceeded(_)
        ));

        let server = S3Error::HttpFailWithBody(
            503,
            "<Error><Code>SlowDown</Code></Error>".to_string(),
        );
        match s3_error("get_object_stream", server) {
            StorageError::Unavailable(message) => {
                assert!(message.starts_with("get_object_stream: "))
            }
            other => panic!("unexpected {other:?}"),
        }

        assert!(matches!(
            s3_error("get_object_stream", S3Error::HttpFail),
            StorageError::Unavailable(_)
        ));
    }

    #[test]
    fn test_store_builds_from_config() {
        let store = S3ObjectStore::new(&S3Config {
            endpoint: "http://127.0.0.1:9000".to_string(),
            region: "us-east-1".to_string(),
            access_key: crate::config::Redacted::new("minio"),
            secret_key: crate::config::Redacted::new("minio-secret"),
        })
        .unwrap();
        assert_eq!(store.backend(), "s3");
    }
}
