//! # Object Store Gateway
//!
//! Abstract interface over the backend that holds uploaded objects.
//!
//! ## Backends
//! - `MemoryObjectStore`: in-process map (tests, local development)
//! - `S3ObjectStore`: S3-compatible storage (AWS S3, MinIO, Cloudflare R2, ...)
//! - `AzureBlobStore`: Azure Blob REST, authorized with self-issued signed URLs
//! - `TimeoutStore`: per-call deadline around any of the above
//!
//! Backends never retry. Retry/backoff is a policy for callers to layer on.

pub mod memory;
pub mod timeout;

#[cfg(feature = "vendor-aws")]
pub mod s3;

#[cfg(feature = "vendor-azure")]
pub mod azure;

pub use memory::MemoryObjectStore;
pub use timeout::TimeoutStore;

#[cfg(feature = "vendor-aws")]
pub use s3::S3ObjectStore;

#[cfg(feature = "vendor-azure")]
pub use azure::AzureBlobStore;

use bytes::Bytes;
use futures::stream::BoxStream;
use futures::TryStreamExt;

/// Object content as a stream of chunks.
pub type ByteStream<'a> = BoxStream<'a, Result<Bytes, StorageError>>;

/// Storage error type.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Backend unreachable, timed out, or answered with a server error
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),
    /// Backend refused the credentials or the operation
    #[error("storage permission denied: {0}")]
    PermissionDenied(String),
    /// Backend is out of capacity for this account or container
    #[error("storage quota exceeded: {0}")]
    QuotaExceeded(String),
    /// No object under this name
    #[error("object not found: {container}/{name}")]
    NotFound { container: String, name: String },
    /// The content stream handed to `put` failed
    #[error("content stream failed: {0}")]
    ContentStream(String),
}

impl StorageError {
    /// Maps a backend HTTP status to an error. `context` names the operation.
    pub fn from_status(status: u16, container: &str, name: &str, context: &str) -> Self {
        match status {
            401 | 403 => StorageError::PermissionDenied(format!("{context}: HTTP {status}")),
            404 => StorageError::NotFound {
                container: container.to_string(),
                name: name.to_string(),
            },
            413 | 507 => StorageError::QuotaExceeded(format!("{context}: HTTP {status}")),
            _ => StorageError::Unavailable(format!("{context}: HTTP {status}")),
        }
    }
}

/// Object store interface.
///
/// `put` replaces any existing object of the same name (last write wins) and
/// the new content is visible to `get` as soon as `put` returns. Names and
/// content are stored as given; nothing is validated.
#[async_trait::async_trait]
pub trait ObjectStore: Send + Sync {
    /// Streams `content` into `container/name`. Returns the number of bytes
    /// stored.
    async fn put(
        &self,
        container: &str,
        name: &str,
        content: ByteStream<'_>,
    ) -> Result<u64, StorageError>;

    /// Opens `container/name` for reading.
    async fn get(&self, container: &str, name: &str) -> Result<ByteStream<'static>, StorageError>;

    /// Short backend name for logs.
    fn backend(&self) -> &'static str;
}

/// Drains a stream into memory.
pub async fn read_to_vec(stream: ByteStream<'_>) -> Result<Vec<u8>, StorageError> {
    stream
        .try_fold(Vec::new(), |mut acc, chunk| async move {
            acc.extend_from_slice(&chunk);
            Ok(acc)
        })
        .await
}

/// Wraps in-memory bytes as a stream.
pub fn stream_from_bytes(bytes: impl Into<Bytes>) -> ByteStream<'static> {
    let bytes = bytes.into();
    Box::pin(futures::stream::once(async move { Ok(bytes) }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_status_mapping() {
        assert!(matches!(
            StorageError::from_status(403, "c", "n", "put"),
            StorageError::PermissionDenied(_)
        ));
        assert!(matches!(
            StorageError::from_status(404, "c", "n", "get"),
            StorageError::NotFound { .. }
        ));
        assert!(matches!(
            StorageError::from_status(507, "c", "n", "put"),
            StorageError::QuotaExceeded(_)
        ));
        assert!(matches!(
            StorageError::from_status(503, "c", "n", "put"),
            StorageError::Unavailable(_)
        ));
    }

    #[tokio::test]
    async fn test_read_to_vec_concatenates_chunks() {
        let chunks = vec![Ok(Bytes::from_static(b"he")), Ok(Bytes::from_static(b"llo"))];
        let stream: ByteStream<'static> = Box::pin(futures::stream::iter(chunks));
        assert_eq!(read_to_vec(stream).await.unwrap(), b"hello");
    }
}
