//! # In-memory object store
//!
//! Keeps objects in a process-local map. Content is lost on exit. Used by
//! tests and by local development with `SHARELINK_STORAGE_BACKEND=memory`.

use std::collections::HashMap;

use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use tokio::sync::RwLock;

use super::{stream_from_bytes, ByteStream, ObjectStore, StorageError};

/// In-process object store.
///
/// A `put` buffers its stream and publishes the object only once the stream
/// has ended cleanly, so a failed upload leaves the previous content intact.
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: RwLock<HashMap<(String, String), Bytes>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored objects.
    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }
}

#[async_trait::async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(
        &self,
        container: &str,
        name: &str,
        mut content: ByteStream<'_>,
    ) -> Result<u64, StorageError> {
        let mut buf = BytesMut::new();
        while let Some(chunk) = content.next().await {
            buf.extend_from_slice(&chunk?);
        }
        let size = buf.len() as u64;
        self.objects
            .write()
            .await
            .insert((container.to_string(), name.to_string()), buf.freeze());
        Ok(size)
    }

    async fn get(&self, container: &str, name: &str) -> Result<ByteStream<'static>, StorageError> {
        let objects = self.objects.read().await;
        let bytes = objects
            .get(&(container.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| StorageError::NotFound {
                container: container.to_string(),
                name: name.to_string(),
            })?;
        Ok(stream_from_bytes(bytes))
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}
