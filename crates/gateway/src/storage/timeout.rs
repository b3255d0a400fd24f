//! # Per-call deadline
//!
//! Wraps an object store so that no `put` or `get` can stall indefinitely on
//! a hung transport.

use std::sync::Arc;
use std::time::Duration;

use super::{ByteStream, ObjectStore, StorageError};

/// Applies a deadline to every call of the inner store.
///
/// `put` is bounded end to end (the whole upload). `get` is bounded until the
/// backend starts answering; the body stream is consumed by the HTTP client at
/// its own pace.
pub struct TimeoutStore {
    inner: Arc<dyn ObjectStore>,
    deadline: Duration,
}

impl TimeoutStore {
    pub fn new(inner: Arc<dyn ObjectStore>, deadline: Duration) -> Self {
        Self { inner, deadline }
    }
}

#[async_trait::async_trait]
impl ObjectStore for TimeoutStore {
    async fn put(
        &self,
        container: &str,
        name: &str,
        content: ByteStream<'_>,
    ) -> Result<u64, StorageError> {
        tokio::time::timeout(self.deadline, self.inner.put(container, name, content))
            .await
            .map_err(|_| {
                StorageError::Unavailable(format!(
                    "put {container}/{name} exceeded {}s deadline",
                    self.deadline.as_secs()
                ))
            })?
    }

    async fn get(&self, container: &str, name: &str) -> Result<ByteStream<'static>, StorageError> {
        tokio::time::timeout(self.deadline, self.inner.get(container, name))
            .await
            .map_err(|_| {
                StorageError::Unavailable(format!(
                    "get {container}/{name} exceeded {}s deadline",
                    self.deadline.as_secs()
                ))
            })?
    }

    fn backend(&self) -> &'static str {
        self.inner.backend()
    }
}
