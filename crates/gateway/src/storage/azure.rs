//! # Azure Blob object store
//!
//! Stores objects as block blobs through the Blob REST API. Every call is
//! authorized with a short-lived signed URL minted by the gateway's own
//! issuer, so the signing credential is the only secret in play.
//!
//! Uploads are staged as fixed-size blocks (`Put Block`) and committed with
//! `Put Block List`, which keeps memory bounded by one block regardless of
//! object size.

use std::sync::Arc;

use base64::Engine;
use bytes::BytesMut;
use chrono::TimeDelta;
use futures::{StreamExt, TryStreamExt};
use sharelink_crypto::sas::{encode_query_value, SIGNED_VERSION};
use sharelink_types::Permissions;

use super::{ByteStream, ObjectStore, StorageError};
use crate::issuer::SignedUrlIssuer;

/// Default block size (4 MiB)
pub const DEFAULT_BLOCK_SIZE: usize = 4 * 1024 * 1024;

/// Azure Blob object store.
pub struct AzureBlobStore {
    http_client: reqwest::Client,
    issuer: Arc<SignedUrlIssuer>,
    /// Validity of the signed URLs used to authorize each call
    auth_validity: TimeDelta,
    block_size: usize,
}

impl AzureBlobStore {
    pub fn new(
        http_client: reqwest::Client,
        issuer: Arc<SignedUrlIssuer>,
        auth_validity: TimeDelta,
    ) -> Self {
        Self {
            http_client,
            issuer,
            auth_validity,
            block_size: DEFAULT_BLOCK_SIZE,
        }
    }

    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size.max(1);
        self
    }

    fn authorized_url(
        &self,
        container: &str,
        name: &str,
        permissions: Permissions,
    ) -> Result<String, StorageError> {
        self.issuer
            .issue(container, name, permissions, self.auth_validity)
            .map(|signed| signed.url)
            .map_err(|e| StorageError::PermissionDenied(format!("cannot authorize call: {e}")))
    }

    async fn put_block(
        &self,
        url: &str,
        container: &str,
        name: &str,
        block_id: &str,
        block: bytes::Bytes,
    ) -> Result<(), StorageError> {
        let response = self
            .http_client
            .put(format!(
                "{url}&comp=block&blockid={}",
                encode_query_value(block_id)
            ))
            .header("x-ms-version", SIGNED_VERSION)
            .body(block)
            .send()
            .await
            .map_err(|e| StorageError::Unavailable(format!("put block: {e}")))?;
        let status = response.status().as_u16();
        if status != 201 {
            return Err(StorageError::from_status(status, container, name, "put block"));
        }
        Ok(())
    }

    async fn put_block_list(
        &self,
        url: &str,
        container: &str,
        name: &str,
        block_ids: &[String],
    ) -> Result<(), StorageError> {
        let mut body = String::from(r#"<?xml version="1.0" encoding="utf-8"?><BlockList>"#);
        for id in block_ids {
            body.push_str("<Latest>");
            body.push_str(id);
            body.push_str("</Latest>");
        }
        body.push_str("</BlockList>");

        let response = self
            .http_client
            .put(format!("{url}&comp=blocklist"))
            .header("x-ms-version", SIGNED_VERSION)
            .header("content-type", "application/xml")
            .body(body)
            .send()
            .await
            .map_err(|e| StorageError::Unavailable(format!("put block list: {e}")))?;
        let status = response.status().as_u16();
        if status != 201 {
            return Err(StorageError::from_status(
                status,
                container,
                name,
                "put block list",
            ));
        }
        Ok(())
    }
}

/// Block IDs must have equal length within a blob. Uncommitted blocks are
/// keyed by blob name and ID, so each upload carries its own `upload` nonce
/// to keep concurrent uploads of one name from replacing each other's blocks.
fn block_id(upload: u64, index: usize) -> String {
    base64::engine::general_purpose::STANDARD.encode(format!("{upload:016x}-{index:08}"))
}

#[async_trait::async_trait]
impl ObjectStore for AzureBlobStore {
    async fn put(
        &self,
        container: &str,
        name: &str,
        mut content: ByteStream<'_>,
    ) -> Result<u64, StorageError> {
        let url = self.authorized_url(container, name, Permissions::upload())?;
        let upload: u64 = rand::random();
        let mut block_ids = Vec::new();
        let mut buf = BytesMut::with_capacity(self.block_size);
        let mut total = 0u64;

        while let Some(chunk) = content.next().await {
            let chunk = chunk?;
            total += chunk.len() as u64;
            buf.extend_from_slice(&chunk);
            while buf.len() >= self.block_size {
                let block = buf.split_to(self.block_size).freeze();
                let id = block_id(upload, block_ids.len());
                self.put_block(&url, container, name, &id, block).await?;
                block_ids.push(id);
            }
        }
        if !buf.is_empty() {
            let id = block_id(upload, block_ids.len());
            self.put_block(&url, container, name, &id, buf.freeze()).await?;
            block_ids.push(id);
        }

        // committing an empty list creates an empty blob
        self.put_block_list(&url, container, name, &block_ids).await?;
        tracing::debug!(
            container = %container,
            name = %name,
            blocks = block_ids.len(),
            bytes = total,
            "blob committed"
        );
        Ok(total)
    }

    async fn get(&self, container: &str, name: &str) -> Result<ByteStream<'static>, StorageError> {
        let url = self.authorized_url(container, name, Permissions::read_only())?;
        let response = self
            .http_client
            .get(&url)
            .header("x-ms-version", SIGNED_VERSION)
            .send()
            .await
            .map_err(|e| StorageError::Unavailable(format!("get blob: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(StorageError::from_status(
                status.as_u16(),
                container,
                name,
                "get blob",
            ));
        }
        Ok(response
            .bytes_stream()
            .map_err(|e| StorageError::Unavailable(format!("get blob body: {e}")))
            .boxed())
    }

    fn backend(&self) -> &'static str {
        "azure"
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use axum::body::Bytes;
    use axum::extract::{Path, RawQuery, State};
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use chrono::Utc;
    use sharelink_crypto::SigningCredential;
    use tokio::sync::Mutex;

    use super::*;
    use crate::storage::{read_to_vec, stream_from_bytes};

    /// Blob service double: verifies the signed query like the real service
    /// would and keeps staged and committed blocks in memory.
    #[derive(Clone)]
    struct MockBlobService {
        issuer: Arc<SignedUrlIssuer>,
        staged: Arc<Mutex<HashMap<(String, String), Bytes>>>,
        blobs: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    }

    fn param<'a>(query: &'a str, key: &str) -> Option<&'a str> {
        query
            .split('&')
            .filter_map(|p| p.split_once('='))
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v)
    }

    async fn handle_put(
        State(svc): State<MockBlobService>,
        Path((container, name)): Path<(String, String)>,
        RawQuery(query): RawQuery,
        body: Bytes,
    ) -> impl IntoResponse {
        let query = query.unwrap_or_default();
        if svc
            .issuer
            .verify_query(&container, &name, &query, Utc::now(), Permissions::upload())
            .is_err()
        {
            return StatusCode::FORBIDDEN;
        }
        match param(&query, "comp") {
            Some("block") => {
                let id = param(&query, "blockid").unwrap().to_string();
                svc.staged.lock().await.insert((name, id), body);
                StatusCode::CREATED
            }
            Some("blocklist") => {
                let xml = String::from_utf8(body.to_vec()).unwrap();
                let mut staged = svc.staged.lock().await;
                let mut blob = Vec::new();
                for part in xml.split("<Latest>").skip(1) {
                    let id = part.split("</Latest>").next().unwrap();
                    let encoded = encode_query_value(id);
                    let block = staged.remove(&(name.clone(), encoded)).unwrap();
                    blob.extend_from_slice(&block);
                }
                svc.blobs.lock().await.insert(name, blob);
                StatusCode::CREATED
            }
            _ => StatusCode::BAD_REQUEST,
        }
    }

    async fn handle_get(
        State(svc): State<MockBlobService>,
        Path((container, name)): Path<(String, String)>,
        RawQuery(query): RawQuery,
    ) -> axum::response::Response {
        let query = query.unwrap_or_default();
        if svc
            .issuer
            .verify_query(&container, &name, &query, Utc::now(), Permissions::read_only())
            .is_err()
        {
            return StatusCode::FORBIDDEN.into_response();
        }
        match svc.blobs.lock().await.get(&name) {
            Some(blob) => blob.clone().into_response(),
            None => StatusCode::NOT_FOUND.into_response(),
        }
    }

    fn credential(key: &[u8]) -> Arc<SigningCredential> {
        Arc::new(SigningCredential::from_bytes(key.to_vec()).unwrap())
    }

    /// Starts the double and returns a store pointed at it.
    async fn spawn(service_key: &[u8], client_key: &[u8]) -> AzureBlobStore {
        spawn_with_service(service_key, client_key).await.0
    }

    async fn spawn_with_service(
        service_key: &[u8],
        client_key: &[u8],
    ) -> (AzureBlobStore, MockBlobService) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://127.0.0.1:{}", listener.local_addr().unwrap().port());

        let svc = MockBlobService {
            issuer: Arc::new(SignedUrlIssuer::new("acct", &base, credential(service_key))),
            staged: Arc::default(),
            blobs: Arc::default(),
        };
        let app = axum::Router::new()
            .route(
                "/{container}/{name}",
                axum::routing::put(handle_put).get(handle_get),
            )
            .with_state(svc.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let issuer = Arc::new(SignedUrlIssuer::new("acct", &base, credential(client_key)));
        let store = AzureBlobStore::new(reqwest::Client::new(), issuer, TimeDelta::minutes(5))
            .with_block_size(4);
        (store, svc)
    }

    #[test]
    fn test_block_ids_have_equal_length() {
        assert_eq!(block_id(0, 0).len(), block_id(u64::MAX, 12_345).len());
        assert_ne!(block_id(7, 0), block_id(7, 1));
        assert_ne!(block_id(7, 0), block_id(8, 0));
    }

    #[tokio::test]
    async fn test_interleaved_same_name_puts_do_not_mix() {
        let (store, svc) = spawn_with_service(b"account-key", b"account-key").await;
        let store = Arc::new(store);

        // first upload stages one block, then stalls until released
        let (tx, rx) = futures::channel::mpsc::unbounded::<Result<Bytes, StorageError>>();
        tx.unbounded_send(Ok(Bytes::from_static(b"AAAA"))).unwrap();
        let first = tokio::spawn({
            let store = store.clone();
            async move { store.put("share", "n.bin", rx.boxed()).await }
        });
        while svc.staged.lock().await.is_empty() {
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }

        store
            .put("share", "n.bin", stream_from_bytes(&b"BBBB"[..]))
            .await
            .unwrap();

        tx.unbounded_send(Ok(Bytes::from_static(b"aaaa"))).unwrap();
        drop(tx);
        assert_eq!(first.await.unwrap().unwrap(), 8);

        let bytes = read_to_vec(store.get("share", "n.bin").await.unwrap())
            .await
            .unwrap();
        assert_eq!(bytes, b"AAAAaaaa");
    }

    #[tokio::test]
    async fn test_put_in_blocks_then_get() {
        let store = spawn(b"account-key", b"account-key").await;
        let chunks = vec![
            Ok(Bytes::from_static(b"hello ")),
            Ok(Bytes::from_static(b"block ")),
            Ok(Bytes::from_static(b"world")),
        ];
        let size = store
            .put("share", "greeting.txt", Box::pin(futures::stream::iter(chunks)))
            .await
            .unwrap();
        assert_eq!(size, 17);

        let bytes = read_to_vec(store.get("share", "greeting.txt").await.unwrap())
            .await
            .unwrap();
        assert_eq!(bytes, b"hello block world");
    }

    #[tokio::test]
    async fn test_overwrite_replaces_content() {
        let store = spawn(b"account-key", b"account-key").await;
        store
            .put("share", "n.txt", stream_from_bytes(&b"first version"[..]))
            .await
            .unwrap();
        store
            .put("share", "n.txt", stream_from_bytes(&b"second"[..]))
            .await
            .unwrap();
        let bytes = read_to_vec(store.get("share", "n.txt").await.unwrap())
            .await
            .unwrap();
        assert_eq!(bytes, b"second");
    }

    #[tokio::test]
    async fn test_get_missing_blob_is_not_found() {
        let store = spawn(b"account-key", b"account-key").await;
        let err = store.get("share", "absent.txt").await.err().unwrap();
        assert!(matches!(err, StorageError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_wrong_key_is_permission_denied() {
        let store = spawn(b"account-key", b"stale-key").await;
        let err = store
            .put("share", "n.txt", stream_from_bytes(&b"data"[..]))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::PermissionDenied(_)));
    }
}
