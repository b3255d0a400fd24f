//! Router fixtures for endpoint tests.

use std::sync::Arc;

use axum::body::Body;
use axum::http::Request;
use axum::response::Response;
use axum::Router;
use chrono::{TimeDelta, TimeZone, Utc};
use http_body_util::BodyExt;
use sharelink_crypto::SigningCredential;

use crate::app::router;
use crate::config::GatewayState;
use crate::issuer::{FixedClock, SignedUrlIssuer};
use crate::storage::{MemoryObjectStore, ObjectStore};

pub(crate) const SIGNED_URL_BASE: &str = "http://localhost/files";
pub(crate) const BOUNDARY: &str = "sharelink-test-boundary";

pub(crate) fn test_issuer(clock: Arc<FixedClock>) -> Arc<SignedUrlIssuer> {
    let credential =
        Arc::new(SigningCredential::from_bytes(b"endpoint-test-key".to_vec()).unwrap());
    Arc::new(SignedUrlIssuer::new("sharesafely", SIGNED_URL_BASE, credential).with_clock(clock))
}

/// Router over an in-memory store with links valid for one hour.
pub(crate) fn test_app() -> (Router, Arc<MemoryObjectStore>, Arc<FixedClock>) {
    let memory = Arc::new(MemoryObjectStore::new());
    let clock = FixedClock::at(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap());
    let store: Arc<dyn ObjectStore> = memory.clone();
    let state = Arc::new(GatewayState {
        store,
        issuer: test_issuer(clock.clone()),
        container: "share".to_string(),
        link_validity: TimeDelta::hours(1),
    });
    (router(state, 1024 * 1024), memory, clock)
}

/// `POST /` with a single multipart part named `field`.
pub(crate) fn multipart_request(field: &str, filename: Option<&str>, content: &[u8]) -> Request<Body> {
    let disposition = match filename {
        Some(filename) => format!("form-data; name=\"{field}\"; filename=\"{filename}\""),
        None => format!("form-data; name=\"{field}\""),
    };
    let mut body = format!(
        "--{BOUNDARY}\r\nContent-Disposition: {disposition}\r\nContent-Type: application/octet-stream\r\n\r\n"
    )
    .into_bytes();
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    Request::post("/")
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

pub(crate) async fn body_string(response: Response) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}
