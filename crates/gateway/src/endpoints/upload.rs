//! # POST /
//!
//! Receives one file from a multipart form, stores it under its original
//! name in the configured container and redirects to `/link` with a
//! read-only signed URL for it.
//!
//! A request without a usable file (no part named `file`, an empty file
//! name, or zero bytes of content) re-renders the form; nothing is stored.
//! The file body is streamed straight into the object store.

use std::sync::Arc;

use axum::extract::multipart::MultipartRejection;
use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Redirect, Response};
use futures::{StreamExt, TryStreamExt};
use sharelink_crypto::sas::encode_query_value;
use sharelink_types::Permissions;

use crate::config::GatewayState;
use crate::error::GatewayError;
use crate::issuer::SignedUrl;
use crate::pages;
use crate::storage::{ByteStream, StorageError};

/// Multipart field carrying the file
pub const FILE_FIELD: &str = "file";

const NO_FILE: &str = "Choose a file to share.";
const EMPTY_FILE: &str = "The selected file is empty.";
const UNREADABLE: &str = "The upload could not be read, please try again.";

/// GET /: upload form.
pub async fn handle_upload_form() -> Html<String> {
    Html(pages::upload_form(None))
}

/// Stores `content` as `name` in the upload container and issues a
/// read-only link for it.
///
/// A link is issued only after the store reports success.
pub async fn upload_and_issue(
    state: &GatewayState,
    name: &str,
    content: ByteStream<'_>,
) -> Result<SignedUrl, GatewayError> {
    let size = state.store.put(&state.container, name, content).await?;
    tracing::info!(
        container = %state.container,
        name = %name,
        bytes = size,
        backend = state.store.backend(),
        "object stored"
    );

    let signed = state.issuer.issue(
        &state.container,
        name,
        Permissions::read_only(),
        state.link_validity,
    )?;
    Ok(signed)
}

/// POST /: upload a file and redirect to its link.
pub async fn handle_upload(
    State(state): State<Arc<GatewayState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    let mut multipart = match multipart {
        Ok(multipart) => multipart,
        Err(e) => {
            tracing::warn!(error = %e, "upload is not a multipart form");
            return form_with_notice(StatusCode::BAD_REQUEST, NO_FILE);
        }
    };

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => return form_with_notice(StatusCode::BAD_REQUEST, NO_FILE),
            Err(e) => {
                tracing::warn!(error = %e, "malformed multipart body");
                return form_with_notice(e.status(), UNREADABLE);
            }
        };
        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        let name = field.file_name().unwrap_or_default().to_string();
        if name.is_empty() {
            return form_with_notice(StatusCode::BAD_REQUEST, NO_FILE);
        }

        let mut content = field
            .map_err(|e| StorageError::ContentStream(e.to_string()))
            .boxed();

        // an empty file never reaches the store
        let first = loop {
            match content.next().await {
                Some(Ok(chunk)) if chunk.is_empty() => continue,
                Some(Ok(chunk)) => break chunk,
                Some(Err(e)) => return upload_failed(GatewayError::Storage(e)),
                None => return form_with_notice(StatusCode::BAD_REQUEST, EMPTY_FILE),
            }
        };
        let content = futures::stream::once(async move { Ok::<_, StorageError>(first) })
            .chain(content)
            .boxed();

        return match upload_and_issue(&state, &name, content).await {
            Ok(signed) => {
                tracing::info!(name = %name, not_after = %signed.grant.not_after, "link issued");
                Redirect::to(&format!("/link?url={}", encode_query_value(&signed.url)))
                    .into_response()
            }
            Err(e) => upload_failed(e),
        };
    }
}

fn form_with_notice(status: StatusCode, notice: &str) -> Response {
    (status, Html(pages::upload_form(Some(notice)))).into_response()
}

fn upload_failed(err: GatewayError) -> Response {
    let status = err.status();
    if status.is_server_error() {
        tracing::error!(error = %err, "upload failed");
    } else {
        tracing::warn!(error = %err, "upload rejected");
    }
    form_with_notice(status, err.public_message())
}
