//! # GET /files/{container}/{*name}
//!
//! Serves objects behind signed URLs when the gateway itself is the signed
//! URL endpoint (memory and S3 backends). The grant in the query must verify
//! against the gateway's credential, cover the current instant and include
//! read permission; only then is the object streamed back.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Path, RawQuery, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use sharelink_crypto::sas::VerifyError;
use sharelink_types::Permissions;

use crate::config::GatewayState;
use crate::error::GatewayError;

/// GET /files/{container}/{*name}?<signed query>
pub async fn handle_file(
    State(state): State<Arc<GatewayState>>,
    Path((container, name)): Path<(String, String)>,
    RawQuery(query): RawQuery,
) -> Result<Response, GatewayError> {
    let query = query.ok_or_else(|| {
        GatewayError::Verify(VerifyError::Malformed("missing signed query".to_string()))
    })?;

    let now = state.issuer.now()?;
    let grant =
        state
            .issuer
            .verify_query(&container, &name, &query, now, Permissions::read_only())?;
    let content = state.store.get(&container, &name).await?;

    tracing::info!(
        container = %container,
        name = %name,
        not_after = %grant.not_after,
        "serving shared object"
    );
    let content_type = mime_guess::from_path(&name).first_or_octet_stream();
    Ok((
        [(header::CONTENT_TYPE, content_type.to_string())],
        Body::from_stream(content),
    )
        .into_response())
}
