//! # Gateway error type
//!
//! Aggregates the per-request errors for the HTTP layer. Responses carry only
//! a generic message; the detailed error goes to the log.

use axum::http::StatusCode;
use sharelink_crypto::sas::VerifyError;

use crate::issuer::SigningError;
use crate::storage::StorageError;

/// Gateway error type.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Object store call failed
    #[error(transparent)]
    Storage(#[from] StorageError),
    /// Grant could not be minted
    #[error(transparent)]
    Signing(#[from] SigningError),
    /// Presented grant is not acceptable
    #[error(transparent)]
    Verify(#[from] VerifyError),
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::Storage(StorageError::NotFound { .. }) => StatusCode::NOT_FOUND,
            GatewayError::Storage(StorageError::ContentStream(_)) => StatusCode::BAD_REQUEST,
            GatewayError::Storage(StorageError::QuotaExceeded(_)) => StatusCode::INSUFFICIENT_STORAGE,
            GatewayError::Storage(_) => StatusCode::BAD_GATEWAY,
            GatewayError::Signing(_) => StatusCode::INTERNAL_SERVER_ERROR,
            GatewayError::Verify(VerifyError::Malformed(_)) => StatusCode::BAD_REQUEST,
            GatewayError::Verify(_) => StatusCode::FORBIDDEN,
        }
    }

    /// Message safe to show to a client.
    pub fn public_message(&self) -> &'static str {
        match self {
            GatewayError::Storage(StorageError::NotFound { .. }) => "file not found",
            GatewayError::Storage(StorageError::ContentStream(_)) => "upload was interrupted",
            GatewayError::Storage(StorageError::QuotaExceeded(_)) => "storage is full",
            GatewayError::Storage(_) => "storage is unavailable, please try again",
            GatewayError::Verify(VerifyError::Expired(_)) => "link has expired",
            GatewayError::Verify(VerifyError::Malformed(_)) => "link is malformed",
            GatewayError::Verify(_) => "link is not valid",
            GatewayError::Signing(_) => "internal error",
        }
    }
}

impl axum::response::IntoResponse for GatewayError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::warn!(error = %self, "request rejected");
        }
        (status, self.public_message()).into_response()
    }
}
