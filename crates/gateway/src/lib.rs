//! # Sharelink Gateway
//!
//! Accepts a file upload, stores it under its original name and hands back a
//! time-limited signed URL scoped to exactly that object.
//!
//! ## Modules
//! - [`config`]: environment configuration and shared state
//! - [`secrets`]: secret store clients
//! - [`credential`]: signing credential providers
//! - [`storage`]: object store gateway and backends
//! - [`issuer`]: signed-URL issuance and verification
//! - [`endpoints`]: HTTP handlers
//! - [`app`]: state construction and routing

pub mod app;
pub mod config;
pub mod credential;
pub mod endpoints;
pub mod error;
pub mod issuer;
pub mod pages;
pub mod secrets;
pub mod storage;

pub use app::{build_state, router};
pub use config::{GatewayConfig, GatewayState};
pub use error::GatewayError;
pub use issuer::{SignedUrl, SignedUrlIssuer, SigningError};
