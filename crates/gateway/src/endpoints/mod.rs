//! # Gateway endpoints
//!
//! - `GET /`: upload form
//! - `POST /`: upload a file and get redirected to its signed link
//! - `GET /link`: show a signed link
//! - `GET /files/{container}/{*name}`: verifying proxy for signed links
//! - `GET /healthz`: liveness

pub mod files;
pub mod health;
pub mod link;
pub mod upload;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use files::handle_file;
pub use health::handle_health;
pub use link::handle_link;
pub use upload::{handle_upload, handle_upload_form, upload_and_issue};
