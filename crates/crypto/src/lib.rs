//! # Sharelink signing primitives
//!
//! Symmetric signing of access grants and the signed-URL wire format.
//!
//! ## Algorithms
//! | Purpose | Algorithm |
//! |------|------------|
//! | Grant signature | HMAC-SHA256 |
//! | Signature encoding | Base64 (standard, padded) |
//! | Key encoding | Base64 (standard, padded) |
//!
//! The canonical signing string and query layout live in [`sas`].

pub mod sas;

use std::fmt;

use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Crypto error type.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// Signing key is empty
    #[error("signing key is empty")]
    EmptyKey,
    /// Signing key is not valid Base64
    #[error("signing key is not valid base64")]
    KeyEncoding,
    /// Signature is not valid Base64
    #[error("signature is not valid base64")]
    SignatureEncoding,
    /// MAC verification failed
    #[error("signature does not match")]
    SignatureMismatch,
    /// HMAC key setup failed
    #[error("HMAC key setup failed")]
    MacInit,
}

/// Base64 engine (Standard)
pub fn b64() -> base64::engine::GeneralPurpose {
    base64::engine::general_purpose::STANDARD
}

/// Symmetric key used to sign and verify grants.
///
/// Loaded once at startup and shared read-only afterwards. `Debug` never
/// prints the key material.
#[derive(Clone)]
pub struct SigningCredential {
    key: Vec<u8>,
}

impl SigningCredential {
    /// Builds a credential from raw key bytes.
    pub fn from_bytes(key: impl Into<Vec<u8>>) -> Result<Self, CryptoError> {
        let key = key.into();
        if key.is_empty() {
            return Err(CryptoError::EmptyKey);
        }
        Ok(Self { key })
    }

    /// Builds a credential from its Base64 form (the form storage account keys
    /// and stored secrets use).
    pub fn from_base64(encoded: &str) -> Result<Self, CryptoError> {
        let encoded = encoded.trim();
        if encoded.is_empty() {
            return Err(CryptoError::EmptyKey);
        }
        let key = b64().decode(encoded).map_err(|_| CryptoError::KeyEncoding)?;
        Self::from_bytes(key)
    }

    /// MAC over `message`, Base64 encoded.
    pub fn sign(&self, message: &[u8]) -> Result<String, CryptoError> {
        Ok(b64().encode(hmac_sha256(&self.key, message)?))
    }

    /// Checks a Base64 MAC over `message` in constant time.
    pub fn verify(&self, message: &[u8], signature_b64: &str) -> Result<(), CryptoError> {
        let tag = b64()
            .decode(signature_b64)
            .map_err(|_| CryptoError::SignatureEncoding)?;
        hmac_sha256_verify(&self.key, message, &tag)
    }
}

impl fmt::Debug for SigningCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningCredential")
            .field("key", &"<redacted>")
            .finish()
    }
}

/// HMAC-SHA256.
pub fn hmac_sha256(key: &[u8], message: &[u8]) -> Result<[u8; 32], CryptoError> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(key).map_err(|_| CryptoError::MacInit)?;
    mac.update(message);
    Ok(mac.finalize().into_bytes().into())
}

/// HMAC-SHA256 verification (constant time).
pub fn hmac_sha256_verify(key: &[u8], message: &[u8], tag: &[u8]) -> Result<(), CryptoError> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(key).map_err(|_| CryptoError::MacInit)?;
    mac.update(message);
    mac.verify_slice(tag).map_err(|_| CryptoError::SignatureMismatch)
}
