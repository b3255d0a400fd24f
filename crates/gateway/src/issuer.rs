//! # Signed-URL Issuer
//!
//! Mints and verifies signed URLs for stored objects.
//!
//! Issuance is `Requested → Signed → Returned`: the validity window and clock
//! are checked before anything is signed, and a failure at any step returns
//! an error without a URL.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, TimeDelta, Utc};
use sharelink_crypto::sas::{self, VerifyError};
use sharelink_crypto::{CryptoError, SigningCredential};
use sharelink_types::{AccessGrant, ObjectRef, Permissions};

/// Signing error type.
#[derive(Debug, thiserror::Error)]
pub enum SigningError {
    /// Validity window is zero, negative, or not representable
    #[error("invalid validity duration: {0}")]
    InvalidValidity(String),
    /// Grant would allow nothing
    #[error("permission set is empty")]
    NoPermissions,
    /// Wall clock could not be read
    #[error("clock unavailable: {0}")]
    ClockUnavailable(String),
    /// MAC computation failed
    #[error("signature computation failed: {0}")]
    Crypto(#[from] CryptoError),
}

/// Time source for issuance and verification.
pub trait Clock: Send + Sync {
    fn now(&self) -> Result<DateTime<Utc>, SigningError>;
}

/// Process wall clock.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Result<DateTime<Utc>, SigningError> {
        let elapsed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| SigningError::ClockUnavailable(e.to_string()))?;
        let secs = i64::try_from(elapsed.as_secs())
            .map_err(|e| SigningError::ClockUnavailable(e.to_string()))?;
        DateTime::from_timestamp(secs, elapsed.subsec_nanos())
            .ok_or_else(|| SigningError::ClockUnavailable("timestamp out of range".to_string()))
    }
}

/// A freshly minted signed URL and the grant it carries.
#[derive(Debug, Clone)]
pub struct SignedUrl {
    pub url: String,
    pub grant: AccessGrant,
}

/// Mints signed URLs for objects of one storage account.
pub struct SignedUrlIssuer {
    /// Storage account identity (part of the canonical resource)
    account: String,
    /// `https://<account>.<storage-domain>` or the gateway's own `/files` prefix
    base_endpoint: String,
    credential: Arc<SigningCredential>,
    clock: Arc<dyn Clock>,
}

impl SignedUrlIssuer {
    pub fn new(
        account: impl Into<String>,
        base_endpoint: impl Into<String>,
        credential: Arc<SigningCredential>,
    ) -> Self {
        Self {
            account: account.into(),
            base_endpoint: base_endpoint.into().trim_end_matches('/').to_string(),
            credential,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replaces the time source.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn account(&self) -> &str {
        &self.account
    }

    pub fn base_endpoint(&self) -> &str {
        &self.base_endpoint
    }

    /// Current time from the configured clock.
    pub fn now(&self) -> Result<DateTime<Utc>, SigningError> {
        self.clock.now()
    }

    /// Coordinates of `container/name` in this account.
    pub fn target(&self, container: &str, name: &str) -> ObjectRef {
        ObjectRef::new(self.account.clone(), container, name)
    }

    /// Mints a signed URL for `container/name` valid from now for `validity`.
    pub fn issue(
        &self,
        container: &str,
        name: &str,
        permissions: Permissions,
        validity: TimeDelta,
    ) -> Result<SignedUrl, SigningError> {
        if validity <= TimeDelta::zero() {
            return Err(SigningError::InvalidValidity(format!(
                "must be positive, got {}s",
                validity.num_seconds()
            )));
        }
        // the window is carried with second precision
        if validity < TimeDelta::seconds(1) {
            return Err(SigningError::InvalidValidity(
                "must be at least one second".to_string(),
            ));
        }
        if permissions.is_empty() {
            return Err(SigningError::NoPermissions);
        }

        let not_before = self.clock.now()?;
        let not_after = not_before.checked_add_signed(validity).ok_or_else(|| {
            SigningError::InvalidValidity(format!("{}s overflows", validity.num_seconds()))
        })?;

        let grant = sas::sign(
            &self.credential,
            self.target(container, name),
            permissions,
            not_before,
            not_after,
        )?;
        let url = sas::signed_url(&self.base_endpoint, &grant);

        tracing::debug!(
            container = %container,
            name = %name,
            permissions = %permissions,
            not_after = %grant.not_after,
            "signed URL issued"
        );
        Ok(SignedUrl { url, grant })
    }

    /// Verifies a signed query for `container/name` at `now`.
    pub fn verify_query(
        &self,
        container: &str,
        name: &str,
        query: &str,
        now: DateTime<Utc>,
        required: Permissions,
    ) -> Result<AccessGrant, VerifyError> {
        sas::verify(
            &self.credential,
            self.target(container, name),
            query,
            now,
            required,
        )
    }

    /// Verifies a full signed URL minted against this issuer's base endpoint.
    pub fn verify_url(
        &self,
        url: &str,
        now: DateTime<Utc>,
        required: Permissions,
    ) -> Result<AccessGrant, VerifyError> {
        let (target, query) = sas::split_signed_url(&self.base_endpoint, &self.account, url)?;
        sas::verify(&self.credential, target, query, now, required)
    }
}

/// Clock pinned to a settable instant.
#[cfg(test)]
pub(crate) struct FixedClock(pub std::sync::Mutex<DateTime<Utc>>);

#[cfg(test)]
impl FixedClock {
    pub(crate) fn at(ts: DateTime<Utc>) -> Arc<Self> {
        Arc::new(Self(std::sync::Mutex::new(ts)))
    }

    pub(crate) fn advance(&self, by: TimeDelta) {
        *self.0.lock().unwrap() += by;
    }
}

#[cfg(test)]
impl Clock for FixedClock {
    fn now(&self) -> Result<DateTime<Utc>, SigningError> {
        Ok(*self.0.lock().unwrap())
    }
}
