//! # Signed URL codec
//!
//! Canonical signing string, query encoding and verification of access
//! grants. The layout follows the blob service SAS format (signed version
//! [`SIGNED_VERSION`]), so URLs minted here validate against that backend and
//! against the gateway's own verifying proxy alike.
//!
//! ## Canonical signing string
//! Sixteen fields joined by `\n`, no trailing newline:
//!
//! | # | field | value |
//! |---|-------|-------|
//! | 1 | permissions | `racwd` subset, e.g. `r` |
//! | 2 | start | `YYYY-MM-DDThh:mm:ssZ` |
//! | 3 | expiry | `YYYY-MM-DDThh:mm:ssZ` |
//! | 4 | canonical resource | `/blob/<account>/<container>/<name>` |
//! | 5 | signed identifier | empty |
//! | 6 | signed IP | empty |
//! | 7 | signed protocol | `https` |
//! | 8 | signed version | `2022-11-02` |
//! | 9 | signed resource | `b` |
//! | 10 | snapshot time | empty |
//! | 11 | encryption scope | empty |
//! | 12-16 | response header overrides | empty |
//!
//! ## Query
//! `sp`, `st`, `se`, `spr`, `sv`, `sr`, `sig`, in that order, each value
//! percent-encoded.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDateTime, Utc};
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use sharelink_types::{AccessGrant, ObjectRef, Permissions};

use crate::{CryptoError, SigningCredential};

/// Signed version written to `sv`.
pub const SIGNED_VERSION: &str = "2022-11-02";
/// Signed protocol written to `spr`.
pub const SIGNED_PROTOCOL: &str = "https";
/// Signed resource type written to `sr` (a single blob).
pub const SIGNED_RESOURCE_BLOB: &str = "b";

/// Timestamp layout for `st` / `se`.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Unreserved characters (RFC 3986) stay literal in query values.
const QUERY_VALUE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Same as [`QUERY_VALUE`] but keeps `/` so object names map to path segments.
const PATH: &AsciiSet = &QUERY_VALUE.remove(b'/');

/// Grant verification error.
#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    /// Query is missing a field or a field cannot be parsed
    #[error("malformed signed query: {0}")]
    Malformed(String),
    /// Fixed field (`sv`, `spr`, `sr`) carries a value this codec never issues
    #[error("unsupported signed field {field}={value}")]
    Unsupported { field: &'static str, value: String },
    /// Presented signature does not match the canonical fields
    #[error("signature does not match")]
    SignatureMismatch,
    /// `now` is before the start of the window
    #[error("grant is not valid before {0}")]
    NotYetValid(DateTime<Utc>),
    /// `now` is at or after the end of the window
    #[error("grant expired at {0}")]
    Expired(DateTime<Utc>),
    /// Grant lacks a required permission
    #[error("grant permissions `{granted}` do not include `{required}`")]
    PermissionDenied { granted: String, required: String },
    /// Signature computation failed
    #[error(transparent)]
    Crypto(CryptoError),
}

/// Renders a timestamp in the wire layout. Sub-second precision is dropped.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Parses a timestamp in the wire layout.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

/// Percent-encodes a query value.
pub fn encode_query_value(value: &str) -> String {
    utf8_percent_encode(value, QUERY_VALUE).to_string()
}

/// Percent-encodes an object name for use in a URL path, keeping `/`.
pub fn encode_object_path(name: &str) -> String {
    utf8_percent_encode(name, PATH).to_string()
}

/// `/blob/<account>/<container>/<name>`
pub fn canonical_resource(target: &ObjectRef) -> String {
    format!("/blob/{}/{}/{}", target.account, target.container, target.name)
}

/// Builds the canonical signing string.
pub fn string_to_sign(
    target: &ObjectRef,
    permissions: Permissions,
    not_before: &DateTime<Utc>,
    not_after: &DateTime<Utc>,
) -> String {
    let permissions = permissions.to_string();
    let start = format_timestamp(not_before);
    let expiry = format_timestamp(not_after);
    let resource = canonical_resource(target);
    [
        permissions.as_str(),
        start.as_str(),
        expiry.as_str(),
        resource.as_str(),
        "", // signed identifier
        "", // signed IP
        SIGNED_PROTOCOL,
        SIGNED_VERSION,
        SIGNED_RESOURCE_BLOB,
        "", // snapshot time
        "", // encryption scope
        "", // rscc
        "", // rscd
        "", // rsce
        "", // rscl
        "", // rsct
    ]
    .join("\n")
}

/// Signs a grant. The window is truncated to whole seconds so the signed
/// values equal the ones carried in the query.
pub fn sign(
    credential: &SigningCredential,
    target: ObjectRef,
    permissions: Permissions,
    not_before: DateTime<Utc>,
    not_after: DateTime<Utc>,
) -> Result<AccessGrant, CryptoError> {
    let not_before = truncate_to_seconds(not_before);
    let not_after = truncate_to_seconds(not_after);
    let to_sign = string_to_sign(&target, permissions, &not_before, &not_after);
    let signature = credential.sign(to_sign.as_bytes())?;
    Ok(AccessGrant {
        target,
        permissions,
        not_before,
        not_after,
        signature,
    })
}

fn truncate_to_seconds(ts: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp(ts.timestamp(), 0).unwrap_or(ts)
}

/// Encodes the grant fields as a query string (no leading `?`).
pub fn encode_query(grant: &AccessGrant) -> String {
    let fields = [
        ("sp", grant.permissions.to_string()),
        ("st", format_timestamp(&grant.not_before)),
        ("se", format_timestamp(&grant.not_after)),
        ("spr", SIGNED_PROTOCOL.to_string()),
        ("sv", SIGNED_VERSION.to_string()),
        ("sr", SIGNED_RESOURCE_BLOB.to_string()),
        ("sig", grant.signature.clone()),
    ];
    fields
        .iter()
        .map(|(k, v)| format!("{k}={}", encode_query_value(v)))
        .collect::<Vec<_>>()
        .join("&")
}

/// `<base>/<container>/<name>?<query>`
pub fn signed_url(base_endpoint: &str, grant: &AccessGrant) -> String {
    format!(
        "{}/{}/{}?{}",
        base_endpoint.trim_end_matches('/'),
        encode_object_path(&grant.target.container),
        encode_object_path(&grant.target.name),
        encode_query(grant)
    )
}

/// Decodes the grant fields of a signed query for `target`.
///
/// Unknown parameters are ignored; the backend appends its own (`comp`,
/// `blockid`, ...) to signed URLs. Duplicate signed fields are rejected.
pub fn decode_query(target: ObjectRef, query: &str) -> Result<AccessGrant, VerifyError> {
    let mut fields: HashMap<&str, String> = HashMap::new();
    for pair in query.trim_start_matches('?').split('&').filter(|p| !p.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        if !matches!(key, "sp" | "st" | "se" | "spr" | "sv" | "sr" | "sig") {
            continue;
        }
        let value = percent_decode_str(value)
            .decode_utf8()
            .map_err(|_| VerifyError::Malformed(format!("{key} is not valid UTF-8")))?
            .into_owned();
        if fields.insert(key, value).is_some() {
            return Err(VerifyError::Malformed(format!("duplicate field {key}")));
        }
    }

    let mut take = |key: &'static str| {
        fields
            .remove(key)
            .ok_or_else(|| VerifyError::Malformed(format!("missing field {key}")))
    };

    let sp = take("sp")?;
    let st = take("st")?;
    let se = take("se")?;
    let spr = take("spr")?;
    let sv = take("sv")?;
    let sr = take("sr")?;
    let signature = take("sig")?;

    for (field, value, expected) in [
        ("sv", sv, SIGNED_VERSION),
        ("spr", spr, SIGNED_PROTOCOL),
        ("sr", sr, SIGNED_RESOURCE_BLOB),
    ] {
        if value != expected {
            return Err(VerifyError::Unsupported { field, value });
        }
    }

    let permissions = Permissions::parse(&sp)
        .ok_or_else(|| VerifyError::Malformed(format!("invalid permissions {sp:?}")))?;
    let not_before = parse_timestamp(&st)
        .ok_or_else(|| VerifyError::Malformed(format!("invalid start time {st:?}")))?;
    let not_after = parse_timestamp(&se)
        .ok_or_else(|| VerifyError::Malformed(format!("invalid expiry time {se:?}")))?;

    Ok(AccessGrant {
        target,
        permissions,
        not_before,
        not_after,
        signature,
    })
}

/// Checks the signature of a decoded grant, its window against `now`, and
/// that it carries `required`.
pub fn verify_grant(
    credential: &SigningCredential,
    grant: &AccessGrant,
    now: DateTime<Utc>,
    required: Permissions,
) -> Result<(), VerifyError> {
    let to_sign = string_to_sign(
        &grant.target,
        grant.permissions,
        &grant.not_before,
        &grant.not_after,
    );
    credential
        .verify(to_sign.as_bytes(), &grant.signature)
        .map_err(|e| match e {
            CryptoError::SignatureMismatch | CryptoError::SignatureEncoding => {
                VerifyError::SignatureMismatch
            }
            other => VerifyError::Crypto(other),
        })?;

    if !grant.is_valid_at(now) {
        return Err(if now < grant.not_before {
            VerifyError::NotYetValid(grant.not_before)
        } else {
            VerifyError::Expired(grant.not_after)
        });
    }
    if !grant.permissions.contains(required) {
        return Err(VerifyError::PermissionDenied {
            granted: grant.permissions.to_string(),
            required: required.to_string(),
        });
    }
    Ok(())
}

/// Decodes and verifies a signed query for `target`.
pub fn verify(
    credential: &SigningCredential,
    target: ObjectRef,
    query: &str,
    now: DateTime<Utc>,
    required: Permissions,
) -> Result<AccessGrant, VerifyError> {
    let grant = decode_query(target, query)?;
    verify_grant(credential, &grant, now, required)?;
    Ok(grant)
}

/// Splits `<base>/<container>/<name>?<query>` into target coordinates and the
/// query. `account` is not part of the URL path and is supplied by the caller.
pub fn split_signed_url<'a>(
    base_endpoint: &str,
    account: &str,
    url: &'a str,
) -> Result<(ObjectRef, &'a str), VerifyError> {
    let base = base_endpoint.trim_end_matches('/');
    let rest = url
        .strip_prefix(base)
        .and_then(|r| r.strip_prefix('/'))
        .ok_or_else(|| VerifyError::Malformed(format!("URL does not start with {base}/")))?;
    let (path, query) = rest
        .split_once('?')
        .ok_or_else(|| VerifyError::Malformed("URL has no query".to_string()))?;
    let (container, name) = path
        .split_once('/')
        .filter(|(c, n)| !c.is_empty() && !n.is_empty())
        .ok_or_else(|| VerifyError::Malformed("URL path lacks container or name".to_string()))?;
    let decode = |s: &str| {
        percent_decode_str(s)
            .decode_utf8()
            .map(|c| c.into_owned())
            .map_err(|_| VerifyError::Malformed("URL path is not valid UTF-8".to_string()))
    };
    Ok((ObjectRef::new(account, decode(container)?, decode(name)?), query))
}
