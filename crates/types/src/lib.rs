//! # Sharelink shared types
//!
//! Data model shared by the gateway, the signing primitives and the CLI.
//!
//! ## Encoding rules
//! - Timestamps: UTC, whole seconds, rendered as `YYYY-MM-DDThh:mm:ssZ` on the wire
//! - Signatures: Base64 (standard alphabet, padded)

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Stored objects
// ---------------------------------------------------------------------------

/// Coordinates of a stored object.
///
/// `name` is the primary key inside `container`. Uploading the same name twice
/// replaces the earlier content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectRef {
    /// Storage account that owns the container
    pub account: String,
    /// Logical bucket / namespace
    pub container: String,
    /// Object name, unique within the container
    pub name: String,
}

impl ObjectRef {
    pub fn new(
        account: impl Into<String>,
        container: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            account: account.into(),
            container: container.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.account, self.container, self.name)
    }
}

// ---------------------------------------------------------------------------
// Permissions
// ---------------------------------------------------------------------------

/// Operations a grant allows on its target.
///
/// Wire form is a string of single-letter flags in the fixed order `racwd`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Permissions {
    pub read: bool,
    pub add: bool,
    pub create: bool,
    pub write: bool,
    pub delete: bool,
}

impl Permissions {
    /// Canonical flag order.
    const ORDER: [char; 5] = ['r', 'a', 'c', 'w', 'd'];

    /// `{read}`, the permission set handed out for shared links.
    pub const fn read_only() -> Self {
        Self {
            read: true,
            add: false,
            create: false,
            write: false,
            delete: false,
        }
    }

    /// `{create, write}`, enough to upload or replace a block blob.
    pub const fn upload() -> Self {
        Self {
            read: false,
            add: false,
            create: true,
            write: true,
            delete: false,
        }
    }

    pub fn is_empty(&self) -> bool {
        !(self.read || self.add || self.create || self.write || self.delete)
    }

    /// Whether every flag set in `required` is also set here.
    pub fn contains(&self, required: Permissions) -> bool {
        (!required.read || self.read)
            && (!required.add || self.add)
            && (!required.create || self.create)
            && (!required.write || self.write)
            && (!required.delete || self.delete)
    }

    fn flag(&self, c: char) -> bool {
        match c {
            'r' => self.read,
            'a' => self.add,
            'c' => self.create,
            'w' => self.write,
            'd' => self.delete,
            _ => false,
        }
    }

    /// Parses the wire form. Flags must appear in canonical order, each at
    /// most once, so that every permission set has exactly one encoding.
    pub fn parse(s: &str) -> Option<Self> {
        let mut perms = Self::default();
        let mut order = Self::ORDER.iter();
        for c in s.chars() {
            // advance past earlier flags; a flag seen out of order is not found
            order.by_ref().find(|&&o| o == c)?;
            match c {
                'r' => perms.read = true,
                'a' => perms.add = true,
                'c' => perms.create = true,
                'w' => perms.write = true,
                'd' => perms.delete = true,
                _ => return None,
            }
        }
        Some(perms)
    }
}

impl fmt::Display for Permissions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for c in Self::ORDER {
            if self.flag(c) {
                write!(f, "{c}")?;
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Access grants
// ---------------------------------------------------------------------------

/// Time-bounded authorization for operations on one stored object.
///
/// Valid for instants in `[not_before, not_after)`. Never persisted; it lives
/// only inside the query string of a signed URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessGrant {
    /// Object the grant refers to
    pub target: ObjectRef,
    /// Allowed operations
    pub permissions: Permissions,
    /// Start of the validity window (inclusive)
    pub not_before: DateTime<Utc>,
    /// End of the validity window (exclusive)
    pub not_after: DateTime<Utc>,
    /// Base64 HMAC over the canonical signing string
    pub signature: String,
}

impl AccessGrant {
    /// Whether `now` falls inside the validity window.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.not_before <= now && now < self.not_after
    }
}

// ---------------------------------------------------------------------------
// HTTP DTOs
// ---------------------------------------------------------------------------

/// Query of `GET /link`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkQuery {
    /// Signed URL to display
    pub url: String,
}
