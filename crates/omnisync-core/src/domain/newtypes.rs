//! Domain newtypes with validation
//!
//! Strongly-typed wrappers for domain identifiers and values. Each newtype
//! ensures data validity at construction time so the rest of the codebase
//! never handles empty keys or malformed task names.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::errors::DomainError;

// ============================================================================
// ItemKey
// ============================================================================

/// Side-independent identity of a synchronizable item.
///
/// For folder trees this is the `/`-normalized relative path; for record
/// stores (calendars, contact lists) it is whatever cross-side mapping the
/// connector maintains. Keys are opaque to the engine beyond equality and
/// ordering.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemKey(String);

impl ItemKey {
    /// Create a new key, rejecting empty strings.
    pub fn new(key: impl Into<String>) -> Result<Self, DomainError> {
        let key = key.into();
        if key.is_empty() {
            return Err(DomainError::InvalidKey("key must not be empty".into()));
        }
        Ok(Self(key))
    }

    /// The key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ItemKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ItemKey {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

// ============================================================================
// Fingerprint
// ============================================================================

/// Opaque change token for one item version.
///
/// A content hash or a backend-supplied version tag; the engine only ever
/// compares fingerprints for equality, it never interprets them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Create a new fingerprint, rejecting empty tokens.
    pub fn new(token: impl Into<String>) -> Result<Self, DomainError> {
        let token = token.into();
        if token.is_empty() {
            return Err(DomainError::InvalidFingerprint(
                "fingerprint must not be empty".into(),
            ));
        }
        Ok(Self(token))
    }

    /// The token as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Fingerprint {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// TaskId
// ============================================================================

/// Identifier for a configured sync task.
///
/// Task ids come from user configuration and double as state-file names,
/// so the allowed alphabet is restricted to `[A-Za-z0-9._-]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    /// Create a new task id, validating the allowed alphabet.
    pub fn new(id: impl Into<String>) -> Result<Self, DomainError> {
        let id = id.into();
        if id.is_empty() {
            return Err(DomainError::InvalidTaskId("task id must not be empty".into()));
        }
        if !id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        {
            return Err(DomainError::InvalidTaskId(format!(
                "task id '{id}' contains characters outside [A-Za-z0-9._-]"
            )));
        }
        Ok(Self(id))
    }

    /// The id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for TaskId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TaskId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}
