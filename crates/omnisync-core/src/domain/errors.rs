//! Domain error types
//!
//! Errors raised by domain-level validation: malformed identifiers,
//! invalid configuration values, and invalid state transitions.

use thiserror::Error;

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Invalid item key (empty or malformed)
    #[error("Invalid item key: {0}")]
    InvalidKey(String),

    /// Invalid fingerprint token
    #[error("Invalid fingerprint: {0}")]
    InvalidFingerprint(String),

    /// Invalid task id
    #[error("Invalid task id: {0}")]
    InvalidTaskId(String),

    /// Invalid connector reference URI
    #[error("Invalid connector reference: {0}")]
    InvalidConnectorRef(String),

    /// Invalid filter glob pattern
    #[error("Invalid filter pattern '{pattern}': {reason}")]
    InvalidPattern {
        /// The offending pattern
        pattern: String,
        /// Why it failed to compile
        reason: String,
    },

    /// Unknown conflict policy or direction name in configuration
    #[error("Unknown configuration value for {field}: '{value}'")]
    UnknownValue {
        /// Configuration field name
        field: String,
        /// The unrecognized value
        value: String,
    },

    /// Generic validation failure
    #[error("Validation failed: {0}")]
    ValidationFailed(String),
}
