//! Error types for the authorization engine

use thiserror::Error;

/// Authorization engine errors
#[derive(Debug, Error)]
pub enum AuthzError {
    /// Malformed input rejected before evaluation. A validation error is
    /// never coerced into a deny decision.
    #[error("Invalid input: {0}")]
    Validation(String),

    /// Caller identity missing or invalid.
    #[error("Caller is not authenticated")]
    Unauthenticated,

    /// Invalid policy configuration (cyclic implication graph, unknown
    /// scope/role, duplicate definitions). Fatal at load time; at grant
    /// time it rejects only the offending assignment.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// The external rule matcher failed to produce a verdict.
    #[error("Rule matcher failed: {0}")]
    Matcher(String),

    /// Audit trail failure.
    #[error("Audit trail error: {0}")]
    Audit(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for authorization operations
pub type Result<T> = std::result::Result<T, AuthzError>;
