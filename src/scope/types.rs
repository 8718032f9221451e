//! Scope identifier parsing and validation
//!
//! A scope identifier is a colon-separated string whose first segment names
//! the scope type (e.g. `lib:DemoX:CSPROB`, `org:OpenedX`, `instance`).
//! Each type declares how many segments a well-formed identifier carries,
//! so a library or course scope missing its parameters is rejected here,
//! before it can reach the hierarchy or the evaluator.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::NAMESPACE_SEPARATOR;

/// Result type for scope operations
pub type ScopeResult<T> = Result<T, ScopeError>;

/// Errors that can occur while parsing a scope identifier
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScopeError {
    /// Empty scope string provided
    #[error("Scope cannot be empty")]
    EmptyScope,

    /// Scope segment is empty
    #[error("Scope segment cannot be empty in '{0}'")]
    EmptySegment(String),

    /// Segment contains characters outside the allowed set
    #[error("Invalid characters in scope segment '{0}'")]
    InvalidSegment(String),

    /// First segment does not name a known scope type
    #[error("Unknown scope type '{0}'")]
    UnknownNamespace(String),

    /// Identifier has the wrong number of segments for its type
    #[error("Invalid scope format: {0}")]
    InvalidFormat(String),
}

/// Known scope types: namespace, minimum and maximum segment counts
/// (including the namespace segment itself).
const SCOPE_TYPES: &[(&str, usize, usize)] = &[
    ("instance", 1, 1),
    ("org", 2, 2),
    ("course", 4, 4),
    ("lib", 3, 3),
];

/// The root scope identifier. Every other scope cascades from it.
pub const ROOT_SCOPE: &str = "instance";

fn segment_is_valid(segment: &str) -> bool {
    segment
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

/// A validated, parameterized scope identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScopeId {
    raw: String,
}

impl ScopeId {
    /// Parse and validate a scope identifier.
    ///
    /// Rejects empty strings, empty segments, unknown scope types, and
    /// identifiers missing a required parameter (e.g. a course scope
    /// without a course id).
    pub fn parse(raw: &str) -> ScopeResult<Self> {
        if raw.is_empty() {
            return Err(ScopeError::EmptyScope);
        }

        let segments: Vec<&str> = raw.split(':').collect();
        for segment in &segments {
            if segment.is_empty() {
                return Err(ScopeError::EmptySegment(raw.to_string()));
            }
            if !segment_is_valid(segment) {
                return Err(ScopeError::InvalidSegment((*segment).to_string()));
            }
        }

        let namespace = segments[0];
        let (_, min, max) = SCOPE_TYPES
            .iter()
            .find(|(ns, _, _)| *ns == namespace)
            .ok_or_else(|| ScopeError::UnknownNamespace(namespace.to_string()))?;

        if segments.len() < *min {
            return Err(ScopeError::InvalidFormat(format!(
                "'{raw}' is missing a required parameter for scope type '{namespace}'"
            )));
        }
        if segments.len() > *max {
            return Err(ScopeError::InvalidFormat(format!(
                "'{raw}' has too many segments for scope type '{namespace}'"
            )));
        }

        Ok(Self {
            raw: raw.to_string(),
        })
    }

    /// The root scope (`instance`).
    pub fn root() -> Self {
        Self {
            raw: ROOT_SCOPE.to_string(),
        }
    }

    pub fn is_root(&self) -> bool {
        self.raw == ROOT_SCOPE
    }

    /// The scope type namespace (first segment).
    pub fn namespace(&self) -> &str {
        self.raw.split(':').next().unwrap_or(&self.raw)
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Namespaced form used inside the policy layer
    /// (e.g. `lib^lib:DemoX:CSPROB`, `sc^instance` for the root).
    pub fn namespaced_key(&self) -> String {
        if self.is_root() {
            format!("sc{}{}", NAMESPACE_SEPARATOR, self.raw)
        } else {
            format!("{}{}{}", self.namespace(), NAMESPACE_SEPARATOR, self.raw)
        }
    }
}

impl FromStr for ScopeId {
    type Err = ScopeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_scopes() {
        assert!(ScopeId::parse("instance").is_ok());
        assert!(ScopeId::parse("org:OpenedX").is_ok());
        assert!(ScopeId::parse("lib:DemoX:CSPROB").is_ok());
        assert!(ScopeId::parse("course:org:A:CS101").is_ok());
    }

    #[test]
    fn test_empty_scope() {
        assert_eq!(ScopeId::parse(""), Err(ScopeError::EmptyScope));
    }

    #[test]
    fn test_empty_segment() {
        assert!(matches!(
            ScopeId::parse("lib::CSPROB"),
            Err(ScopeError::EmptySegment(_))
        ));
    }

    #[test]
    fn test_unknown_namespace() {
        assert!(matches!(
            ScopeId::parse("planet:Earth"),
            Err(ScopeError::UnknownNamespace(_))
        ));
    }

    #[test]
    fn test_missing_parameter() {
        // A library scope without its library id is malformed.
        assert!(matches!(
            ScopeId::parse("lib:DemoX"),
            Err(ScopeError::InvalidFormat(_))
        ));
        assert!(matches!(
            ScopeId::parse("org"),
            Err(ScopeError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_too_many_segments() {
        assert!(matches!(
            ScopeId::parse("org:A:B"),
            Err(ScopeError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_invalid_characters() {
        assert!(matches!(
            ScopeId::parse("lib:Demo X:CSPROB"),
            Err(ScopeError::InvalidSegment(_))
        ));
    }

    #[test]
    fn test_root() {
        let root = ScopeId::root();
        assert!(root.is_root());
        assert_eq!(root.as_str(), "instance");
        assert!(!ScopeId::parse("org:A").unwrap().is_root());
    }

    #[test]
    fn test_namespaced_keys() {
        let lib = ScopeId::parse("lib:DemoX:CSPROB").unwrap();
        assert_eq!(lib.namespaced_key(), "lib^lib:DemoX:CSPROB");
        assert_eq!(lib.namespace(), "lib");

        assert_eq!(ScopeId::root().namespaced_key(), "sc^instance");
    }
}
