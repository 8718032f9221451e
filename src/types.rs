//! Core authorization types
//!
//! Every identifier carries two string forms: the external key used at API
//! boundaries (e.g. `alice`, `content_libraries.view_library`) and the
//! namespaced key used inside the policy layer (e.g. `user^alice`,
//! `act^content_libraries.view_library`).

use std::fmt;
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AuthzError, Result};
use crate::scope::ScopeId;

/// Separator between a namespace and an external key in namespaced keys.
pub const NAMESPACE_SEPARATOR: char = '^';

fn permission_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[a-z][a-z0-9_]*(\.[a-z][a-z0-9_]*)*$").expect("valid permission pattern")
    })
}

/// Opaque identifier for the actor being authorized (typically a user id).
///
/// The core interprets no internal structure beyond the namespaced form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubjectId(String);

impl SubjectId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Namespaced form used inside the policy layer (e.g. `user^alice`).
    pub fn namespaced_key(&self) -> String {
        format!("user{}{}", NAMESPACE_SEPARATOR, self.0)
    }
}

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Atomic capability token, namespaced by feature
/// (e.g. `content_libraries.edit_library_content`).
///
/// Permission identifiers are globally unique strings. An action requested
/// at the query surface is the external key of a permission.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionId(String);

impl PermissionId {
    /// Parse and validate a permission identifier at the boundary.
    ///
    /// Accepts lowercase dot-separated segments of `[a-z0-9_]`. Anything
    /// else is a validation error, not a deny decision.
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.is_empty() {
            return Err(AuthzError::Validation(
                "permission identifier cannot be empty".to_string(),
            ));
        }
        if !permission_pattern().is_match(raw) {
            return Err(AuthzError::Validation(format!(
                "malformed permission identifier: '{raw}'"
            )));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Namespaced form (e.g. `act^content_libraries.view_library`).
    pub fn namespaced_key(&self) -> String {
        format!("act{}{}", NAMESPACE_SEPARATOR, self.0)
    }
}

impl fmt::Display for PermissionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stable role identifier (e.g. `library_author`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoleId(String);

impl RoleId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Namespaced form (e.g. `role^library_author`).
    pub fn namespaced_key(&self) -> String {
        format!("role{}{}", NAMESPACE_SEPARATOR, self.0)
    }
}

impl fmt::Display for RoleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Whether a role ships with the platform or was added by an extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleKind {
    Default,
    Custom,
}

/// A named, ordered set of permissions.
///
/// Roles are data records keyed by stable string identifiers, not a type
/// hierarchy. A role's permission set is immutable once a snapshot is
/// built; changes arrive only through a full policy reload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: RoleId,
    pub kind: RoleKind,
    pub permissions: Vec<PermissionId>,
}

impl Role {
    pub fn new(id: impl Into<String>, kind: RoleKind, permissions: Vec<PermissionId>) -> Self {
        Self {
            id: RoleId::new(id),
            kind,
            permissions,
        }
    }
}

/// Effect of an authorization decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Effect {
    Allow,
    Deny,
}

impl Effect {
    pub fn is_allow(self) -> bool {
        matches!(self, Effect::Allow)
    }
}

/// A (subject, role, scope) grant, the only writable grant primitive.
///
/// Permissions are never assigned directly to subjects. At most one
/// assignment exists per (subject, role, scope); re-granting refreshes the
/// expiry instead of duplicating.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub subject: SubjectId,
    pub role: RoleId,
    pub scope: ScopeId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    pub granted_at: DateTime<Utc>,
}

impl Assignment {
    /// Whether the assignment is live at `now`. Expired assignments are
    /// excluded from every read without an explicit cleanup step.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map_or(true, |expiry| expiry > now)
    }
}

/// The immutable result of one evaluation, the unit of audit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    /// Unique decision identifier
    pub id: String,
    pub subject: SubjectId,
    pub action: PermissionId,
    pub scope: ScopeId,
    pub effect: Effect,
    /// Roles whose expanded permission set satisfied the request.
    pub matched_roles: Vec<RoleId>,
    /// Scope of the assignment that satisfied the request, when any did.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_scope: Option<ScopeId>,
    /// Version of the policy snapshot the evaluation ran against, so the
    /// decision can be replayed against that exact configuration.
    pub policy_version: u64,
    pub timestamp: DateTime<Utc>,
}

impl Decision {
    pub fn new(
        subject: SubjectId,
        action: PermissionId,
        scope: ScopeId,
        effect: Effect,
        matched_roles: Vec<RoleId>,
        matched_scope: Option<ScopeId>,
        policy_version: u64,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            subject,
            action,
            scope,
            effect,
            matched_roles,
            matched_scope,
            policy_version,
            timestamp: Utc::now(),
        }
    }

    pub fn allowed(&self) -> bool {
        self.effect.is_allow()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_namespaced_keys() {
        let subject = SubjectId::new("john_doe");
        assert_eq!(subject.namespaced_key(), "user^john_doe");

        let role = RoleId::new("library_author");
        assert_eq!(role.namespaced_key(), "role^library_author");

        let permission = PermissionId::parse("content_libraries.view_library").unwrap();
        assert_eq!(
            permission.namespaced_key(),
            "act^content_libraries.view_library"
        );
    }

    #[test]
    fn test_permission_validation() {
        assert!(PermissionId::parse("edit_content").is_ok());
        assert!(PermissionId::parse("content_libraries.delete_library").is_ok());

        assert!(matches!(
            PermissionId::parse(""),
            Err(AuthzError::Validation(_))
        ));
        assert!(matches!(
            PermissionId::parse("Edit-Content"),
            Err(AuthzError::Validation(_))
        ));
        assert!(matches!(
            PermissionId::parse("edit content"),
            Err(AuthzError::Validation(_))
        ));
        assert!(matches!(
            PermissionId::parse(".leading_dot"),
            Err(AuthzError::Validation(_))
        ));
    }

    #[test]
    fn test_assignment_expiry() {
        let now = Utc::now();
        let assignment = Assignment {
            subject: SubjectId::new("alice"),
            role: RoleId::new("library_user"),
            scope: ScopeId::root(),
            expires_at: Some(now - chrono::Duration::seconds(1)),
            granted_at: now - chrono::Duration::days(1),
        };
        assert!(!assignment.is_live(now));

        let open_ended = Assignment {
            expires_at: None,
            ..assignment
        };
        assert!(open_ended.is_live(now));
    }

    #[test]
    fn test_decision_effect() {
        let decision = Decision::new(
            SubjectId::new("alice"),
            PermissionId::parse("edit_content").unwrap(),
            ScopeId::root(),
            Effect::Deny,
            vec![],
            None,
            1,
        );
        assert!(!decision.allowed());
        assert!(!decision.id.is_empty());
    }
}
