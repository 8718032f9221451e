//! External rule engine seam
//!
//! The decision evaluator owns resolution (assignments, closures, scope
//! cascading) and audit, then delegates the final allow/deny verdict to a
//! pluggable rule matcher. The in-process reference implementation is a
//! plain allow-list check over the resolved grant closure.

use std::collections::HashSet;

use async_trait::async_trait;

use crate::error::Result;
use crate::scope::ScopeId;
use crate::types::{PermissionId, SubjectId};

/// Everything the rule engine sees for one check.
#[derive(Debug)]
pub struct MatchRequest<'a> {
    pub subject: &'a SubjectId,
    pub permission: &'a PermissionId,
    pub scope: &'a ScopeId,
    /// Union of the permission closures of every role the subject holds
    /// at a scope that applies to the check scope.
    pub granted: &'a HashSet<PermissionId>,
}

/// Narrow interface to the external rule-matching engine.
///
/// Implementations must be fail-closed: any uncertainty is a deny, and an
/// error here fails the request rather than granting access.
#[async_trait]
pub trait RuleMatcher: Send + Sync {
    async fn evaluate(&self, request: &MatchRequest<'_>) -> Result<bool>;
}

/// Reference matcher: allow iff the requested permission is present in
/// the resolved grant closure.
#[derive(Debug, Default)]
pub struct AllowListMatcher;

impl AllowListMatcher {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl RuleMatcher for AllowListMatcher {
    async fn evaluate(&self, request: &MatchRequest<'_>) -> Result<bool> {
        Ok(request.granted.contains(request.permission))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_allow_list_matcher() {
        let subject = SubjectId::new("alice");
        let permission = PermissionId::parse("edit_content").unwrap();
        let scope = ScopeId::root();

        let mut granted = HashSet::new();
        granted.insert(permission.clone());

        let matcher = AllowListMatcher::new();
        let allowed = matcher
            .evaluate(&MatchRequest {
                subject: &subject,
                permission: &permission,
                scope: &scope,
                granted: &granted,
            })
            .await
            .unwrap();
        assert!(allowed);
    }

    #[tokio::test]
    async fn test_empty_grant_set_denies() {
        let subject = SubjectId::new("alice");
        let permission = PermissionId::parse("edit_content").unwrap();
        let scope = ScopeId::root();
        let granted = HashSet::new();

        let matcher = AllowListMatcher::new();
        let allowed = matcher
            .evaluate(&MatchRequest {
                subject: &subject,
                permission: &permission,
                scope: &scope,
                granted: &granted,
            })
            .await
            .unwrap();
        assert!(!allowed);
    }
}
