//! Assignment store
//!
//! Maps subjects to their (role, scope, expiry) grants, with the reverse
//! "who holds this role here" query. Reads run against an immutable
//! [`AssignmentSnapshot`] behind an atomic-swap handle; `grant` and
//! `revoke` clone the current snapshot, modify the clone, and swap it in,
//! so mutations never block readers and an in-flight evaluation keeps one
//! consistent view end-to-end.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{AuthzError, Result};
use crate::policy::PolicySnapshot;
use crate::scope::{ScopeHierarchy, ScopeId};
use crate::types::{Assignment, RoleId, SubjectId};

/// Outcome of one grant inside a batch: `created` is false when the
/// subject already held the role at that scope and the grant only
/// refreshed the existing assignment.
#[derive(Debug, Clone)]
pub struct GrantOutcome {
    pub subject: SubjectId,
    pub created: bool,
}

/// Outcome of one revoke inside a batch: `removed` is false when there
/// was nothing to revoke.
#[derive(Debug, Clone)]
pub struct RevokeOutcome {
    pub subject: SubjectId,
    pub removed: bool,
}

/// Immutable view of all assignments at one version.
#[derive(Debug, Default, Clone)]
pub struct AssignmentSnapshot {
    pub version: u64,
    by_subject: HashMap<SubjectId, Vec<Assignment>>,
}

impl AssignmentSnapshot {
    /// All live (non-expired) assignments for a subject. Expiry is
    /// checked lazily on read; expired entries stay in storage until
    /// [`AssignmentStore::purge_expired`] reclaims them.
    pub fn assignments_for(&self, subject: &SubjectId, now: DateTime<Utc>) -> Vec<Assignment> {
        self.by_subject
            .get(subject)
            .map(|assignments| {
                assignments
                    .iter()
                    .filter(|a| a.is_live(now))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Subjects holding `role` at `scope`.
    ///
    /// With `cascading` set, an assignment at an ancestor scope also
    /// counts. A subject holding the role via several overlapping scopes
    /// is counted once.
    pub fn subjects_for(
        &self,
        role: &RoleId,
        scope: &ScopeId,
        hierarchy: &ScopeHierarchy,
        cascading: bool,
        now: DateTime<Utc>,
    ) -> HashSet<SubjectId> {
        let mut subjects = HashSet::new();
        for assignments in self.by_subject.values() {
            for assignment in assignments {
                if assignment.role != *role || !assignment.is_live(now) {
                    continue;
                }
                let matches = if cascading {
                    hierarchy.applies(&assignment.scope, scope)
                } else {
                    assignment.scope == *scope
                };
                if matches {
                    subjects.insert(assignment.subject.clone());
                    break;
                }
            }
        }
        subjects
    }

    /// Total number of stored assignments, expired ones included.
    pub fn len(&self) -> usize {
        self.by_subject.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The writable store. All reads go through [`snapshot`](Self::snapshot).
#[derive(Debug, Default)]
pub struct AssignmentStore {
    current: RwLock<Arc<AssignmentSnapshot>>,
}

impl AssignmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The currently active snapshot.
    pub async fn snapshot(&self) -> Arc<AssignmentSnapshot> {
        Arc::clone(&*self.current.read().await)
    }

    /// Grant a role to a subject at a scope.
    ///
    /// Idempotent: granting an existing (subject, role, scope) refreshes
    /// the expiry when one is supplied and otherwise leaves the assignment
    /// untouched. The role must exist in the policy snapshot and the scope
    /// must be registered in the hierarchy; anything else rejects only
    /// this grant.
    pub async fn grant(
        &self,
        policy: &PolicySnapshot,
        subject: SubjectId,
        role: RoleId,
        scope: ScopeId,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<Assignment> {
        let (assignment, _) = self
            .grant_inner(policy, subject, role, scope, expires_at)
            .await?;
        Ok(assignment)
    }

    async fn grant_inner(
        &self,
        policy: &PolicySnapshot,
        subject: SubjectId,
        role: RoleId,
        scope: ScopeId,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<(Assignment, bool)> {
        if policy.role(&role).is_none() {
            return Err(AuthzError::Config(format!(
                "cannot grant unknown role '{role}'"
            )));
        }
        if !policy.hierarchy.contains(&scope) {
            return Err(AuthzError::Config(format!(
                "cannot grant at unregistered scope '{scope}'"
            )));
        }

        let mut current = self.current.write().await;
        let mut next = (**current).clone();
        next.version += 1;

        let assignments = next.by_subject.entry(subject.clone()).or_default();
        let existing = assignments
            .iter_mut()
            .find(|a| a.role == role && a.scope == scope);

        let (assignment, created) = match existing {
            Some(assignment) => {
                if expires_at.is_some() {
                    assignment.expires_at = expires_at;
                }
                (assignment.clone(), false)
            }
            None => {
                let assignment = Assignment {
                    subject: subject.clone(),
                    role: role.clone(),
                    scope: scope.clone(),
                    expires_at,
                    granted_at: Utc::now(),
                };
                assignments.push(assignment.clone());
                (assignment, true)
            }
        };

        debug!(
            subject = %subject.namespaced_key(),
            role = %role.namespaced_key(),
            scope = %scope.namespaced_key(),
            created,
            "assignment granted"
        );

        *current = Arc::new(next);
        Ok((assignment, created))
    }

    /// Grant the same role and scope to several subjects.
    pub async fn grant_many(
        &self,
        policy: &PolicySnapshot,
        subjects: &[SubjectId],
        role: RoleId,
        scope: ScopeId,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<Vec<GrantOutcome>> {
        let mut outcomes = Vec::with_capacity(subjects.len());
        for subject in subjects {
            let (_, created) = self
                .grant_inner(
                    policy,
                    subject.clone(),
                    role.clone(),
                    scope.clone(),
                    expires_at,
                )
                .await?;
            outcomes.push(GrantOutcome {
                subject: subject.clone(),
                created,
            });
        }
        Ok(outcomes)
    }

    /// Remove an assignment. Revoking one that does not exist is a no-op,
    /// not an error; the return value reports whether anything was removed.
    pub async fn revoke(&self, subject: &SubjectId, role: &RoleId, scope: &ScopeId) -> bool {
        let mut current = self.current.write().await;
        let mut next = (**current).clone();

        let removed = match next.by_subject.get_mut(subject) {
            Some(assignments) => {
                let before = assignments.len();
                assignments.retain(|a| !(a.role == *role && a.scope == *scope));
                let removed = assignments.len() < before;
                if assignments.is_empty() {
                    next.by_subject.remove(subject);
                }
                removed
            }
            None => false,
        };

        if removed {
            next.version += 1;
            debug!(
                subject = %subject.namespaced_key(),
                role = %role.namespaced_key(),
                scope = %scope.namespaced_key(),
                "assignment revoked"
            );
            *current = Arc::new(next);
        }
        removed
    }

    /// Revoke the same role and scope from several subjects.
    pub async fn revoke_many(
        &self,
        subjects: &[SubjectId],
        role: &RoleId,
        scope: &ScopeId,
    ) -> Vec<RevokeOutcome> {
        let mut outcomes = Vec::with_capacity(subjects.len());
        for subject in subjects {
            let removed = self.revoke(subject, role, scope).await;
            outcomes.push(RevokeOutcome {
                subject: subject.clone(),
                removed,
            });
        }
        outcomes
    }

    /// Drop expired assignments from storage. Reads already exclude them;
    /// this only reclaims space. Returns the number of purged entries.
    pub async fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let mut current = self.current.write().await;
        let mut next = (**current).clone();

        let before = next.len();
        next.by_subject.retain(|_, assignments| {
            assignments.retain(|a| a.is_live(now));
            !assignments.is_empty()
        });
        let purged = before - next.len();

        if purged > 0 {
            next.version += 1;
            *current = Arc::new(next);
        }
        purged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{PolicyConfig, PolicySnapshot, ScopeConfig};

    fn policy() -> PolicySnapshot {
        let mut config = PolicyConfig::builtin();
        config.scopes = vec![
            ScopeConfig {
                scope: "org:A".to_string(),
                parent: None,
            },
            ScopeConfig {
                scope: "lib:DemoX:CSPROB".to_string(),
                parent: Some("org:A".to_string()),
            },
        ];
        PolicySnapshot::build(&config, 1).unwrap()
    }

    fn scope(s: &str) -> ScopeId {
        ScopeId::parse(s).unwrap()
    }

    #[tokio::test]
    async fn test_grant_is_idempotent() {
        let policy = policy();
        let store = AssignmentStore::new();
        let alice = SubjectId::new("alice");
        let role = RoleId::new("library_author");
        let lib = scope("lib:DemoX:CSPROB");

        store
            .grant(&policy, alice.clone(), role.clone(), lib.clone(), None)
            .await
            .unwrap();
        store
            .grant(&policy, alice.clone(), role.clone(), lib.clone(), None)
            .await
            .unwrap();

        let snapshot = store.snapshot().await;
        assert_eq!(snapshot.assignments_for(&alice, Utc::now()).len(), 1);
    }

    #[tokio::test]
    async fn test_regrant_refreshes_expiry() {
        let policy = policy();
        let store = AssignmentStore::new();
        let alice = SubjectId::new("alice");
        let role = RoleId::new("library_user");
        let lib = scope("lib:DemoX:CSPROB");

        let soon = Utc::now() + chrono::Duration::hours(1);
        let later = Utc::now() + chrono::Duration::days(30);

        store
            .grant(&policy, alice.clone(), role.clone(), lib.clone(), Some(soon))
            .await
            .unwrap();
        let refreshed = store
            .grant(&policy, alice.clone(), role.clone(), lib.clone(), Some(later))
            .await
            .unwrap();

        assert_eq!(refreshed.expires_at, Some(later));
        let snapshot = store.snapshot().await;
        let live = snapshot.assignments_for(&alice, Utc::now());
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].expires_at, Some(later));
    }

    #[tokio::test]
    async fn test_grant_unknown_role_rejected() {
        let policy = policy();
        let store = AssignmentStore::new();
        let result = store
            .grant(
                &policy,
                SubjectId::new("alice"),
                RoleId::new("galactic_emperor"),
                scope("org:A"),
                None,
            )
            .await;
        assert!(matches!(result, Err(AuthzError::Config(_))));
    }

    #[tokio::test]
    async fn test_grant_unregistered_scope_rejected() {
        let policy = policy();
        let store = AssignmentStore::new();
        let result = store
            .grant(
                &policy,
                SubjectId::new("alice"),
                RoleId::new("library_user"),
                scope("org:Unknown"),
                None,
            )
            .await;
        assert!(matches!(result, Err(AuthzError::Config(_))));
    }

    #[tokio::test]
    async fn test_revoke_missing_is_noop() {
        let store = AssignmentStore::new();
        let removed = store
            .revoke(
                &SubjectId::new("alice"),
                &RoleId::new("library_user"),
                &scope("org:A"),
            )
            .await;
        assert!(!removed);
    }

    #[tokio::test]
    async fn test_expired_assignments_excluded_on_read() {
        let policy = policy();
        let store = AssignmentStore::new();
        let alice = SubjectId::new("alice");
        let past = Utc::now() - chrono::Duration::seconds(5);

        store
            .grant(
                &policy,
                alice.clone(),
                RoleId::new("library_user"),
                scope("org:A"),
                Some(past),
            )
            .await
            .unwrap();

        let snapshot = store.snapshot().await;
        assert!(snapshot.assignments_for(&alice, Utc::now()).is_empty());
        // Still in storage until purged.
        assert_eq!(snapshot.len(), 1);

        assert_eq!(store.purge_expired().await, 1);
        assert!(store.snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn test_subjects_for_cascading_without_double_count() {
        let policy = policy();
        let store = AssignmentStore::new();
        let alice = SubjectId::new("alice");
        let bob = SubjectId::new("bob");
        let role = RoleId::new("library_user");
        let org = scope("org:A");
        let lib = scope("lib:DemoX:CSPROB");

        // Alice holds the role at both the org and the library beneath it.
        store
            .grant(&policy, alice.clone(), role.clone(), org.clone(), None)
            .await
            .unwrap();
        store
            .grant(&policy, alice.clone(), role.clone(), lib.clone(), None)
            .await
            .unwrap();
        store
            .grant(&policy, bob.clone(), role.clone(), org.clone(), None)
            .await
            .unwrap();

        let snapshot = store.snapshot().await;
        let now = Utc::now();

        let cascading = snapshot.subjects_for(&role, &lib, &policy.hierarchy, true, now);
        assert_eq!(cascading.len(), 2);

        let exact = snapshot.subjects_for(&role, &lib, &policy.hierarchy, false, now);
        assert_eq!(exact.len(), 1);
        assert!(exact.contains(&alice));
    }

    #[tokio::test]
    async fn test_writes_do_not_disturb_captured_snapshots() {
        let policy = policy();
        let store = AssignmentStore::new();
        let alice = SubjectId::new("alice");

        let before = store.snapshot().await;
        store
            .grant(
                &policy,
                alice.clone(),
                RoleId::new("library_user"),
                scope("org:A"),
                None,
            )
            .await
            .unwrap();

        // The earlier snapshot is unchanged; a fresh one sees the grant.
        assert!(before.assignments_for(&alice, Utc::now()).is_empty());
        let after = store.snapshot().await;
        assert_eq!(after.assignments_for(&alice, Utc::now()).len(), 1);
        assert!(after.version > before.version);
    }

    #[tokio::test]
    async fn test_grant_many_reports_existing_assignments() {
        let policy = policy();
        let store = AssignmentStore::new();
        let alice = SubjectId::new("alice");
        let bob = SubjectId::new("bob");
        let role = RoleId::new("library_user");
        let org = scope("org:A");

        store
            .grant(&policy, alice.clone(), role.clone(), org.clone(), None)
            .await
            .unwrap();

        let outcomes = store
            .grant_many(
                &policy,
                &[alice.clone(), bob.clone()],
                role.clone(),
                org.clone(),
                None,
            )
            .await
            .unwrap();

        assert!(!outcomes[0].created);
        assert!(outcomes[1].created);

        let outcomes = store.revoke_many(&[alice, bob], &role, &org).await;
        assert!(outcomes.iter().all(|o| o.removed));
    }
}
