//! Decision evaluator and snapshot plumbing
//!
//! The single authorization decision point. Every evaluation captures one
//! policy snapshot and one assignment snapshot and uses them end-to-end:
//! resolve the subject's live assignments, expand each role through the
//! implication closure, keep the assignments whose scope cascades onto the
//! requested scope, then ask the rule matcher for the verdict. Absence of
//! a matching grant is always a deny; allow is never implicit. The
//! decision is recorded in the audit trail before it is returned, so
//! "evaluated" and "logged" are atomic from the caller's perspective.

pub mod batch;

pub use batch::{BatchEntry, BatchResult};

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::audit::AuditTrail;
use crate::error::{AuthzError, Result};
use crate::matcher::{MatchRequest, RuleMatcher};
use crate::policy::{PolicyConfig, PolicySnapshot, PolicySource};
use crate::scope::ScopeId;
use crate::store::{AssignmentSnapshot, AssignmentStore, GrantOutcome, RevokeOutcome};
use crate::types::{Assignment, Decision, Effect, PermissionId, RoleId, RoleKind, SubjectId};

/// Engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Interval for periodic policy reload. `None` disables the reload
    /// task for environments that reload out-of-band.
    pub reload_interval: Option<Duration>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            reload_interval: Some(Duration::from_secs(30)),
        }
    }
}

/// A role definition plus how many subjects hold it at a scope
/// (cascading grants included).
#[derive(Debug, Clone, Serialize)]
pub struct RoleSummary {
    pub role: RoleId,
    pub kind: RoleKind,
    pub permissions: Vec<PermissionId>,
    pub subject_count: usize,
}

/// The authorization engine: policy snapshot handle, assignment store,
/// rule matcher, and audit trail.
pub struct Engine {
    policy: RwLock<Arc<PolicySnapshot>>,
    store: AssignmentStore,
    matcher: Arc<dyn RuleMatcher>,
    audit: Arc<AuditTrail>,
    config: EngineConfig,
}

impl Engine {
    /// Build an engine from a policy configuration. Configuration errors
    /// (implication cycles, undefined references) are fatal here.
    pub fn new(
        config: PolicyConfig,
        matcher: Arc<dyn RuleMatcher>,
        engine_config: EngineConfig,
    ) -> Result<Self> {
        let snapshot = PolicySnapshot::build(&config, 1)?;
        info!(
            version = snapshot.version,
            roles = snapshot.roles().len(),
            "policy snapshot loaded"
        );

        Ok(Self {
            policy: RwLock::new(Arc::new(snapshot)),
            store: AssignmentStore::new(),
            matcher,
            audit: Arc::new(AuditTrail::new()),
            config: engine_config,
        })
    }

    /// The currently active policy snapshot.
    pub async fn policy(&self) -> Arc<PolicySnapshot> {
        Arc::clone(&*self.policy.read().await)
    }

    /// The audit trail backing this engine.
    pub fn audit(&self) -> Arc<AuditTrail> {
        Arc::clone(&self.audit)
    }

    /// The currently active assignment snapshot.
    pub(crate) async fn assignment_snapshot(&self) -> Arc<AssignmentSnapshot> {
        self.store.snapshot().await
    }

    /// Rebuild the policy snapshot from a fresh configuration and swap it
    /// in atomically. In-flight evaluations keep the snapshot they
    /// captured; new evaluations see the new one.
    pub async fn reload(&self, config: PolicyConfig) -> Result<()> {
        let next_version = self.policy.read().await.version + 1;
        let snapshot = PolicySnapshot::build(&config, next_version)?;
        *self.policy.write().await = Arc::new(snapshot);
        info!(version = next_version, "policy snapshot reloaded");
        Ok(())
    }

    /// Start the periodic reload task, if the configuration enables one.
    ///
    /// A failing load or rebuild keeps the active snapshot and logs the
    /// failure; the task never swaps in a broken configuration.
    pub fn spawn_reloader(
        self: Arc<Self>,
        source: Arc<dyn PolicySource>,
    ) -> Option<tokio::task::JoinHandle<()>> {
        let interval = self.config.reload_interval?;
        let engine = self;
        info!(
            interval_secs = interval.as_secs(),
            "periodic policy reload enabled"
        );

        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately; the snapshot was just
            // built, so skip it.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match source.load() {
                    Ok(config) => {
                        if let Err(e) = engine.reload(config).await {
                            warn!(error = %e, "policy reload failed; keeping active snapshot");
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "policy source unavailable; keeping active snapshot");
                    }
                }
            }
        }))
    }

    // ------------------------------------------------------------------
    // Administrative operations (assignment store wrappers)
    // ------------------------------------------------------------------

    /// Grant a role to a subject at a scope.
    pub async fn grant(
        &self,
        subject: &str,
        role: &str,
        scope: &str,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<Assignment> {
        let scope = parse_scope(scope)?;
        let policy = self.policy().await;
        self.store
            .grant(
                &policy,
                SubjectId::new(subject),
                RoleId::new(role),
                scope,
                expires_at,
            )
            .await
    }

    /// Grant the same role and scope to several subjects, reporting which
    /// grants created a new assignment.
    pub async fn grant_many(
        &self,
        subjects: &[&str],
        role: &str,
        scope: &str,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<Vec<GrantOutcome>> {
        let scope = parse_scope(scope)?;
        let subjects: Vec<SubjectId> = subjects.iter().map(|s| SubjectId::new(*s)).collect();
        let policy = self.policy().await;
        self.store
            .grant_many(&policy, &subjects, RoleId::new(role), scope, expires_at)
            .await
    }

    /// Revoke a role from a subject at a scope. Returns whether an
    /// assignment was actually removed; revoking a missing assignment is
    /// a no-op.
    pub async fn revoke(&self, subject: &str, role: &str, scope: &str) -> Result<bool> {
        let scope = parse_scope(scope)?;
        Ok(self
            .store
            .revoke(&SubjectId::new(subject), &RoleId::new(role), &scope)
            .await)
    }

    /// Revoke the same role and scope from several subjects.
    pub async fn revoke_many(
        &self,
        subjects: &[&str],
        role: &str,
        scope: &str,
    ) -> Result<Vec<RevokeOutcome>> {
        let scope = parse_scope(scope)?;
        let subjects: Vec<SubjectId> = subjects.iter().map(|s| SubjectId::new(*s)).collect();
        Ok(self
            .store
            .revoke_many(&subjects, &RoleId::new(role), &scope)
            .await)
    }

    /// Live assignments for a subject.
    pub async fn assignments_for(&self, subject: &str) -> Vec<Assignment> {
        let snapshot = self.store.snapshot().await;
        snapshot.assignments_for(&SubjectId::new(subject), Utc::now())
    }

    /// Subjects holding a role at a scope, optionally counting grants
    /// made at ancestor scopes.
    pub async fn subjects_for(
        &self,
        role: &str,
        scope: &str,
        cascading: bool,
    ) -> Result<HashSet<SubjectId>> {
        let scope = parse_scope(scope)?;
        let policy = self.policy().await;
        let snapshot = self.store.snapshot().await;
        Ok(snapshot.subjects_for(
            &RoleId::new(role),
            &scope,
            &policy.hierarchy,
            cascading,
            Utc::now(),
        ))
    }

    /// Every role definition with its permission list and the number of
    /// subjects holding it at the given scope.
    pub async fn role_summaries(&self, scope: &str) -> Result<Vec<RoleSummary>> {
        let scope = parse_scope(scope)?;
        let policy = self.policy().await;
        let snapshot = self.store.snapshot().await;
        let now = Utc::now();

        Ok(policy
            .roles()
            .into_iter()
            .map(|role| RoleSummary {
                role: role.id.clone(),
                kind: role.kind,
                permissions: role.permissions.clone(),
                subject_count: snapshot
                    .subjects_for(&role.id, &scope, &policy.hierarchy, true, now)
                    .len(),
            })
            .collect())
    }

    /// Reclaim storage held by expired assignments.
    pub async fn purge_expired(&self) -> usize {
        self.store.purge_expired().await
    }

    // ------------------------------------------------------------------
    // Evaluation
    // ------------------------------------------------------------------

    /// Evaluate one (action, scope) check for a subject.
    ///
    /// Malformed identifiers are validation errors, not deny decisions;
    /// the caller can always distinguish "denied" from "invalid request".
    /// A missing scope means the root scope. Unknown-but-well-formed
    /// actions and scopes evaluate to deny.
    pub async fn authorize(
        &self,
        subject: &SubjectId,
        action: &str,
        scope: Option<&str>,
    ) -> Result<Decision> {
        let permission = PermissionId::parse(action)?;
        let scope = match scope {
            Some(raw) => parse_scope(raw)?,
            None => ScopeId::root(),
        };

        let policy = self.policy().await;
        let assignments = self.store.snapshot().await;
        self.evaluate(&policy, &assignments, subject, &permission, &scope)
            .await
    }

    /// Core evaluation against captured snapshots. Used directly by the
    /// batch processor so one batch sees one consistent view.
    pub(crate) async fn evaluate(
        &self,
        policy: &PolicySnapshot,
        assignments: &AssignmentSnapshot,
        subject: &SubjectId,
        permission: &PermissionId,
        scope: &ScopeId,
    ) -> Result<Decision> {
        let now = Utc::now();
        let live = assignments.assignments_for(subject, now);

        let mut granted: HashSet<PermissionId> = HashSet::new();
        let mut matched_roles: Vec<RoleId> = Vec::new();
        let mut matched_scope: Option<ScopeId> = None;

        for assignment in &live {
            if !policy.hierarchy.applies(&assignment.scope, scope) {
                continue;
            }
            let Some(role) = policy.role(&assignment.role) else {
                // The role disappeared in a reload; the grant is inert
                // until it is revoked or the role returns.
                warn!(
                    role = %assignment.role,
                    "assignment references a role absent from the active snapshot"
                );
                continue;
            };

            let mut satisfied = false;
            for role_permission in &role.permissions {
                let closure = policy.graph.closure(role_permission);
                if closure.contains(permission) {
                    satisfied = true;
                }
                granted.extend(closure.iter().cloned());
            }

            if satisfied {
                if !matched_roles.contains(&assignment.role) {
                    matched_roles.push(assignment.role.clone());
                }
                if matched_scope.is_none() {
                    matched_scope = Some(assignment.scope.clone());
                }
            }
        }

        let allowed = self
            .matcher
            .evaluate(&MatchRequest {
                subject,
                permission,
                scope,
                granted: &granted,
            })
            .await?;

        let effect = if allowed { Effect::Allow } else { Effect::Deny };
        let decision = Decision::new(
            subject.clone(),
            permission.clone(),
            scope.clone(),
            effect,
            matched_roles,
            matched_scope,
            policy.version,
        );

        // Synchronous: a decision is never returned without its record.
        self.audit.record(&decision).await?;

        debug!(
            subject = %subject.namespaced_key(),
            action = %permission.namespaced_key(),
            scope = %scope.namespaced_key(),
            allowed,
            policy_version = policy.version,
            "authorization decision"
        );

        Ok(decision)
    }
}

fn parse_scope(raw: &str) -> Result<ScopeId> {
    ScopeId::parse(raw).map_err(|e| AuthzError::Validation(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::AllowListMatcher;

    fn engine() -> Engine {
        Engine::new(
            PolicyConfig::builtin(),
            Arc::new(AllowListMatcher::new()),
            EngineConfig::default(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_engine_creation() {
        let engine = engine();
        let policy = engine.policy().await;
        assert_eq!(policy.version, 1);
        assert_eq!(policy.roles().len(), 4);
    }

    #[tokio::test]
    async fn test_reload_bumps_version() {
        let engine = engine();
        engine.reload(PolicyConfig::builtin()).await.unwrap();
        assert_eq!(engine.policy().await.version, 2);
    }

    #[tokio::test]
    async fn test_reload_rejects_broken_config_and_keeps_snapshot() {
        let engine = engine();
        let mut broken = PolicyConfig::builtin();
        broken.roles.push(crate::policy::RoleConfig {
            name: "broken".to_string(),
            kind: RoleKind::Custom,
            permissions: vec!["no.such_permission".to_string()],
        });

        assert!(engine.reload(broken).await.is_err());
        assert_eq!(engine.policy().await.version, 1);
    }

    #[tokio::test]
    async fn test_malformed_action_is_validation_error() {
        let engine = engine();
        let result = engine
            .authorize(&SubjectId::new("alice"), "Not A Permission!", None)
            .await;
        assert!(matches!(result, Err(AuthzError::Validation(_))));
        // Nothing was evaluated, so nothing was recorded.
        assert!(engine.audit().is_empty().await);
    }
}
