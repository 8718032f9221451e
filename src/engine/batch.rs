//! Batch query processor
//!
//! Evaluates an ordered sequence of (action, scope) checks for one
//! subject. The whole batch is validated before any entry is evaluated:
//! one malformed entry (or an empty batch) fails the entire request with a
//! validation error, so the success payload never carries per-entry error
//! markers. Entries are then evaluated concurrently against a single
//! snapshot pair and collected into a pre-sized buffer indexed by input
//! position, so output order always equals input order.

use futures::future::join_all;
use serde::{Deserialize, Serialize};

use crate::error::{AuthzError, Result};
use crate::scope::ScopeId;
use crate::types::{PermissionId, SubjectId};

use super::Engine;

/// One query in a batch. A missing scope means the root scope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchEntry {
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

/// One result in a batch, echoing the entry it answers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResult {
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    pub allowed: bool,
}

impl Engine {
    /// Evaluate a batch of checks for one subject, preserving input order.
    ///
    /// Repeated (action, scope) pairs are not deduplicated; each entry
    /// produces its own result and its own audit record. Every decision
    /// recorded before a caller abandons the batch remains a permanent
    /// audit record.
    pub async fn validate_batch(
        &self,
        subject: &SubjectId,
        entries: &[BatchEntry],
    ) -> Result<Vec<BatchResult>> {
        if entries.is_empty() {
            return Err(AuthzError::Validation("batch cannot be empty".to_string()));
        }

        // Validation boundary: reject the whole request before evaluating
        // anything.
        let mut parsed: Vec<(PermissionId, ScopeId)> = Vec::with_capacity(entries.len());
        for entry in entries {
            let permission = PermissionId::parse(&entry.action)?;
            let scope = match &entry.scope {
                Some(raw) => {
                    ScopeId::parse(raw).map_err(|e| AuthzError::Validation(e.to_string()))?
                }
                None => ScopeId::root(),
            };
            parsed.push((permission, scope));
        }

        // One snapshot pair for the whole batch.
        let policy = self.policy().await;
        let assignments = self.assignment_snapshot().await;

        let evaluations = parsed.iter().enumerate().map(|(index, (permission, scope))| {
            let policy = &policy;
            let assignments = &assignments;
            async move {
                (
                    index,
                    self.evaluate(policy, assignments, subject, permission, scope)
                        .await,
                )
            }
        });

        let mut results: Vec<Option<BatchResult>> = vec![None; entries.len()];
        for (index, outcome) in join_all(evaluations).await {
            let decision = outcome?;
            results[index] = Some(BatchResult {
                action: entries[index].action.clone(),
                scope: entries[index].scope.clone(),
                allowed: decision.allowed(),
            });
        }

        results
            .into_iter()
            .enumerate()
            .map(|(index, result)| {
                result.ok_or_else(|| {
                    AuthzError::Internal(format!("missing result for batch entry {index}"))
                })
            })
            .collect()
    }
}
