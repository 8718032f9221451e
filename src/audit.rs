//! Audit trace recorder
//!
//! Append-only log of every decision the evaluator produces. Records are
//! immutable; there is no update or delete operation, and the trail never
//! silently drops an entry. Corrections are new records (a later revoke
//! produces its own trail through the assignment store). Retrieval is
//! paginated through a restartable cursor so audit review never loads the
//! whole history at once.

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::Result;
use crate::types::{Decision, SubjectId};

const DEFAULT_PAGE_SIZE: usize = 100;

/// Number of retained records after which every append raises an alert.
/// Entries are still appended; trimming the trail is an operator action,
/// never something the recorder does on its own.
const ALERT_WATERMARK: usize = 100_000;

/// Query over the trail: one subject, an optional time window
/// (`from` inclusive, `until` exclusive).
#[derive(Debug, Clone)]
pub struct AuditQuery {
    pub subject: SubjectId,
    pub from: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub page_size: usize,
}

impl AuditQuery {
    pub fn for_subject(subject: SubjectId) -> Self {
        Self {
            subject,
            from: None,
            until: None,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn between(mut self, from: DateTime<Utc>, until: DateTime<Utc>) -> Self {
        self.from = Some(from);
        self.until = Some(until);
        self
    }

    pub fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    fn matches(&self, decision: &Decision) -> bool {
        if decision.subject != self.subject {
            return false;
        }
        if let Some(from) = self.from {
            if decision.timestamp < from {
                return false;
            }
        }
        if let Some(until) = self.until {
            if decision.timestamp >= until {
                return false;
            }
        }
        true
    }
}

/// One page of decisions plus the cursor for the next page.
/// A `None` cursor means the trail is exhausted for this query.
#[derive(Debug, Clone)]
pub struct AuditPage {
    pub decisions: Vec<Decision>,
    pub cursor: Option<u64>,
}

/// In-memory append-only audit trail.
pub struct AuditTrail {
    log: RwLock<Vec<Decision>>,
}

impl AuditTrail {
    pub fn new() -> Self {
        Self {
            log: RwLock::new(Vec::new()),
        }
    }

    /// Append a decision to the trail.
    ///
    /// The trail is the system of record for "why was this allowed":
    /// callers invoke this synchronously before returning a decision, so a
    /// decision is never observable without its audit record.
    pub async fn record(&self, decision: &Decision) -> Result<()> {
        let mut log = self.log.write().await;
        log.push(decision.clone());

        if log.len() >= ALERT_WATERMARK {
            warn!(
                retained = log.len(),
                "audit trail exceeds retention watermark; export and archive it"
            );
        }
        debug!(
            decision = %decision.id,
            subject = %decision.subject,
            effect = ?decision.effect,
            "decision recorded"
        );
        Ok(())
    }

    /// Fetch one page of decisions for a query, timestamp ascending.
    ///
    /// Pass `cursor: None` to start from the beginning and the returned
    /// cursor to continue. The log is append-only, so re-running a page
    /// with the same cursor returns the same decisions.
    pub async fn fetch_page(&self, query: &AuditQuery, cursor: Option<u64>) -> AuditPage {
        let log = self.log.read().await;
        let start = cursor.unwrap_or(0) as usize;

        let mut decisions = Vec::new();
        let mut next_cursor = None;

        for (index, decision) in log.iter().enumerate().skip(start) {
            if !query.matches(decision) {
                continue;
            }
            decisions.push(decision.clone());
            if decisions.len() == query.page_size {
                next_cursor = Some(index as u64 + 1);
                break;
            }
        }

        AuditPage {
            decisions,
            cursor: next_cursor,
        }
    }

    /// All decisions for a query, walking every page. Intended for tests
    /// and small windows; audit review should page instead.
    pub async fn decisions_for(&self, query: &AuditQuery) -> Vec<Decision> {
        let mut all = Vec::new();
        let mut cursor = None;
        loop {
            let page = self.fetch_page(query, cursor).await;
            all.extend(page.decisions);
            match page.cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        all
    }

    /// Number of recorded decisions.
    pub async fn len(&self) -> usize {
        self.log.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.log.read().await.is_empty()
    }
}

impl Default for AuditTrail {
    fn default() -> Self {
        Self::new()
    }
}
