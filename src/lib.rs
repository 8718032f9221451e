//! # Scoped Authorization Engine
//!
//! Authorization decision engine built around the canonical
//! Subject-Action-Object-Context check: role assignments grant permission
//! sets, permissions imply other permissions through a validated DAG, and
//! grants cascade down a typed scope hierarchy. Every decision is
//! deny-by-default, replayable, and recorded in an append-only audit
//! trail before it is returned.
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use scoped_authz::{
//!     AllowListMatcher, Engine, EngineConfig, PolicyConfig, ScopeConfig, SubjectId,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = PolicyConfig::builtin();
//!     config.scopes.push(ScopeConfig {
//!         scope: "lib:DemoX:CSPROB".to_string(),
//!         parent: None,
//!     });
//!
//!     let engine = Engine::new(
//!         config,
//!         Arc::new(AllowListMatcher::new()),
//!         EngineConfig::default(),
//!     )?;
//!
//!     engine
//!         .grant("alice", "library_author", "lib:DemoX:CSPROB", None)
//!         .await?;
//!
//!     let decision = engine
//!         .authorize(
//!             &SubjectId::new("alice"),
//!             "content_libraries.edit_library_content",
//!             Some("lib:DemoX:CSPROB"),
//!         )
//!         .await?;
//!     assert!(decision.allowed());
//!
//!     Ok(())
//! }
//! ```

pub mod audit;
pub mod engine;
pub mod error;
pub mod graph;
pub mod matcher;
pub mod policy;
pub mod scope;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use audit::{AuditPage, AuditQuery, AuditTrail};
pub use engine::{BatchEntry, BatchResult, Engine, EngineConfig, RoleSummary};
pub use error::{AuthzError, Result};
pub use graph::{ImplicationGraph, ImplicationGraphBuilder};
pub use matcher::{AllowListMatcher, MatchRequest, RuleMatcher};
pub use policy::{
    FilePolicySource, ImplicationRule, PolicyConfig, PolicySnapshot, PolicySource, RoleConfig,
    ScopeConfig,
};
pub use scope::{ScopeError, ScopeHierarchy, ScopeHierarchyBuilder, ScopeId};
pub use store::{AssignmentSnapshot, AssignmentStore, GrantOutcome, RevokeOutcome};
pub use types::{
    Assignment, Decision, Effect, PermissionId, Role, RoleId, RoleKind, SubjectId,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
