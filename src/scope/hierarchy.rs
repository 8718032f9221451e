//! Cascading scope hierarchy
//!
//! Registered scopes form a forest with single-parent links rooted at
//! `instance`. Ancestor chains are precomputed at build time so that
//! `applies` checks are lookups, not walks. A grant made at scope S applies
//! at every descendant of S; cascading is always downward.

use std::collections::HashMap;

use crate::error::{AuthzError, Result};

use super::types::ScopeId;

/// Builder for a [`ScopeHierarchy`].
///
/// Scopes may be registered in any order; parent links are resolved and
/// validated when [`build`](Self::build) runs. Registering the same scope
/// twice (which would give it multiple parents) or introducing a cycle is
/// rejected as a configuration error.
#[derive(Debug, Default)]
pub struct ScopeHierarchyBuilder {
    entries: Vec<(ScopeId, Option<ScopeId>)>,
}

impl ScopeHierarchyBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a scope whose parent is the root.
    pub fn register(&mut self, scope: ScopeId) -> &mut Self {
        self.entries.push((scope, None));
        self
    }

    /// Register a scope under an explicit parent.
    pub fn register_under(&mut self, scope: ScopeId, parent: ScopeId) -> &mut Self {
        self.entries.push((scope, Some(parent)));
        self
    }

    /// Resolve parent links and precompute ancestor chains.
    pub fn build(&self) -> Result<ScopeHierarchy> {
        let root = ScopeId::root();
        let mut parents: HashMap<ScopeId, ScopeId> = HashMap::new();

        for (scope, parent) in &self.entries {
            if scope.is_root() {
                return Err(AuthzError::Config(
                    "the root scope cannot be re-registered".to_string(),
                ));
            }
            let parent = parent.clone().unwrap_or_else(ScopeId::root);
            if parent == *scope {
                return Err(AuthzError::Config(format!(
                    "scope '{scope}' cannot be its own parent"
                )));
            }
            if parents.insert(scope.clone(), parent).is_some() {
                return Err(AuthzError::Config(format!(
                    "scope '{scope}' is registered more than once; multiple parents are not supported"
                )));
            }
        }

        // Every parent must itself be registered (or be the root).
        for parent in parents.values() {
            if !parent.is_root() && !parents.contains_key(parent) {
                return Err(AuthzError::Config(format!(
                    "parent scope '{parent}' is not registered"
                )));
            }
        }

        // Walk each scope up to the root, rejecting cycles.
        let mut chains: HashMap<ScopeId, Vec<ScopeId>> = HashMap::new();
        chains.insert(root.clone(), vec![root.clone()]);

        for scope in parents.keys() {
            let mut chain = vec![scope.clone()];
            let mut current = scope;
            while let Some(parent) = parents.get(current) {
                if chain.contains(parent) {
                    return Err(AuthzError::Config(format!(
                        "cycle detected in scope hierarchy at '{parent}'"
                    )));
                }
                chain.push(parent.clone());
                current = parent;
            }
            chains.insert(scope.clone(), chain);
        }

        Ok(ScopeHierarchy { chains })
    }
}

/// The cascading scope hierarchy, built once per policy snapshot.
#[derive(Debug, Clone)]
pub struct ScopeHierarchy {
    /// Precomputed ancestor chain per scope: the scope itself first,
    /// the root last.
    chains: HashMap<ScopeId, Vec<ScopeId>>,
}

impl ScopeHierarchy {
    /// Whether the scope is registered in the hierarchy.
    pub fn contains(&self, scope: &ScopeId) -> bool {
        self.chains.contains_key(scope)
    }

    /// Ancestor chain from `scope` up to the root, root last.
    ///
    /// The chain includes `scope` itself; the root's chain is just the
    /// root. Unknown scopes are a configuration error, never silently
    /// treated as the root.
    pub fn ancestors(&self, scope: &ScopeId) -> Result<&[ScopeId]> {
        self.chains
            .get(scope)
            .map(Vec::as_slice)
            .ok_or_else(|| AuthzError::Config(format!("unknown scope '{scope}'")))
    }

    /// Whether a grant at `grant_scope` applies when evaluating a check
    /// at `check_scope`: true iff they are equal or `grant_scope` is an
    /// ancestor of `check_scope`.
    ///
    /// A well-formed check scope that was never registered behaves as a
    /// direct child of the root, so only root-level grants reach it and
    /// everything else resolves to deny rather than an error.
    pub fn applies(&self, grant_scope: &ScopeId, check_scope: &ScopeId) -> bool {
        if grant_scope == check_scope {
            return true;
        }
        match self.chains.get(check_scope) {
            Some(chain) => chain.contains(grant_scope),
            None => grant_scope.is_root(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scope(s: &str) -> ScopeId {
        ScopeId::parse(s).unwrap()
    }

    fn demo_hierarchy() -> ScopeHierarchy {
        let mut builder = ScopeHierarchyBuilder::new();
        builder
            .register(scope("org:A"))
            .register_under(scope("course:org:A:CS101"), scope("org:A"))
            .register_under(scope("lib:DemoX:CSPROB"), scope("org:A"))
            .register(scope("org:B"));
        builder.build().unwrap()
    }

    #[test]
    fn test_ancestors_root_last() {
        let hierarchy = demo_hierarchy();
        let chain = hierarchy.ancestors(&scope("course:org:A:CS101")).unwrap();
        assert_eq!(
            chain,
            &[scope("course:org:A:CS101"), scope("org:A"), ScopeId::root()]
        );
    }

    #[test]
    fn test_root_is_its_own_terminus() {
        let hierarchy = demo_hierarchy();
        assert_eq!(hierarchy.ancestors(&ScopeId::root()).unwrap(), &[ScopeId::root()]);
    }

    #[test]
    fn test_applies_reflexive() {
        let hierarchy = demo_hierarchy();
        for s in ["org:A", "course:org:A:CS101", "instance"] {
            assert!(hierarchy.applies(&scope(s), &scope(s)));
        }
    }

    #[test]
    fn test_applies_cascades_downward_only() {
        let hierarchy = demo_hierarchy();
        let org = scope("org:A");
        let course = scope("course:org:A:CS101");

        assert!(hierarchy.applies(&org, &course));
        assert!(hierarchy.applies(&ScopeId::root(), &course));
        assert!(!hierarchy.applies(&course, &org));
        assert!(!hierarchy.applies(&course, &ScopeId::root()));
    }

    #[test]
    fn test_sibling_scopes_do_not_apply() {
        let hierarchy = demo_hierarchy();
        assert!(!hierarchy.applies(&scope("org:B"), &scope("course:org:A:CS101")));
    }

    #[test]
    fn test_unknown_check_scope_sees_only_root_grants() {
        let hierarchy = demo_hierarchy();
        let unregistered = scope("lib:Other:LIB1");
        assert!(hierarchy.applies(&ScopeId::root(), &unregistered));
        assert!(!hierarchy.applies(&scope("org:A"), &unregistered));
    }

    #[test]
    fn test_unknown_scope_ancestors_is_an_error() {
        let hierarchy = demo_hierarchy();
        assert!(matches!(
            hierarchy.ancestors(&scope("lib:Other:LIB1")),
            Err(AuthzError::Config(_))
        ));
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let mut builder = ScopeHierarchyBuilder::new();
        builder
            .register(scope("org:A"))
            .register(scope("org:B"))
            .register_under(scope("lib:DemoX:CSPROB"), scope("org:A"))
            .register_under(scope("lib:DemoX:CSPROB"), scope("org:B"));
        assert!(matches!(builder.build(), Err(AuthzError::Config(_))));
    }

    #[test]
    fn test_unregistered_parent_rejected() {
        let mut builder = ScopeHierarchyBuilder::new();
        builder.register_under(scope("lib:DemoX:CSPROB"), scope("org:Missing"));
        assert!(matches!(builder.build(), Err(AuthzError::Config(_))));
    }

    #[test]
    fn test_cycle_rejected() {
        let mut builder = ScopeHierarchyBuilder::new();
        builder
            .register_under(scope("org:A"), scope("org:B"))
            .register_under(scope("org:B"), scope("org:A"));
        assert!(matches!(builder.build(), Err(AuthzError::Config(_))));
    }

    #[test]
    fn test_self_parent_rejected() {
        let mut builder = ScopeHierarchyBuilder::new();
        builder.register_under(scope("org:A"), scope("org:A"));
        assert!(matches!(builder.build(), Err(AuthzError::Config(_))));
    }
}
