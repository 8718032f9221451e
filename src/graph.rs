//! Permission implication graph
//!
//! A directed "implies" relation between permissions: holding a granted
//! permission also satisfies everything reachable from it. Construction
//! validates the edge set against the declared permissions and rejects
//! cycles, so the built graph is always a DAG. Closures are computed on
//! first use and memoized for the lifetime of the graph; a policy reload
//! builds a fresh graph and starts over.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use dashmap::DashMap;

use crate::error::{AuthzError, Result};
use crate::types::PermissionId;

/// Builder for an [`ImplicationGraph`].
#[derive(Debug, Default)]
pub struct ImplicationGraphBuilder {
    permissions: Vec<PermissionId>,
    edges: Vec<(PermissionId, PermissionId)>,
}

impl ImplicationGraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a permission. Duplicates are rejected at build.
    pub fn add_permission(&mut self, permission: PermissionId) -> &mut Self {
        self.permissions.push(permission);
        self
    }

    /// Declare that holding `permission` also satisfies `implies`.
    pub fn imply(&mut self, permission: PermissionId, implies: PermissionId) -> &mut Self {
        self.edges.push((permission, implies));
        self
    }

    /// Validate and build the graph.
    ///
    /// Fails with a configuration error when a permission is declared
    /// twice, an edge references an undefined permission, or the edges
    /// introduce a cycle.
    pub fn build(&self) -> Result<ImplicationGraph> {
        let mut defined: HashSet<&PermissionId> = HashSet::new();
        for permission in &self.permissions {
            if !defined.insert(permission) {
                return Err(AuthzError::Config(format!(
                    "duplicate permission definition '{permission}'"
                )));
            }
        }

        let mut edges: HashMap<PermissionId, Vec<PermissionId>> = HashMap::new();
        for (from, to) in &self.edges {
            if !defined.contains(from) {
                return Err(AuthzError::Config(format!(
                    "implication references undefined permission '{from}'"
                )));
            }
            if !defined.contains(to) {
                return Err(AuthzError::Config(format!(
                    "permission '{from}' implies undefined permission '{to}'"
                )));
            }
            let targets = edges.entry(from.clone()).or_default();
            if !targets.contains(to) {
                targets.push(to.clone());
            }
        }

        let graph = ImplicationGraph {
            permissions: self.permissions.iter().cloned().collect(),
            edges,
            closures: DashMap::new(),
        };
        graph.reject_cycles()?;
        Ok(graph)
    }
}

/// The validated implication graph, read-only after build.
#[derive(Debug)]
pub struct ImplicationGraph {
    permissions: HashSet<PermissionId>,
    edges: HashMap<PermissionId, Vec<PermissionId>>,
    /// Memoized reflexive-transitive closures.
    closures: DashMap<PermissionId, Arc<HashSet<PermissionId>>>,
}

impl ImplicationGraph {
    /// Whether the permission was declared at build time.
    pub fn contains(&self, permission: &PermissionId) -> bool {
        self.permissions.contains(permission)
    }

    /// Reflexive-transitive closure of a permission: the permission itself
    /// plus everything reachable along "implies" edges.
    ///
    /// Computed by depth-first traversal on first use and memoized; the
    /// graph is read-mostly, so later calls are lookups.
    pub fn closure(&self, permission: &PermissionId) -> Arc<HashSet<PermissionId>> {
        if let Some(cached) = self.closures.get(permission) {
            return Arc::clone(cached.value());
        }

        let mut closure = HashSet::new();
        let mut stack = vec![permission.clone()];
        while let Some(current) = stack.pop() {
            if closure.insert(current.clone()) {
                if let Some(targets) = self.edges.get(&current) {
                    for target in targets {
                        if !closure.contains(target) {
                            stack.push(target.clone());
                        }
                    }
                }
            }
        }

        let closure = Arc::new(closure);
        self.closures
            .insert(permission.clone(), Arc::clone(&closure));
        closure
    }

    /// Whether holding `granted` satisfies a request for `requested`.
    pub fn satisfies(&self, granted: &PermissionId, requested: &PermissionId) -> bool {
        self.closure(granted).contains(requested)
    }

    /// Depth-first cycle check with three-color state: unvisited, on the
    /// current path (gray), fully processed (black). Finding a gray node
    /// again means the edge set loops.
    fn reject_cycles(&self) -> Result<()> {
        let mut state: HashMap<&PermissionId, u8> = HashMap::new();
        for permission in &self.permissions {
            if state.get(permission).copied().unwrap_or(0) == 0 {
                let mut path = Vec::new();
                self.visit(permission, &mut state, &mut path)?;
            }
        }
        Ok(())
    }

    fn visit<'a>(
        &'a self,
        node: &'a PermissionId,
        state: &mut HashMap<&'a PermissionId, u8>,
        path: &mut Vec<&'a PermissionId>,
    ) -> Result<()> {
        match state.get(node) {
            Some(1) => {
                let start = path.iter().position(|p| *p == node).unwrap_or(0);
                let cycle: Vec<String> = path[start..]
                    .iter()
                    .map(|p| p.to_string())
                    .chain(std::iter::once(node.to_string()))
                    .collect();
                return Err(AuthzError::Config(format!(
                    "cyclic permission implication: {}",
                    cycle.join(" -> ")
                )));
            }
            Some(2) => return Ok(()),
            _ => {}
        }

        state.insert(node, 1);
        path.push(node);

        if let Some(targets) = self.edges.get(node) {
            for target in targets {
                self.visit(target, state, path)?;
            }
        }

        state.insert(node, 2);
        path.pop();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn perm(raw: &str) -> PermissionId {
        PermissionId::parse(raw).unwrap()
    }

    fn demo_graph() -> ImplicationGraph {
        let mut builder = ImplicationGraphBuilder::new();
        builder
            .add_permission(perm("edit_content"))
            .add_permission(perm("view_library"))
            .add_permission(perm("delete_library"))
            .imply(perm("edit_content"), perm("view_library"))
            .imply(perm("delete_library"), perm("edit_content"));
        builder.build().unwrap()
    }

    #[test]
    fn test_closure_is_reflexive() {
        let graph = demo_graph();
        for p in ["edit_content", "view_library", "delete_library"] {
            assert!(graph.closure(&perm(p)).contains(&perm(p)));
        }
    }

    #[test]
    fn test_closure_is_transitive() {
        let graph = demo_graph();
        let closure = graph.closure(&perm("delete_library"));
        assert!(closure.contains(&perm("edit_content")));
        assert!(closure.contains(&perm("view_library")));
        assert_eq!(closure.len(), 3);
    }

    #[test]
    fn test_satisfies() {
        let graph = demo_graph();
        assert!(graph.satisfies(&perm("edit_content"), &perm("view_library")));
        assert!(!graph.satisfies(&perm("view_library"), &perm("edit_content")));
    }

    #[test]
    fn test_closure_is_memoized() {
        let graph = demo_graph();
        let first = graph.closure(&perm("delete_library"));
        let second = graph.closure(&perm("delete_library"));
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_cycle_rejected_at_build() {
        let mut builder = ImplicationGraphBuilder::new();
        builder
            .add_permission(perm("a"))
            .add_permission(perm("b"))
            .imply(perm("a"), perm("b"))
            .imply(perm("b"), perm("a"));

        let err = builder.build().unwrap_err();
        match err {
            AuthzError::Config(msg) => {
                assert!(msg.contains("a") && msg.contains("b"));
            }
            other => panic!("expected Config error, got {other:?}"),
        }
    }

    #[test]
    fn test_self_implication_rejected() {
        let mut builder = ImplicationGraphBuilder::new();
        builder.add_permission(perm("a")).imply(perm("a"), perm("a"));
        assert!(matches!(builder.build(), Err(AuthzError::Config(_))));
    }

    #[test]
    fn test_undefined_edge_rejected() {
        let mut builder = ImplicationGraphBuilder::new();
        builder
            .add_permission(perm("edit_content"))
            .imply(perm("edit_content"), perm("missing"));
        assert!(matches!(builder.build(), Err(AuthzError::Config(_))));
    }

    #[test]
    fn test_duplicate_permission_rejected() {
        let mut builder = ImplicationGraphBuilder::new();
        builder
            .add_permission(perm("edit_content"))
            .add_permission(perm("edit_content"));
        assert!(matches!(builder.build(), Err(AuthzError::Config(_))));
    }

    #[test]
    fn test_diamond_implication() {
        // admin implies both edit and review, which both imply view.
        let mut builder = ImplicationGraphBuilder::new();
        builder
            .add_permission(perm("admin"))
            .add_permission(perm("edit"))
            .add_permission(perm("review"))
            .add_permission(perm("view"))
            .imply(perm("admin"), perm("edit"))
            .imply(perm("admin"), perm("review"))
            .imply(perm("edit"), perm("view"))
            .imply(perm("review"), perm("view"));

        let graph = builder.build().unwrap();
        assert_eq!(graph.closure(&perm("admin")).len(), 4);
    }
}
