//! Policy configuration and versioned snapshots
//!
//! Roles, permissions, the implication relation, and the scope registry
//! are data, loaded as a whole at deploy/config time. Building a
//! [`PolicySnapshot`] validates the configuration (cycles, undefined
//! references, duplicates are fatal) and produces an immutable value that
//! evaluations read end-to-end. Hot reload builds a new snapshot and swaps
//! it atomically; nothing is ever mutated field-by-field.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{AuthzError, Result};
use crate::graph::{ImplicationGraph, ImplicationGraphBuilder};
use crate::scope::{ScopeHierarchy, ScopeHierarchyBuilder, ScopeId};
use crate::types::{PermissionId, Role, RoleId, RoleKind};

/// One permission and the permissions it implies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImplicationRule {
    pub permission: String,
    pub implies: Vec<String>,
}

/// Role definition as configuration data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleConfig {
    pub name: String,
    #[serde(default = "RoleConfig::default_kind")]
    pub kind: RoleKind,
    pub permissions: Vec<String>,
}

impl RoleConfig {
    fn default_kind() -> RoleKind {
        RoleKind::Custom
    }
}

/// Scope registration: the scope and its optional parent
/// (absent parent means the root).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScopeConfig {
    pub scope: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
}

/// Whole-policy configuration, reloadable as a unit.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyConfig {
    #[serde(default)]
    pub permissions: Vec<String>,
    #[serde(default)]
    pub implications: Vec<ImplicationRule>,
    #[serde(default)]
    pub roles: Vec<RoleConfig>,
    #[serde(default)]
    pub scopes: Vec<ScopeConfig>,
}

impl PolicyConfig {
    /// The default content-library catalog: four shipped roles over the
    /// `content_libraries.*` permission namespace, with edit/manage
    /// permissions implying their view counterparts.
    pub fn builtin() -> Self {
        const NS: &str = "content_libraries";
        let p = |name: &str| format!("{NS}.{name}");

        let permissions = vec![
            p("view_library"),
            p("manage_library_tags"),
            p("delete_library"),
            p("edit_library_content"),
            p("publish_library_content"),
            p("reuse_library_content"),
            p("view_library_team"),
            p("manage_library_team"),
            p("create_library_collection"),
            p("edit_library_collection"),
            p("delete_library_collection"),
        ];

        let implications = vec![
            ImplicationRule {
                permission: p("edit_library_content"),
                implies: vec![p("view_library")],
            },
            ImplicationRule {
                permission: p("publish_library_content"),
                implies: vec![p("view_library")],
            },
            ImplicationRule {
                permission: p("delete_library"),
                implies: vec![p("view_library")],
            },
            ImplicationRule {
                permission: p("manage_library_tags"),
                implies: vec![p("view_library")],
            },
            ImplicationRule {
                permission: p("reuse_library_content"),
                implies: vec![p("view_library")],
            },
            ImplicationRule {
                permission: p("manage_library_team"),
                implies: vec![p("view_library_team")],
            },
            ImplicationRule {
                permission: p("delete_library_collection"),
                implies: vec![p("edit_library_collection")],
            },
            ImplicationRule {
                permission: p("edit_library_collection"),
                implies: vec![p("view_library")],
            },
            ImplicationRule {
                permission: p("create_library_collection"),
                implies: vec![p("view_library")],
            },
        ];

        let default_role = |name: &str, permissions: Vec<String>| RoleConfig {
            name: name.to_string(),
            kind: RoleKind::Default,
            permissions,
        };

        let roles = vec![
            default_role(
                "library_admin",
                vec![
                    p("view_library"),
                    p("manage_library_tags"),
                    p("delete_library"),
                    p("edit_library_content"),
                    p("publish_library_content"),
                    p("reuse_library_content"),
                    p("view_library_team"),
                    p("manage_library_team"),
                    p("create_library_collection"),
                    p("edit_library_collection"),
                    p("delete_library_collection"),
                ],
            ),
            default_role(
                "library_author",
                vec![
                    p("view_library"),
                    p("manage_library_tags"),
                    p("edit_library_content"),
                    p("publish_library_content"),
                    p("reuse_library_content"),
                    p("view_library_team"),
                    p("create_library_collection"),
                    p("edit_library_collection"),
                    p("delete_library_collection"),
                ],
            ),
            default_role(
                "library_contributor",
                vec![
                    p("view_library"),
                    p("manage_library_tags"),
                    p("edit_library_content"),
                    p("reuse_library_content"),
                    p("view_library_team"),
                    p("create_library_collection"),
                    p("edit_library_collection"),
                    p("delete_library_collection"),
                ],
            ),
            default_role(
                "library_user",
                vec![
                    p("view_library"),
                    p("reuse_library_content"),
                    p("view_library_team"),
                ],
            ),
        ];

        Self {
            permissions,
            implications,
            roles,
            scopes: Vec::new(),
        }
    }
}

/// Immutable, versioned view of the whole policy configuration.
///
/// Evaluations capture one snapshot and use it end-to-end, so a concurrent
/// reload never exposes a half-updated graph or hierarchy.
#[derive(Debug)]
pub struct PolicySnapshot {
    pub version: u64,
    pub graph: ImplicationGraph,
    pub hierarchy: ScopeHierarchy,
    roles: HashMap<RoleId, Role>,
}

impl PolicySnapshot {
    /// Validate a configuration and build a snapshot from it.
    pub fn build(config: &PolicyConfig, version: u64) -> Result<Self> {
        let mut graph_builder = ImplicationGraphBuilder::new();
        for raw in &config.permissions {
            let permission = parse_config_permission(raw)?;
            graph_builder.add_permission(permission);
        }
        for rule in &config.implications {
            let from = parse_config_permission(&rule.permission)?;
            for target in &rule.implies {
                graph_builder.imply(from.clone(), parse_config_permission(target)?);
            }
        }
        let graph = graph_builder.build()?;

        let mut roles: HashMap<RoleId, Role> = HashMap::new();
        for role_config in &config.roles {
            let id = RoleId::new(role_config.name.clone());
            let mut permissions = Vec::with_capacity(role_config.permissions.len());
            for raw in &role_config.permissions {
                let permission = parse_config_permission(raw)?;
                if !graph.contains(&permission) {
                    return Err(AuthzError::Config(format!(
                        "role '{id}' grants undefined permission '{permission}'"
                    )));
                }
                permissions.push(permission);
            }
            let role = Role {
                id: id.clone(),
                kind: role_config.kind,
                permissions,
            };
            if roles.insert(id.clone(), role).is_some() {
                return Err(AuthzError::Config(format!(
                    "role '{id}' is defined more than once"
                )));
            }
        }

        let mut hierarchy_builder = ScopeHierarchyBuilder::new();
        for entry in &config.scopes {
            let scope = parse_config_scope(&entry.scope)?;
            match &entry.parent {
                Some(parent) => {
                    hierarchy_builder.register_under(scope, parse_config_scope(parent)?);
                }
                None => {
                    hierarchy_builder.register(scope);
                }
            }
        }
        let hierarchy = hierarchy_builder.build()?;

        Ok(Self {
            version,
            graph,
            hierarchy,
            roles,
        })
    }

    pub fn role(&self, id: &RoleId) -> Option<&Role> {
        self.roles.get(id)
    }

    /// All role definitions, ordered by role id.
    pub fn roles(&self) -> Vec<&Role> {
        let mut roles: Vec<&Role> = self.roles.values().collect();
        roles.sort_by(|a, b| a.id.cmp(&b.id));
        roles
    }
}

fn parse_config_permission(raw: &str) -> Result<PermissionId> {
    PermissionId::parse(raw)
        .map_err(|e| AuthzError::Config(format!("invalid permission in configuration: {e}")))
}

fn parse_config_scope(raw: &str) -> Result<ScopeId> {
    ScopeId::parse(raw)
        .map_err(|e| AuthzError::Config(format!("invalid scope in configuration: {e}")))
}

/// Source of policy configuration for explicit or periodic reload.
pub trait PolicySource: Send + Sync {
    fn load(&self) -> Result<PolicyConfig>;
}

/// Loads policy configuration from a JSON file.
pub struct FilePolicySource {
    path: PathBuf,
}

impl FilePolicySource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl PolicySource for FilePolicySource {
    fn load(&self) -> Result<PolicyConfig> {
        let raw = std::fs::read_to_string(&self.path)?;
        serde_json::from_str(&raw).map_err(|e| {
            AuthzError::Config(format!(
                "failed to parse policy file {}: {e}",
                self.path.display()
            ))
        })
    }
}
