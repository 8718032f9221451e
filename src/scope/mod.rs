//! Hierarchical, typed scope model
//!
//! Scopes are parameterized locations in a cascading hierarchy
//! (e.g. `org:OpenedX`, `lib:DemoX:CSPROB`), rooted at `instance`.
//! Grants made at a broader scope apply at every descendant scope;
//! the reverse never holds.

mod hierarchy;
mod types;

pub use hierarchy::{ScopeHierarchy, ScopeHierarchyBuilder};
pub use types::{ScopeError, ScopeId, ScopeResult};
