//! Structural errors raised by registration and tree mutation.
//!
//! Settings problems and fetch failures are not errors in this sense: they are recorded on the
//! affected provider as `SETTINGS_INVALID` / `ERROR` statuses and never abort a walk.

use strata_types::{NodeId, NodeKind};
use thiserror::Error;

/// Invariant violation detected synchronously before a registration table or the tree changes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StructuralError {
    #[error("node id '{0}' is already in use")]
    DuplicateNodeId(NodeId),
    #[error("unknown node '{0}'")]
    UnknownNode(NodeId),
    #[error("unknown node type '{0}'")]
    UnknownNodeType(String),
    #[error("node type '{0}' is registered as both a provider and a group")]
    AmbiguousNodeType(String),
    #[error("{parent_kind} '{parent}' cannot contain a {child_kind} of type '{child_type}'")]
    InvalidNesting {
        parent: NodeId,
        parent_kind: NodeKind,
        child_kind: NodeKind,
        child_type: String,
    },
    #[error("cannot move '{node}' below its own descendant '{target}'")]
    MoveIntoOwnSubtree { node: NodeId, target: NodeId },
    #[error("the root node cannot be removed or moved")]
    RootImmutable,
    #[error("the root node must be a group, found {0}")]
    InvalidRoot(NodeKind),
    #[error("setting '{key}' is not declared by node type '{node_type}'")]
    UnknownSetting { node_type: String, key: String },
    #[error("setting '{0}' is registered more than once")]
    DuplicateSetting(String),
    #[error("setting '{setting}' depends on unknown setting '{dependency}'")]
    UnknownDependency { setting: String, dependency: String },
    #[error("cycle detected in setting dependencies involving: {}", .0.join(", "))]
    DependencyCycle(Vec<String>),
    #[error("shared setting '{setting}' of group type '{group_type}' reads '{dependency}', which only descendants can provide")]
    SharedSettingReadsDescendant {
        group_type: String,
        setting: String,
        dependency: String,
    },
    #[error("setting '{setting}' of node '{node}' reads '{dependency}', which is only provided below the node")]
    DescendantDependency { node: NodeId, setting: String, dependency: String },
    #[error("tree description version {found} is not supported (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },
    #[error("no tokio runtime is running; the manager spawns fetches on the runtime it is created in")]
    NoRuntime,
}
