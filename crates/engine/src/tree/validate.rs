//! Structural checks run on a candidate tree before a mutation is committed.

use strata_types::{NodeId, NodeKind};

use super::{Node, Tree, Upstream};
use crate::{error::StructuralError, group::ShareScope, registries::Registries};

/// Rejects placing a child of `child_type` under `parent`.
pub(crate) fn check_nesting(tree: &Tree, registries: &Registries, parent: &NodeId, child_type: &str) -> Result<(), StructuralError> {
    let parent_node = tree.node(parent).ok_or_else(|| StructuralError::UnknownNode(parent.clone()))?;
    let child_kind = registries
        .kind_of(child_type)
        .ok_or_else(|| StructuralError::UnknownNodeType(child_type.to_string()))?;

    let accepted = match parent_node {
        Node::Provider(_) => false,
        Node::Group(group) => registries
            .group(&group.header.node_type)
            .is_some_and(|group_type| group_type.accepts_child(child_kind, child_type)),
    };
    if accepted {
        return Ok(());
    }
    Err(StructuralError::InvalidNesting {
        parent: parent.clone(),
        parent_kind: parent_node.kind(),
        child_kind,
        child_type: child_type.to_string(),
    })
}

/// Checks every node of the subtree rooted at `subtree_root`: each dependency of each declared
/// setting must be available from the node itself or upstream, never only from below.
pub(crate) fn check_dependencies(tree: &Tree, registries: &Registries, subtree_root: &NodeId) -> Result<(), StructuralError> {
    for node_id in tree.subtree(subtree_root) {
        let Some(node) = tree.node(&node_id) else {
            continue;
        };
        for setting in registries.declared_settings(&node.header().node_type) {
            let Some(definition) = registries.settings().get(setting) else {
                continue;
            };
            for dependency in definition.depends_on() {
                if available_upstream(tree, registries, &node_id, dependency) {
                    continue;
                }
                if provided_below(tree, registries, &node_id, dependency) {
                    return Err(StructuralError::DescendantDependency {
                        node: node_id.clone(),
                        setting: setting.to_string(),
                        dependency: dependency.clone(),
                    });
                }
            }
        }
    }
    Ok(())
}

fn available_upstream(tree: &Tree, registries: &Registries, node_id: &NodeId, key: &str) -> bool {
    let declares = |id: &NodeId| {
        tree.node(id)
            .is_some_and(|node| registries.declared_settings(&node.header().node_type).contains(&key))
    };
    if declares(node_id) {
        return true;
    }
    tree.upstream_groups(node_id).iter().any(|(group_id, relation)| {
        let Some(group) = tree.node(group_id).and_then(|node| registries.group(&node.header().node_type)) else {
            return false;
        };
        group.shared_settings().contains(&key) && (*relation == Upstream::Ancestor || group.share_scope() == ShareScope::DescendantsAndLaterSiblings)
    })
}

fn provided_below(tree: &Tree, registries: &Registries, node_id: &NodeId, key: &str) -> bool {
    tree.subtree(node_id).iter().skip(1).any(|descendant| {
        tree.node(descendant).is_some_and(|node| match node.kind() {
            NodeKind::Provider => registries.declared_settings(&node.header().node_type).contains(&key),
            NodeKind::Group => registries
                .group(&node.header().node_type)
                .is_some_and(|group| group.settings().contains(&key)),
        })
    })
}
