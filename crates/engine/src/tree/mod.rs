//! The provider/group tree.
//!
//! Nodes live in a flat map keyed by id with parent links; groups keep their ordered child
//! lists. The tree itself performs no validation: the manager validates a mutation, applies it
//! to a copy and only then commits the copy.

mod node;
pub(crate) mod validate;

use std::collections::HashMap;

use strata_types::NodeId;

pub(crate) use node::{FetchDirective, GroupNode, Node, NodeHeader, ProviderNode, ProviderState};

#[derive(Debug, Clone)]
pub(crate) struct TreeNode {
    pub parent: Option<NodeId>,
    pub node: Node,
}

#[derive(Debug, Clone)]
pub(crate) struct Tree {
    root: NodeId,
    nodes: HashMap<NodeId, TreeNode>,
}

impl Tree {
    pub fn new(root: GroupNode) -> Self {
        let root_id = root.header.id.clone();
        let mut nodes = HashMap::new();
        nodes.insert(
            root_id.clone(),
            TreeNode {
                parent: None,
                node: Node::Group(root),
            },
        );
        Self { root: root_id, nodes }
    }

    pub fn root_id(&self) -> &NodeId {
        &self.root
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn node(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.get(id).map(|entry| &entry.node)
    }

    pub fn node_mut(&mut self, id: &NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id).map(|entry| &mut entry.node)
    }

    pub fn parent(&self, id: &NodeId) -> Option<&NodeId> {
        self.nodes.get(id).and_then(|entry| entry.parent.as_ref())
    }

    pub fn children(&self, id: &NodeId) -> &[NodeId] {
        self.node(id).map(Node::children).unwrap_or(&[])
    }

    /// Ancestors from the parent up to the root.
    pub fn ancestors(&self, id: &NodeId) -> Vec<NodeId> {
        let mut ancestors = Vec::new();
        let mut current = self.parent(id);
        while let Some(parent) = current {
            ancestors.push(parent.clone());
            current = self.parent(parent);
        }
        ancestors
    }

    /// True when `ancestor` lies on the path from `id` to the root (or equals `id`).
    pub fn is_in_subtree_of(&self, id: &NodeId, ancestor: &NodeId) -> bool {
        id == ancestor || self.ancestors(id).iter().any(|candidate| candidate == ancestor)
    }

    /// The node and all its descendants in document order.
    pub fn subtree(&self, id: &NodeId) -> Vec<NodeId> {
        let mut ordered = Vec::new();
        let mut stack = vec![id.clone()];
        while let Some(current) = stack.pop() {
            if !self.contains(&current) {
                continue;
            }
            stack.extend(self.children(&current).iter().rev().cloned());
            ordered.push(current);
        }
        ordered
    }

    /// Every node in document order.
    pub fn document_order(&self) -> Vec<NodeId> {
        self.subtree(&self.root)
    }

    /// False when the node or any ancestor is disabled.
    pub fn is_effectively_enabled(&self, id: &NodeId) -> bool {
        let own = self.node(id).is_some_and(|node| node.header().enabled);
        own && self.ancestors(id).iter().all(|ancestor| self.node(ancestor).is_some_and(|node| node.header().enabled))
    }

    /// Nearest enclosing group that is not the root.
    pub fn nearest_group(&self, id: &NodeId) -> Option<NodeId> {
        self.ancestors(id).into_iter().find(|ancestor| ancestor != &self.root)
    }

    /// Groups a node may inherit shared settings from, nearest first.
    ///
    /// Walking upwards from the node, each level yields the earlier siblings (nearest first,
    /// tagged [`Upstream::Sibling`]) and then the parent ([`Upstream::Ancestor`]).
    pub fn upstream_groups(&self, id: &NodeId) -> Vec<(NodeId, Upstream)> {
        let mut upstream = Vec::new();
        let mut current = id.clone();
        while let Some(parent) = self.parent(&current).cloned() {
            let siblings = self.children(&parent);
            if let Some(position) = siblings.iter().position(|sibling| sibling == &current) {
                for sibling in siblings[..position].iter().rev() {
                    if matches!(self.node(sibling), Some(Node::Group(_))) {
                        upstream.push((sibling.clone(), Upstream::Sibling));
                    }
                }
            }
            upstream.push((parent.clone(), Upstream::Ancestor));
            current = parent;
        }
        upstream
    }

    /// Inserts `node` under `parent` at `index` (clamped to the child count).
    pub fn insert(&mut self, parent: &NodeId, index: Option<usize>, node: Node) {
        let id = node.id().clone();
        if let Some(Node::Group(group)) = self.node_mut(parent) {
            let index = index.unwrap_or(group.children.len()).min(group.children.len());
            group.children.insert(index, id.clone());
        }
        self.nodes.insert(
            id,
            TreeNode {
                parent: Some(parent.clone()),
                node,
            },
        );
    }

    /// Unlinks a node from its parent's child list without dropping it.
    pub fn detach(&mut self, id: &NodeId) {
        let Some(parent) = self.parent(id).cloned() else {
            return;
        };
        if let Some(group) = self.node_mut(&parent).and_then(Node::as_group_mut) {
            group.children.retain(|child| child != id);
        }
    }

    /// Re-links a detached node under a new parent.
    pub fn attach(&mut self, id: &NodeId, parent: &NodeId, index: Option<usize>) {
        if let Some(group) = self.node_mut(parent).and_then(Node::as_group_mut) {
            let index = index.unwrap_or(group.children.len()).min(group.children.len());
            group.children.insert(index, id.clone());
        }
        if let Some(entry) = self.nodes.get_mut(id) {
            entry.parent = Some(parent.clone());
        }
    }

    /// Removes a node and its descendants, returning them in document order.
    pub fn remove_subtree(&mut self, id: &NodeId) -> Vec<Node> {
        let ids = self.subtree(id);
        self.detach(id);
        ids.iter().filter_map(|removed| self.nodes.remove(removed)).map(|entry| entry.node).collect()
    }
}

/// Relation of an upstream group to the node being resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Upstream {
    Ancestor,
    Sibling,
}
