//! Transactional tree mutations.
//!
//! Every structural mutation is applied to a clone of the tree, validated there and committed
//! only when the candidate passes. On error the manager is left untouched.

use indexmap::IndexMap;
use serde_json::Value;
use strata_types::{NodeId, NodeKind};
use tracing::debug;

use super::DataProviderManager;
use crate::{
    error::StructuralError,
    tree::{
        FetchDirective, GroupNode, Node, NodeHeader, ProviderNode, ProviderState, Tree,
        validate::{check_dependencies, check_nesting},
    },
};

impl DataProviderManager {
    /// Appends a new node of `node_type` under `parent` with a generated id.
    pub fn add_node(&mut self, parent: &NodeId, node_type: &str, settings: IndexMap<String, Value>) -> Result<NodeId, StructuralError> {
        let node_id = self.generate_id(node_type);
        self.insert_with(node_id, parent, None, node_type, None, settings)
    }

    /// Appends a new node with a caller-chosen id.
    pub fn add_node_with_id(
        &mut self,
        node_id: impl Into<NodeId>,
        parent: &NodeId,
        node_type: &str,
        settings: IndexMap<String, Value>,
    ) -> Result<NodeId, StructuralError> {
        self.insert_with(node_id.into(), parent, None, node_type, None, settings)
    }

    /// Inserts a new node at `index` among `parent`'s children (clamped to the child count).
    pub fn insert_node(
        &mut self,
        parent: &NodeId,
        index: usize,
        node_type: &str,
        settings: IndexMap<String, Value>,
    ) -> Result<NodeId, StructuralError> {
        let node_id = self.generate_id(node_type);
        self.insert_with(node_id, parent, Some(index), node_type, None, settings)
    }

    /// Removes a node and its descendants, cancelling their in-flight fetches.
    pub fn remove_node(&mut self, node_id: &NodeId) -> Result<(), StructuralError> {
        if node_id == self.tree.root_id() {
            return Err(StructuralError::RootImmutable);
        }
        if !self.tree.contains(node_id) {
            return Err(StructuralError::UnknownNode(node_id.clone()));
        }

        let mut candidate = self.tree.clone();
        let removed = candidate.remove_subtree(node_id);
        check_dependencies(&candidate, &self.registries, candidate.root_id())?;
        self.tree = candidate;

        for node in removed {
            self.teardown(node);
        }
        debug!(node_id = %node_id, "node removed");
        self.mark_shape_changed();
        Ok(())
    }

    /// Moves a node to `index` among `new_parent`'s children.
    pub fn move_node(&mut self, node_id: &NodeId, new_parent: &NodeId, index: usize) -> Result<(), StructuralError> {
        if node_id == self.tree.root_id() {
            return Err(StructuralError::RootImmutable);
        }
        let node_type = self
            .tree
            .node(node_id)
            .map(|node| node.header().node_type.clone())
            .ok_or_else(|| StructuralError::UnknownNode(node_id.clone()))?;
        if !self.tree.contains(new_parent) {
            return Err(StructuralError::UnknownNode(new_parent.clone()));
        }
        if self.tree.is_in_subtree_of(new_parent, node_id) {
            return Err(StructuralError::MoveIntoOwnSubtree {
                node: node_id.clone(),
                target: new_parent.clone(),
            });
        }
        check_nesting(&self.tree, &self.registries, new_parent, &node_type)?;

        let mut candidate = self.tree.clone();
        candidate.detach(node_id);
        candidate.attach(node_id, new_parent, Some(index));
        check_dependencies(&candidate, &self.registries, candidate.root_id())?;
        self.tree = candidate;

        debug!(node_id = %node_id, parent = %new_parent, index, "node moved");
        self.mark_shape_changed();
        Ok(())
    }

    /// Sets (or with `Value::Null` clears) a node's own value. Takes effect on the next walk.
    pub fn set_setting(&mut self, node_id: &NodeId, key: &str, value: Value) -> Result<(), StructuralError> {
        let node = self.tree.node_mut(node_id).ok_or_else(|| StructuralError::UnknownNode(node_id.clone()))?;
        let header = node.header_mut();
        if !self.registries.declared_settings(&header.node_type).contains(&key) {
            return Err(StructuralError::UnknownSetting {
                node_type: header.node_type.clone(),
                key: key.to_string(),
            });
        }
        if value.is_null() {
            header.settings.shift_remove(key);
        } else {
            header.settings.insert(key.to_string(), value);
        }
        Ok(())
    }

    /// Cancels a provider's in-flight fetch. The provider reports an error until it is retried
    /// or its settings change. Returns false when nothing was in flight.
    pub fn cancel(&mut self, node_id: &NodeId) -> Result<bool, StructuralError> {
        let node = self.tree.node_mut(node_id).ok_or_else(|| StructuralError::UnknownNode(node_id.clone()))?;
        let Some(provider) = node.as_provider_mut() else {
            return Ok(false);
        };
        let instance = provider.header.instance;
        let directive = provider.state.cancel();
        let cancelled = directive != FetchDirective::Keep;
        self.leave_request(node_id, instance, directive);
        Ok(cancelled)
    }

    /// Makes a failed provider fetch again on the next walk.
    pub fn retry(&mut self, node_id: &NodeId) -> Result<bool, StructuralError> {
        let node = self.tree.node_mut(node_id).ok_or_else(|| StructuralError::UnknownNode(node_id.clone()))?;
        Ok(node.as_provider_mut().is_some_and(|provider| provider.state.retry()))
    }

    /// Disabled nodes and everything below them are skipped by walks but keep their state.
    pub fn set_enabled(&mut self, node_id: &NodeId, enabled: bool) -> Result<(), StructuralError> {
        let node = self.tree.node_mut(node_id).ok_or_else(|| StructuralError::UnknownNode(node_id.clone()))?;
        if node.header().enabled != enabled {
            node.header_mut().enabled = enabled;
            self.mark_shape_changed();
        }
        Ok(())
    }

    pub fn rename_node(&mut self, node_id: &NodeId, name: impl Into<String>) -> Result<(), StructuralError> {
        let node = self.tree.node_mut(node_id).ok_or_else(|| StructuralError::UnknownNode(node_id.clone()))?;
        node.header_mut().name = name.into();
        Ok(())
    }

    pub(super) fn insert_with(
        &mut self,
        node_id: NodeId,
        parent: &NodeId,
        index: Option<usize>,
        node_type: &str,
        name: Option<String>,
        settings: IndexMap<String, Value>,
    ) -> Result<NodeId, StructuralError> {
        if self.tree.contains(&node_id) {
            return Err(StructuralError::DuplicateNodeId(node_id));
        }
        check_nesting(&self.tree, &self.registries, parent, node_type)?;
        let node = self.build_node(node_id.clone(), node_type, name, true, settings)?;

        let mut candidate = self.tree.clone();
        candidate.insert(parent, index, node);
        check_dependencies(&candidate, &self.registries, candidate.root_id())?;
        self.tree = candidate;

        debug!(node_id = %node_id, node_type, parent = %parent, "node added");
        self.mark_shape_changed();
        Ok(node_id)
    }

    /// Builds a detached node after checking its type and settings keys.
    pub(super) fn build_node(
        &mut self,
        node_id: NodeId,
        node_type: &str,
        name: Option<String>,
        enabled: bool,
        settings: IndexMap<String, Value>,
    ) -> Result<Node, StructuralError> {
        let kind = self
            .registries
            .kind_of(node_type)
            .ok_or_else(|| StructuralError::UnknownNodeType(node_type.to_string()))?;
        let declared = self.registries.declared_settings(node_type);
        if let Some(key) = settings.keys().find(|key| !declared.contains(&key.as_str())) {
            return Err(StructuralError::UnknownSetting {
                node_type: node_type.to_string(),
                key: key.clone(),
            });
        }

        let header = NodeHeader {
            id: node_id,
            node_type: node_type.to_string(),
            name: name.unwrap_or_else(|| node_type.to_string()),
            enabled,
            settings: settings.into_iter().filter(|(_, value)| !value.is_null()).collect(),
            instance: self.allocate_instance(),
        };
        Ok(match kind {
            NodeKind::Provider => Node::Provider(ProviderNode {
                header,
                state: ProviderState::default(),
            }),
            NodeKind::Group => Node::Group(GroupNode {
                header,
                children: Vec::new(),
            }),
        })
    }

    /// Cancels a removed node's fetch and drops its memoized resolution.
    pub(super) fn teardown(&mut self, mut node: Node) {
        let node_id = node.id().clone();
        let instance = node.header().instance;
        if let Some(provider) = node.as_provider_mut() {
            let directive = provider.state.detach();
            self.leave_request(&node_id, instance, directive);
        }
        self.memo.forget(&node_id, instance);
    }

    pub(super) fn replace_tree(&mut self, tree: Tree) {
        let mut previous = std::mem::replace(&mut self.tree, tree);
        let root_id = previous.root_id().clone();
        for node in previous.remove_subtree(&root_id) {
            self.teardown(node);
        }
        self.mark_shape_changed();
    }

    fn generate_id(&mut self, node_type: &str) -> NodeId {
        loop {
            self.next_serial += 1;
            let candidate = NodeId::new(format!("{node_type}-{}", self.next_serial));
            if !self.tree.contains(&candidate) {
                return candidate;
            }
        }
    }
}
