use std::collections::HashSet;

use strata_types::{NodeDescription, NodeId, NodeKind, TREE_DESCRIPTION_VERSION, TreeDescription};
use tracing::info;

use super::DataProviderManager;
use crate::{
    error::StructuralError,
    tree::{Node, Tree, validate::check_dependencies, validate::check_nesting},
};

impl DataProviderManager {
    /// Describes the tree: ids, types, names, enabled flags, own settings and child order.
    pub fn serialize(&self) -> TreeDescription {
        TreeDescription {
            version: TREE_DESCRIPTION_VERSION,
            root: self.describe(self.tree.root_id()),
        }
    }

    /// Replaces the tree with the described one. Providers start over in `SETTINGS_INVALID`
    /// and fetch on the next walk. Nothing changes when the description is rejected.
    pub fn deserialize(&mut self, description: &TreeDescription) -> Result<(), StructuralError> {
        if description.version != TREE_DESCRIPTION_VERSION {
            return Err(StructuralError::UnsupportedVersion {
                found: description.version,
                expected: TREE_DESCRIPTION_VERSION,
            });
        }

        let root = &description.root;
        let root_node = self.build_node(root.id.clone(), &root.node_type, root.name.clone(), root.enabled, root.settings.clone())?;
        let Node::Group(root_group) = root_node else {
            return Err(StructuralError::InvalidRoot(NodeKind::Provider));
        };

        let mut tree = Tree::new(root_group);
        let mut seen = HashSet::from([root.id.clone()]);
        self.rehydrate_children(&mut tree, root, &mut seen)?;
        check_dependencies(&tree, &self.registries, tree.root_id())?;

        let node_count = tree.len();
        self.replace_tree(tree);
        info!(nodes = node_count, "tree rehydrated");
        Ok(())
    }

    fn rehydrate_children(&mut self, tree: &mut Tree, parent: &NodeDescription, seen: &mut HashSet<NodeId>) -> Result<(), StructuralError> {
        for child in &parent.children {
            if !seen.insert(child.id.clone()) {
                return Err(StructuralError::DuplicateNodeId(child.id.clone()));
            }
            check_nesting(tree, &self.registries, &parent.id, &child.node_type)?;
            let node = self.build_node(child.id.clone(), &child.node_type, child.name.clone(), child.enabled, child.settings.clone())?;
            tree.insert(&parent.id, None, node);
            self.rehydrate_children(tree, child, seen)?;
        }
        Ok(())
    }

    fn describe(&self, node_id: &NodeId) -> NodeDescription {
        let Some(node) = self.tree.node(node_id) else {
            return NodeDescription {
                id: node_id.clone(),
                kind: NodeKind::Group,
                node_type: String::new(),
                name: None,
                enabled: false,
                settings: Default::default(),
                children: Vec::new(),
            };
        };
        let header = node.header();
        NodeDescription {
            id: header.id.clone(),
            kind: node.kind(),
            node_type: header.node_type.clone(),
            name: Some(header.name.clone()),
            enabled: header.enabled,
            settings: header.settings.clone(),
            children: node.children().iter().map(|child| self.describe(child)).collect(),
        }
    }
}
