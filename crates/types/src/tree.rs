//! Serialized tree description.
//!
//! This is the minimal persistence contract: ids, types, display names, the enabled flag, own
//! setting values and child order. Statuses and fetched data are never persisted; a rehydrated
//! tree starts over from its first resolution pass.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{NodeId, NodeKind};

/// Current description format version.
pub const TREE_DESCRIPTION_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeDescription {
    #[serde(default = "default_version")]
    pub version: u32,
    pub root: NodeDescription,
}

fn default_version() -> u32 {
    TREE_DESCRIPTION_VERSION
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDescription {
    pub id: NodeId,
    pub kind: NodeKind,
    /// Registered provider or group type name.
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Own setting values in declaration order.
    #[serde(default)]
    pub settings: IndexMap<String, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NodeDescription>,
}

fn default_enabled() -> bool {
    true
}

impl NodeDescription {
    /// Visits the node and all its descendants in document order.
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a NodeDescription)) {
        visit(self);
        for child in &self.children {
            child.walk(visit);
        }
    }
}
