//! Outputs of the visualization assembler.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{BoundingBox, NodeId, NodeStatusReport};

/// Color scale legend a provider asks the viewer to display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColorScale {
    /// Named gradient, for example `viridis`.
    pub gradient: String,
    pub min: f64,
    pub max: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub id: String,
    pub node_id: NodeId,
    pub name: String,
    pub color_scale: ColorScale,
}

/// Renderable layer. The payload is opaque to the framework; viewers interpret it by
/// `provider_type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layer {
    pub id: String,
    pub node_id: NodeId,
    pub provider_type: String,
    pub name: String,
    /// Nearest enclosing group below the root, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<NodeId>,
    pub payload: Value,
}

/// Aggregate outcome of one assembly walk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssemblyResult {
    pub bounding_box: Option<BoundingBox>,
    pub annotations: Vec<Annotation>,
    pub layers: Vec<Layer>,
    /// Status of every provider in document order.
    pub per_node_status: IndexMap<NodeId, NodeStatusReport>,
    /// Stored data published into the root scope by group accumulators.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub stored_data: IndexMap<String, Value>,
}

impl AssemblyResult {
    pub fn status_of(&self, node_id: &NodeId) -> Option<&NodeStatusReport> {
        self.per_node_status.get(node_id)
    }

    pub fn layer_for(&self, node_id: &NodeId) -> Option<&Layer> {
        self.layers.iter().find(|layer| &layer.node_id == node_id)
    }
}
