use serde::{Deserialize, Serialize};

use crate::{NodeId, NodeStatus};

/// Subscription topics exposed by the manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topic {
    TreeShape,
    NodeStatus,
    AggregateResult,
}

/// Notification delivered to subscribers once the walk that observed the change completes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Notification {
    /// Nodes were added, removed, moved or the tree was replaced.
    TreeShapeChanged { revision: u64 },
    /// A provider changed status. `previous` is `None` for newly seen nodes, `current` is `None`
    /// for removed ones.
    NodeStatusChanged {
        node_id: NodeId,
        previous: Option<NodeStatus>,
        current: Option<NodeStatus>,
    },
    /// The assembled result differs from the previous walk's.
    AggregateResultChanged { revision: u64 },
}

impl Notification {
    pub fn topic(&self) -> Topic {
        match self {
            Notification::TreeShapeChanged { .. } => Topic::TreeShape,
            Notification::NodeStatusChanged { .. } => Topic::NodeStatus,
            Notification::AggregateResultChanged { .. } => Topic::AggregateResult,
        }
    }
}
