use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stable node identifier, unique across one tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for NodeId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// The two node kinds a tree is built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Provider,
    Group,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKind::Provider => f.write_str("provider"),
            NodeKind::Group => f.write_str("group"),
        }
    }
}

/// Lifecycle status of a provider node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeStatus {
    /// Settings could not be resolved to valid values; the node contributes nothing.
    SettingsInvalid,
    /// A fetch for the current settings is in flight.
    Loading,
    /// Data for the current settings is available.
    Success,
    /// The last fetch for the current settings failed.
    Error,
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            NodeStatus::SettingsInvalid => "SETTINGS_INVALID",
            NodeStatus::Loading => "LOADING",
            NodeStatus::Success => "SUCCESS",
            NodeStatus::Error => "ERROR",
        };
        f.write_str(label)
    }
}

/// Per-provider status entry of an assembled result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeStatusReport {
    pub status: NodeStatus,
    /// Settings or fetch error message, when the status carries one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// False when the node or one of its ancestors is disabled.
    pub enabled: bool,
    /// Time the currently held data was fetched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_serializes_in_screaming_case() {
        let json = serde_json::to_string(&NodeStatus::SettingsInvalid).expect("serialize");
        assert_eq!(json, "\"SETTINGS_INVALID\"");
        assert_eq!(NodeStatus::Error.to_string(), "ERROR");
    }

    #[test]
    fn node_id_is_transparent() {
        let id = NodeId::from("surface-1");
        assert_eq!(serde_json::to_value(&id).expect("serialize"), serde_json::json!("surface-1"));
    }
}
