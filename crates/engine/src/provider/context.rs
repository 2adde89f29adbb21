use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde_json::Value;
use strata_types::NodeId;

use super::CacheKey;

/// Input of a provider fetch.
///
/// Only fetch-relevant settings are included: two providers with equal requests share one
/// request and one cache entry, whichever node issued it.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchRequest {
    pub cache_key: CacheKey,
    pub settings: IndexMap<String, Value>,
}

impl FetchRequest {
    pub fn setting(&self, key: &str) -> Option<&Value> {
        self.settings.get(key)
    }

    /// Deserializes a setting, returning `None` when it is missing or has another shape.
    pub fn setting_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.settings.get(key).and_then(|value| serde_json::from_value(value.clone()).ok())
    }
}

/// Read-only view handed to transformers during the collection pass.
pub struct TransformerContext<'a> {
    pub(crate) node_id: &'a NodeId,
    pub(crate) name: &'a str,
    pub(crate) data: &'a Value,
    pub(crate) settings: &'a IndexMap<String, Value>,
    pub(crate) scopes: &'a [IndexMap<String, Value>],
}

impl<'a> TransformerContext<'a> {
    pub fn node_id(&self) -> &NodeId {
        self.node_id
    }

    /// Display name of the node.
    pub fn name(&self) -> &str {
        self.name
    }

    /// Payload of the last successful fetch.
    pub fn data(&self) -> &Value {
        self.data
    }

    /// Resolved setting value, visual settings included.
    pub fn setting(&self, key: &str) -> Option<&Value> {
        self.settings.get(key)
    }

    pub fn setting_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.settings.get(key).and_then(|value| serde_json::from_value(value.clone()).ok())
    }

    /// Stored data published by group accumulators earlier in this walk, nearest scope first.
    pub fn stored_data(&self, name: &str) -> Option<&Value> {
        self.scopes.iter().rev().find_map(|scope| scope.get(name))
    }
}
