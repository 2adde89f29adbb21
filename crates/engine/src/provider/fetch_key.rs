//! Fetch key derivation.
//!
//! A fetch key is the canonical JSON rendering of the fetch-relevant resolved settings of one
//! provider: object keys are sorted recursively, so the key never depends on the order settings
//! were declared, set or inherited in.

use std::{collections::BTreeMap, fmt};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FetchKey(String);

impl FetchKey {
    #[cfg(test)]
    pub(crate) fn from_canonical(canonical: impl Into<String>) -> Self {
        Self(canonical.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FetchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Cache entries and in-flight requests are keyed by provider type and fetch key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub provider_type: String,
    pub fetch_key: FetchKey,
}

impl CacheKey {
    pub fn new(provider_type: impl Into<String>, fetch_key: FetchKey) -> Self {
        Self {
            provider_type: provider_type.into(),
            fetch_key,
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.provider_type, self.fetch_key)
    }
}

/// Derives the fetch key of `settings` restricted to `relevant` keys.
///
/// Keys listed in `relevant` but missing from `settings` are rendered as `null`, so an unset
/// optional setting still yields a stable key.
pub fn derive_key(settings: &IndexMap<String, Value>, relevant: &[&str]) -> FetchKey {
    let selected: BTreeMap<&str, Value> = relevant
        .iter()
        .map(|key| (*key, settings.get(*key).map(canonicalize).unwrap_or(Value::Null)))
        .collect();
    let rendered = serde_json::to_string(&selected).unwrap_or_default();
    FetchKey(rendered)
}

fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<&String, Value> = map.iter().map(|(key, value)| (key, canonicalize(value))).collect();
            Value::Object(sorted.into_iter().map(|(key, value)| (key.clone(), value)).collect())
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}
