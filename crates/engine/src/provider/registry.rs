use std::{fmt, sync::Arc};

use indexmap::IndexMap;

use super::DataProviderType;

/// Immutable table mapping provider type names to their implementation bundles.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    types: IndexMap<String, Arc<dyn DataProviderType>>,
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("types", &self.types.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ProviderRegistry {
    /// Adds a provider type. A later registration under the same name replaces the earlier one.
    pub fn with_type(mut self, name: impl Into<String>, provider: Arc<dyn DataProviderType>) -> Self {
        self.types.insert(name.into(), provider);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn DataProviderType>> {
        self.types.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<dyn DataProviderType>)> {
        self.types.iter().map(|(name, provider)| (name.as_str(), provider))
    }
}
