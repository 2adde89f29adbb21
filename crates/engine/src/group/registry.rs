use std::{fmt, sync::Arc};

use indexmap::IndexMap;

use super::GroupType;

/// Immutable table mapping group type names to their implementation bundles.
#[derive(Clone, Default)]
pub struct GroupRegistry {
    types: IndexMap<String, Arc<dyn GroupType>>,
}

impl fmt::Debug for GroupRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GroupRegistry")
            .field("types", &self.types.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl GroupRegistry {
    pub fn with_type(mut self, name: impl Into<String>, group: Arc<dyn GroupType>) -> Self {
        self.types.insert(name.into(), group);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn GroupType>> {
        self.types.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<dyn GroupType>)> {
        self.types.iter().map(|(name, group)| (name.as_str(), group))
    }
}
