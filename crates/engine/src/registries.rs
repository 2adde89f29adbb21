//! Registration tables bundled and cross-validated for the manager.

use std::sync::Arc;

use strata_types::NodeKind;
use tracing::debug;

use crate::{
    error::StructuralError,
    group::{GroupRegistry, GroupType},
    provider::{DataProviderType, ProviderRegistry},
    settings::SettingsRegistry,
};

/// Settings, provider and group tables, validated against each other once at startup.
#[derive(Debug, Clone)]
pub struct Registries {
    settings: SettingsRegistry,
    providers: ProviderRegistry,
    groups: GroupRegistry,
}

impl Registries {
    /// Checks that type names are unambiguous, every declared setting is registered, shared
    /// settings are declared by their group type and no shared setting reads a value only a
    /// descendant provider can supply.
    pub fn new(settings: SettingsRegistry, providers: ProviderRegistry, groups: GroupRegistry) -> Result<Self, StructuralError> {
        for (name, provider) in providers.iter() {
            if groups.contains(name) {
                return Err(StructuralError::AmbiguousNodeType(name.to_string()));
            }
            ensure_registered(&settings, name, provider.settings())?;
            if let Some(fetch_settings) = provider.fetch_settings() {
                ensure_declared(name, provider.settings(), fetch_settings)?;
            }
        }

        for (name, group) in groups.iter() {
            ensure_registered(&settings, name, group.settings())?;
            ensure_declared(name, group.settings(), group.shared_settings())?;
        }

        for (name, group) in groups.iter() {
            for shared in group.shared_settings() {
                for dependency in settings.transitive_dependencies(shared) {
                    let upstream_capable =
                        group.settings().contains(&dependency.as_str()) || groups.iter().any(|(_, other)| other.shared_settings().contains(&dependency.as_str()));
                    let provider_only = providers.iter().any(|(_, provider)| provider.settings().contains(&dependency.as_str()));
                    if !upstream_capable && provider_only {
                        return Err(StructuralError::SharedSettingReadsDescendant {
                            group_type: name.to_string(),
                            setting: shared.to_string(),
                            dependency,
                        });
                    }
                }
            }
        }

        debug!(
            settings = settings.keys().count(),
            providers = providers.iter().count(),
            groups = groups.iter().count(),
            "registries validated"
        );
        Ok(Self { settings, providers, groups })
    }

    pub fn settings(&self) -> &SettingsRegistry {
        &self.settings
    }

    pub fn provider(&self, node_type: &str) -> Option<&Arc<dyn DataProviderType>> {
        self.providers.get(node_type)
    }

    pub fn group(&self, node_type: &str) -> Option<&Arc<dyn GroupType>> {
        self.groups.get(node_type)
    }

    pub fn kind_of(&self, node_type: &str) -> Option<NodeKind> {
        if self.providers.contains(node_type) {
            Some(NodeKind::Provider)
        } else if self.groups.contains(node_type) {
            Some(NodeKind::Group)
        } else {
            None
        }
    }

    /// Setting keys a node type owns, in declaration order.
    pub fn declared_settings(&self, node_type: &str) -> &[&'static str] {
        if let Some(provider) = self.providers.get(node_type) {
            return provider.settings();
        }
        self.groups.get(node_type).map(|group| group.settings()).unwrap_or(&[])
    }

    /// Keys participating in the fetch key of a provider type.
    pub fn fetch_relevant_settings(&self, node_type: &str) -> Vec<&'static str> {
        let Some(provider) = self.providers.get(node_type) else {
            return Vec::new();
        };
        if let Some(explicit) = provider.fetch_settings() {
            return explicit.to_vec();
        }
        provider
            .settings()
            .iter()
            .copied()
            .filter(|key| self.settings.get(key).is_some_and(|definition| definition.is_fetch_relevant()))
            .collect()
    }
}

fn ensure_registered(settings: &SettingsRegistry, node_type: &str, keys: &[&'static str]) -> Result<(), StructuralError> {
    match keys.iter().find(|key| !settings.contains(key)) {
        Some(key) => Err(StructuralError::UnknownSetting {
            node_type: node_type.to_string(),
            key: key.to_string(),
        }),
        None => Ok(()),
    }
}

fn ensure_declared(node_type: &str, declared: &[&'static str], subset: &[&'static str]) -> Result<(), StructuralError> {
    match subset.iter().find(|key| !declared.contains(key)) {
        Some(key) => Err(StructuralError::UnknownSetting {
            node_type: node_type.to_string(),
            key: key.to_string(),
        }),
        None => Ok(()),
    }
}
