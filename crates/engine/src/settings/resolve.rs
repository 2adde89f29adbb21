//! Pull-based settings resolution.
//!
//! Nothing is pushed down the tree when a setting changes. Every pass pulls each value from the
//! current tree: the node's own value if the domain accepts it, else the nearest upstream
//! sharer's value, else a fixup that is persisted after the pass. Domains are memoized per node
//! and key and only re-evaluated when a dependency value or the global context changed.

use std::collections::HashMap;

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;
use strata_types::NodeId;

use super::{DomainContext, GlobalContext, SettingDefinition, ValueDomain};
use crate::{
    group::ShareScope,
    registries::Registries,
    tree::{Tree, Upstream},
};

/// Memo counters, exposed for diagnostics and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MemoStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

#[derive(Debug, Clone)]
struct MemoEntry {
    dependencies: IndexMap<String, Option<Value>>,
    global_revision: u64,
    domain: ValueDomain,
}

/// Memoized domains keyed by node instance and setting key.
#[derive(Debug, Default)]
pub(crate) struct SettingsMemo {
    entries: HashMap<(NodeId, u64, String), MemoEntry>,
    hits: u64,
    misses: u64,
}

impl SettingsMemo {
    fn domain(
        &mut self,
        node_id: &NodeId,
        instance: u64,
        definition: &SettingDefinition,
        dependencies: IndexMap<String, Option<Value>>,
        globals: &GlobalContext,
    ) -> ValueDomain {
        let slot = (node_id.clone(), instance, definition.key().to_string());
        if let Some(entry) = self.entries.get(&slot)
            && entry.global_revision == globals.revision()
            && entry.dependencies == dependencies
        {
            self.hits += 1;
            return entry.domain.clone();
        }

        self.misses += 1;
        let domain = definition.evaluate_domain(&DomainContext::new(node_id, &dependencies, globals));
        self.entries.insert(
            slot,
            MemoEntry {
                dependencies,
                global_revision: globals.revision(),
                domain: domain.clone(),
            },
        );
        domain
    }

    /// Drops every entry of a removed node.
    pub fn forget(&mut self, node_id: &NodeId, instance: u64) {
        self.entries.retain(|(id, entry_instance, _), _| !(id == node_id && *entry_instance == instance));
    }

    pub fn stats(&self) -> MemoStats {
        MemoStats {
            hits: self.hits,
            misses: self.misses,
            entries: self.entries.len(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum SettingSource {
    Own,
    Inherited(NodeId),
    Fixup,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ResolvedSetting {
    pub value: Option<Value>,
    pub source: Option<SettingSource>,
    /// Why no value could be produced.
    pub reason: Option<String>,
}

impl ResolvedSetting {
    fn found(value: Value, source: SettingSource) -> Self {
        Self {
            value: Some(value),
            source: Some(source),
            reason: None,
        }
    }

    fn missing(reason: String) -> Self {
        Self {
            value: None,
            source: None,
            reason: Some(reason),
        }
    }
}

/// Resolved view of one node.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct NodeResolution {
    /// Every declared setting that has a value, in declaration order.
    pub settings: IndexMap<String, Value>,
    /// First required setting without a valid value.
    pub invalid: Option<String>,
}

/// One consistent snapshot of resolved settings.
///
/// Values are cached per `(node, key)` for the lifetime of the pass; fixups are collected and
/// only written back by the caller once the pass is over.
pub(crate) struct ResolutionPass<'a> {
    tree: &'a Tree,
    registries: &'a Registries,
    globals: &'a GlobalContext,
    memo: &'a mut SettingsMemo,
    resolved: HashMap<(NodeId, String), ResolvedSetting>,
    fixups: Vec<(NodeId, String, Value)>,
}

impl<'a> ResolutionPass<'a> {
    pub fn new(tree: &'a Tree, registries: &'a Registries, globals: &'a GlobalContext, memo: &'a mut SettingsMemo) -> Self {
        Self {
            tree,
            registries,
            globals,
            memo,
            resolved: HashMap::new(),
            fixups: Vec::new(),
        }
    }

    /// Resolves every setting the node's type declares.
    pub fn resolve_node(&mut self, node_id: &NodeId) -> NodeResolution {
        let registries = self.registries;
        let Some(node) = self.tree.node(node_id) else {
            return NodeResolution {
                settings: IndexMap::new(),
                invalid: Some(format!("unknown node '{node_id}'")),
            };
        };

        let mut resolution = NodeResolution::default();
        for key in registries.declared_settings(&node.header().node_type) {
            let resolved = self.resolve(node_id, key);
            match resolved.value {
                Some(value) => {
                    resolution.settings.insert(key.to_string(), value);
                }
                None => {
                    let required = registries.settings().get(key).is_some_and(SettingDefinition::is_required);
                    if required && resolution.invalid.is_none() {
                        let reason = resolved.reason.unwrap_or_else(|| "no value".to_string());
                        resolution.invalid = Some(format!("setting '{key}': {reason}"));
                    }
                }
            }
        }
        resolution
    }

    /// Resolves `key` in the context of `node_id`.
    pub fn resolve(&mut self, node_id: &NodeId, key: &str) -> ResolvedSetting {
        let slot = (node_id.clone(), key.to_string());
        if let Some(resolved) = self.resolved.get(&slot) {
            return resolved.clone();
        }
        let resolved = self.compute(node_id, key);
        self.resolved.insert(slot, resolved.clone());
        resolved
    }

    /// Fixed values to persist as own values, in resolution order.
    pub fn into_fixups(self) -> Vec<(NodeId, String, Value)> {
        self.fixups
    }

    fn compute(&mut self, node_id: &NodeId, key: &str) -> ResolvedSetting {
        let tree = self.tree;
        let registries = self.registries;
        let Some(node) = tree.node(node_id) else {
            return ResolvedSetting::missing(format!("unknown node '{node_id}'"));
        };
        let header = node.header();

        let definition = registries.settings().get(key);
        let declared = registries.declared_settings(&header.node_type).contains(&key);
        let Some(definition) = definition.filter(|_| declared) else {
            return match self.inherited(node_id, key) {
                Some((source, value)) => ResolvedSetting::found(value, SettingSource::Inherited(source)),
                None => ResolvedSetting::missing("no value".to_string()),
            };
        };

        let mut dependencies = IndexMap::new();
        for dependency in definition.depends_on() {
            let value = self.resolve(node_id, dependency).value;
            dependencies.insert(dependency.clone(), value);
        }
        let domain = self.memo.domain(node_id, header.instance, definition, dependencies, self.globals);

        let own = header.settings.get(key);
        if let Some(own) = own
            && domain.accepts(own)
        {
            return ResolvedSetting::found(own.clone(), SettingSource::Own);
        }

        if let Some((source, value)) = self.inherited(node_id, key) {
            return ResolvedSetting::found(value, SettingSource::Inherited(source));
        }

        match definition.fix(own, &domain) {
            Some(value) => {
                self.fixups.push((node_id.clone(), key.to_string(), value.clone()));
                ResolvedSetting::found(value, SettingSource::Fixup)
            }
            None => {
                let reason = match (domain.unavailable_reason(), own) {
                    (Some(reason), _) => reason.to_string(),
                    (None, Some(own)) => format!("value {own} is outside the valid domain"),
                    (None, None) => "no value".to_string(),
                };
                ResolvedSetting::missing(reason)
            }
        }
    }

    /// Value of the nearest upstream group sharing `key` that provides one.
    fn inherited(&mut self, node_id: &NodeId, key: &str) -> Option<(NodeId, Value)> {
        let tree = self.tree;
        let registries = self.registries;
        for (group_id, relation) in tree.upstream_groups(node_id) {
            let Some(group) = tree.node(&group_id).and_then(|node| registries.group(&node.header().node_type)) else {
                continue;
            };
            if !group.shared_settings().contains(&key) {
                continue;
            }
            if relation == Upstream::Sibling && group.share_scope() != ShareScope::DescendantsAndLaterSiblings {
                continue;
            }
            if let Some(value) = self.resolve(&group_id, key).value {
                return Some((group_id, value));
            }
        }
        None
    }
}
