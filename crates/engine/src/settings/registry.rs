//! Declarative setting descriptors and the registration table holding them.

use std::{
    collections::{HashMap, HashSet, VecDeque},
    fmt,
    sync::Arc,
};

use indexmap::IndexMap;
use serde_json::Value;
use strata_types::NodeId;

use super::domain::{GlobalContext, ValueDomain};
use crate::error::StructuralError;

/// Computes the currently valid domain of a setting.
pub type DomainFn = Arc<dyn Fn(&DomainContext<'_>) -> ValueDomain + Send + Sync>;

/// Repairs an out-of-domain value. Receives the node's current own value (if any) and the domain.
pub type FixupFn = Arc<dyn Fn(Option<&Value>, &ValueDomain) -> Option<Value> + Send + Sync>;

/// Read-only view handed to domain functions.
///
/// Only the settings listed in the definition's `depends_on` are visible, each resolved in the
/// context of the node being resolved (own value or upstream). Descendant values are never
/// reachable from here.
pub struct DomainContext<'a> {
    node_id: &'a NodeId,
    dependencies: &'a IndexMap<String, Option<Value>>,
    globals: &'a GlobalContext,
}

impl<'a> DomainContext<'a> {
    pub(crate) fn new(node_id: &'a NodeId, dependencies: &'a IndexMap<String, Option<Value>>, globals: &'a GlobalContext) -> Self {
        Self {
            node_id,
            dependencies,
            globals,
        }
    }

    pub fn node_id(&self) -> &NodeId {
        self.node_id
    }

    /// Resolved value of a declared dependency.
    pub fn setting(&self, key: &str) -> Option<&Value> {
        self.dependencies.get(key).and_then(Option::as_ref)
    }

    /// Value published by the embedder in the global context (available ensembles, fields, ...).
    pub fn global(&self, name: &str) -> Option<&Value> {
        self.globals.get(name)
    }
}

/// Registration entry for one setting key.
#[derive(Clone)]
pub struct SettingDefinition {
    pub(crate) key: String,
    pub(crate) depends_on: Vec<String>,
    pub(crate) default: Option<Value>,
    pub(crate) required: bool,
    pub(crate) fetch_relevant: bool,
    pub(crate) domain: DomainFn,
    pub(crate) fixup: Option<FixupFn>,
}

impl fmt::Debug for SettingDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SettingDefinition")
            .field("key", &self.key)
            .field("depends_on", &self.depends_on)
            .field("default", &self.default)
            .field("required", &self.required)
            .field("fetch_relevant", &self.fetch_relevant)
            .finish()
    }
}

impl SettingDefinition {
    /// A required, fetch-relevant setting accepting any non-null value.
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            depends_on: Vec::new(),
            default: None,
            required: true,
            fetch_relevant: true,
            domain: Arc::new(|_| ValueDomain::Any),
            fixup: None,
        }
    }

    /// Sets the domain function and the settings it reads.
    pub fn with_domain<F>(mut self, depends_on: &[&str], domain: F) -> Self
    where
        F: Fn(&DomainContext<'_>) -> ValueDomain + Send + Sync + 'static,
    {
        self.depends_on = depends_on.iter().map(|key| key.to_string()).collect();
        self.domain = Arc::new(domain);
        self
    }

    /// Domain taken from a global context entry holding an array of options.
    pub fn with_global_options(self, global_name: &str) -> Self {
        let global_name = global_name.to_string();
        self.with_domain(&[], move |context| match context.global(&global_name) {
            Some(Value::Array(options)) if !options.is_empty() => ValueDomain::Options(options.clone()),
            _ => ValueDomain::Unavailable(format!("no {global_name} available")),
        })
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    pub fn with_fixup<F>(mut self, fixup: F) -> Self
    where
        F: Fn(Option<&Value>, &ValueDomain) -> Option<Value> + Send + Sync + 'static,
    {
        self.fixup = Some(Arc::new(fixup));
        self
    }

    /// A missing value does not invalidate the node.
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    /// Purely visual setting: excluded from fetch keys.
    pub fn visual(mut self) -> Self {
        self.fetch_relevant = false;
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn depends_on(&self) -> &[String] {
        &self.depends_on
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    pub fn is_fetch_relevant(&self) -> bool {
        self.fetch_relevant
    }

    pub(crate) fn evaluate_domain(&self, context: &DomainContext<'_>) -> ValueDomain {
        (self.domain)(context)
    }

    pub(crate) fn fix(&self, current: Option<&Value>, domain: &ValueDomain) -> Option<Value> {
        match &self.fixup {
            Some(fixup) => fixup(current, domain).filter(|value| domain.accepts(value)),
            None => domain.default_fixup(current, self.default.as_ref()),
        }
    }
}

/// Immutable table of setting definitions, built once at startup.
#[derive(Debug, Clone, Default)]
pub struct SettingsRegistry {
    definitions: IndexMap<String, SettingDefinition>,
}

impl SettingsRegistry {
    pub fn builder() -> SettingsRegistryBuilder {
        SettingsRegistryBuilder::default()
    }

    pub fn get(&self, key: &str) -> Option<&SettingDefinition> {
        self.definitions.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.definitions.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.definitions.keys().map(String::as_str)
    }

    /// Every setting `key` reads, directly or through other settings' domains.
    pub fn transitive_dependencies(&self, key: &str) -> Vec<String> {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut ordered = Vec::new();
        let mut queue: VecDeque<&str> = VecDeque::from([key]);
        while let Some(current) = queue.pop_front() {
            let Some(definition) = self.definitions.get(current) else {
                continue;
            };
            for dependency in &definition.depends_on {
                if seen.insert(dependency.as_str()) {
                    ordered.push(dependency.clone());
                    queue.push_back(dependency.as_str());
                }
            }
        }
        ordered
    }
}

#[derive(Debug, Default)]
pub struct SettingsRegistryBuilder {
    definitions: Vec<SettingDefinition>,
}

impl SettingsRegistryBuilder {
    pub fn register(mut self, definition: SettingDefinition) -> Self {
        self.definitions.push(definition);
        self
    }

    /// Validates the dependency graph and freezes the table.
    ///
    /// Rejects duplicate keys, unknown dependencies, self dependencies and cycles.
    pub fn build(self) -> Result<SettingsRegistry, StructuralError> {
        let mut definitions: IndexMap<String, SettingDefinition> = IndexMap::new();
        for definition in self.definitions {
            if definitions.contains_key(&definition.key) {
                return Err(StructuralError::DuplicateSetting(definition.key));
            }
            definitions.insert(definition.key.clone(), definition);
        }
        ensure_acyclic(&definitions)?;
        Ok(SettingsRegistry { definitions })
    }
}

fn ensure_acyclic(definitions: &IndexMap<String, SettingDefinition>) -> Result<(), StructuralError> {
    let mut in_degrees: HashMap<&str, usize> = definitions.keys().map(|key| (key.as_str(), 0)).collect();
    let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();

    for (key, definition) in definitions {
        let mut seen_dependencies = HashSet::new();
        for dependency in &definition.depends_on {
            if !definitions.contains_key(dependency) {
                return Err(StructuralError::UnknownDependency {
                    setting: key.clone(),
                    dependency: dependency.clone(),
                });
            }
            if dependency == key {
                return Err(StructuralError::DependencyCycle(vec![key.clone()]));
            }
            if !seen_dependencies.insert(dependency) {
                continue;
            }
            if let Some(degree) = in_degrees.get_mut(key.as_str()) {
                *degree += 1;
            }
            adjacency.entry(dependency.as_str()).or_default().push(key.as_str());
        }
    }

    let mut queue: VecDeque<&str> = definitions
        .keys()
        .map(String::as_str)
        .filter(|key| in_degrees.get(key).copied().unwrap_or(0) == 0)
        .collect();

    let mut visited = 0;
    while let Some(key) = queue.pop_front() {
        visited += 1;
        if let Some(dependents) = adjacency.get(key) {
            for dependent in dependents {
                if let Some(degree) = in_degrees.get_mut(dependent) {
                    *degree -= 1;
                    if *degree == 0 {
                        queue.push_back(*dependent);
                    }
                }
            }
        }
    }

    if visited != definitions.len() {
        let mut remaining: Vec<String> = in_degrees
            .into_iter()
            .filter(|(_, degree)| *degree > 0)
            .map(|(key, _)| key.to_string())
            .collect();
        remaining.sort();
        return Err(StructuralError::DependencyCycle(remaining));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn options_domain(values: Vec<Value>) -> impl Fn(&DomainContext<'_>) -> ValueDomain + Send + Sync + 'static {
        move |_| ValueDomain::Options(values.clone())
    }

    #[test]
    fn build_accepts_dependency_chains_declared_out_of_order() {
        let registry = SettingsRegistry::builder()
            .register(SettingDefinition::new("realization").with_domain(&["ensemble"], options_domain(vec![json!(1)])))
            .register(SettingDefinition::new("ensemble").with_global_options("ensembles"))
            .register(SettingDefinition::new("attribute").with_domain(&["realization", "ensemble"], options_domain(vec![json!("depth")])))
            .build()
            .expect("registry");

        assert_eq!(registry.transitive_dependencies("attribute"), vec!["realization".to_string(), "ensemble".to_string()]);
        assert!(registry.transitive_dependencies("ensemble").is_empty());
    }

    #[test]
    fn build_rejects_cycles() {
        let error = SettingsRegistry::builder()
            .register(SettingDefinition::new("ensemble").with_domain(&["realization"], options_domain(vec![])))
            .register(SettingDefinition::new("realization").with_domain(&["ensemble"], options_domain(vec![])))
            .register(SettingDefinition::new("color").visual())
            .build()
            .expect_err("cycle");

        assert_eq!(error, StructuralError::DependencyCycle(vec!["ensemble".into(), "realization".into()]));
    }

    #[test]
    fn build_rejects_self_and_unknown_dependencies() {
        let self_dependency = SettingsRegistry::builder()
            .register(SettingDefinition::new("ensemble").with_domain(&["ensemble"], options_domain(vec![])))
            .build()
            .expect_err("self dependency");
        assert!(matches!(self_dependency, StructuralError::DependencyCycle(_)));

        let unknown = SettingsRegistry::builder()
            .register(SettingDefinition::new("realization").with_domain(&["ensemble"], options_domain(vec![])))
            .build()
            .expect_err("unknown dependency");
        assert_eq!(
            unknown,
            StructuralError::UnknownDependency {
                setting: "realization".into(),
                dependency: "ensemble".into()
            }
        );
    }

    #[test]
    fn build_rejects_duplicate_keys() {
        let error = SettingsRegistry::builder()
            .register(SettingDefinition::new("color"))
            .register(SettingDefinition::new("color"))
            .build()
            .expect_err("duplicate");
        assert_eq!(error, StructuralError::DuplicateSetting("color".into()));
    }

    #[test]
    fn custom_fixup_results_outside_the_domain_are_dropped() {
        let definition = SettingDefinition::new("realization").with_fixup(|_, _| Some(json!(99)));
        let domain = ValueDomain::Options(vec![json!(1), json!(2)]);
        assert_eq!(definition.fix(None, &domain), None);
    }
}
