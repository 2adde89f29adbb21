//! Visualization assembly.
//!
//! A walk has three phases:
//! 1. [`resolve_providers`] takes one settings snapshot of every enabled node and derives each
//!    provider's fetch request (or the reason its settings are invalid).
//! 2. The manager applies the snapshot to provider states and the query cache.
//! 3. [`collect`] walks the tree in document order, runs transformers of `SUCCESS` providers,
//!    folds group accumulators and unions bounding boxes into an [`AssemblyResult`].

use indexmap::IndexMap;
use serde_json::Value;
use strata_types::{Annotation, AssemblyResult, BoundingBox, Layer, NodeId, NodeStatus, NodeStatusReport};

use crate::{
    group::{Accumulator, ChildOutput},
    provider::{CacheKey, FetchRequest, TransformerContext, derive_key},
    registries::Registries,
    settings::{
        GlobalContext,
        resolve::{ResolutionPass, SettingsMemo},
    },
    tree::{Node, ProviderNode, Tree},
};

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum PlanOutcome {
    Invalid(String),
    Fetch(FetchRequest),
}

/// Snapshot of one provider for the current walk.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ProviderPlan {
    pub settings: IndexMap<String, Value>,
    pub outcome: PlanOutcome,
}

#[derive(Debug, Default)]
pub(crate) struct ResolvedPass {
    /// Enabled providers in document order.
    pub plans: IndexMap<NodeId, ProviderPlan>,
    pub fixups: Vec<(NodeId, String, Value)>,
}

/// Phase 1: resolves every enabled node against one consistent snapshot.
pub(crate) fn resolve_providers(tree: &Tree, registries: &Registries, globals: &GlobalContext, memo: &mut SettingsMemo) -> ResolvedPass {
    let mut pass = ResolutionPass::new(tree, registries, globals, memo);
    let mut plans = IndexMap::new();

    for node_id in tree.document_order() {
        if !tree.is_effectively_enabled(&node_id) {
            continue;
        }
        let resolution = pass.resolve_node(&node_id);
        let Some(Node::Provider(node)) = tree.node(&node_id) else {
            continue;
        };
        let node_type = node.header.node_type.as_str();
        let outcome = match (registries.provider(node_type), resolution.invalid) {
            (None, _) => PlanOutcome::Invalid(format!("unknown provider type '{node_type}'")),
            (Some(_), Some(reason)) => PlanOutcome::Invalid(reason),
            (Some(provider), None) => {
                let relevant = registries.fetch_relevant_settings(node_type);
                let request = FetchRequest {
                    cache_key: CacheKey::new(node_type, derive_key(&resolution.settings, &relevant)),
                    settings: relevant
                        .iter()
                        .filter_map(|key| resolution.settings.get(*key).map(|value| (key.to_string(), value.clone())))
                        .collect(),
                };
                match provider.validate_settings(&request) {
                    Ok(()) => PlanOutcome::Fetch(request),
                    Err(reason) => PlanOutcome::Invalid(reason),
                }
            }
        };
        plans.insert(
            node_id,
            ProviderPlan {
                settings: resolution.settings,
                outcome,
            },
        );
    }

    ResolvedPass {
        plans,
        fixups: pass.into_fixups(),
    }
}

#[derive(Debug, Default)]
struct Output {
    bounding_box: Option<BoundingBox>,
    annotations: Vec<Annotation>,
    layers: Vec<Layer>,
    stored_data: Option<Value>,
}

impl Output {
    fn absorb(&mut self, child: Output) {
        self.bounding_box = match (self.bounding_box.take(), child.bounding_box) {
            (Some(current), Some(other)) => Some(current.union(&other)),
            (current, other) => current.or(other),
        };
        self.annotations.extend(child.annotations);
        self.layers.extend(child.layers);
    }
}

/// Phase 3: runs transformers and folds the tree into the aggregate result.
pub(crate) fn collect(tree: &Tree, registries: &Registries, plans: &IndexMap<NodeId, ProviderPlan>) -> AssemblyResult {
    let mut collector = Collector {
        tree,
        registries,
        plans,
        scopes: vec![IndexMap::new()],
        empty: IndexMap::new(),
    };
    let root = tree.root_id().clone();
    let output = collector.visit_group(&root, true);

    AssemblyResult {
        bounding_box: output.bounding_box,
        annotations: output.annotations,
        layers: output.layers,
        per_node_status: status_reports(tree),
        stored_data: collector.scopes.pop().unwrap_or_default(),
    }
}

/// Status of every provider in document order, disabled ones included.
pub(crate) fn status_reports(tree: &Tree) -> IndexMap<NodeId, NodeStatusReport> {
    tree.document_order()
        .into_iter()
        .filter_map(|node_id| {
            let provider = tree.node(&node_id)?.as_provider()?;
            let report = NodeStatusReport {
                status: provider.state.status,
                message: provider.state.message.clone(),
                enabled: tree.is_effectively_enabled(&node_id),
                updated_at: provider.state.updated_at,
            };
            Some((node_id, report))
        })
        .collect()
}

struct Collector<'a> {
    tree: &'a Tree,
    registries: &'a Registries,
    plans: &'a IndexMap<NodeId, ProviderPlan>,
    /// Stored-data frames, root first. Each group being visited owns the innermost frame.
    scopes: Vec<IndexMap<String, Value>>,
    empty: IndexMap<String, Value>,
}

impl<'a> Collector<'a> {
    fn visit_group(&mut self, group_id: &NodeId, is_root: bool) -> Output {
        let tree = self.tree;
        let Some(Node::Group(group)) = tree.node(group_id) else {
            return Output::default();
        };
        let accumulator: Option<&'a dyn Accumulator> = self
            .registries
            .group(&group.header.node_type)
            .and_then(|group_type| group_type.accumulator());

        if !is_root {
            self.scopes.push(IndexMap::new());
        }
        let mut fold = accumulator.map(|accumulator| (accumulator, accumulator.initial()));
        if let Some((accumulator, initial)) = &fold {
            self.publish(accumulator.stored_data_name(), initial.clone());
        }

        let mut output = Output::default();
        for child_id in &group.children {
            let Some(child) = tree.node(child_id) else {
                continue;
            };
            if !child.header().enabled {
                continue;
            }
            let child_output = match child {
                Node::Provider(provider) => self.visit_provider(child_id, provider),
                Node::Group(_) => self.visit_group(child_id, false),
            };

            if let Some((accumulator, accumulated)) = fold.as_mut() {
                let view = ChildOutput {
                    node_id: child_id,
                    kind: child.kind(),
                    node_type: &child.header().node_type,
                    status: child.as_provider().map(|provider| provider.state.status),
                    bounding_box: child_output.bounding_box.as_ref(),
                    annotations: &child_output.annotations,
                    layers: &child_output.layers,
                    stored_data: child_output.stored_data.as_ref(),
                };
                *accumulated = accumulator.accumulate(std::mem::take(accumulated), &view);
                let partial = accumulated.clone();
                self.publish(accumulator.stored_data_name(), partial);
            }
            output.absorb(child_output);
        }

        if !is_root {
            self.scopes.pop();
        }
        if let Some((accumulator, accumulated)) = fold {
            self.publish(accumulator.stored_data_name(), accumulated.clone());
            output.stored_data = Some(accumulated);
        }
        output
    }

    fn visit_provider(&mut self, node_id: &NodeId, node: &ProviderNode) -> Output {
        if node.state.status != NodeStatus::Success {
            return Output::default();
        }
        let (Some(data), Some(provider)) = (node.state.data.as_ref(), self.registries.provider(&node.header.node_type)) else {
            return Output::default();
        };
        let settings = self.plans.get(node_id).map(|plan| &plan.settings).unwrap_or(&self.empty);
        let context = TransformerContext {
            node_id,
            name: &node.header.name,
            data,
            settings,
            scopes: &self.scopes,
        };

        let bounding_box = provider.make_bounding_box(&context);
        let annotations = provider
            .make_annotations(&context)
            .into_iter()
            .enumerate()
            .map(|(index, color_scale)| Annotation {
                id: format!("{node_id}/annotation-{index}"),
                node_id: node_id.clone(),
                name: node.header.name.clone(),
                color_scale,
            })
            .collect();
        let layers = provider
            .make_visualization(&context)
            .map(|payload| Layer {
                id: format!("{node_id}/layer"),
                node_id: node_id.clone(),
                provider_type: node.header.node_type.clone(),
                name: node.header.name.clone(),
                group_id: self.tree.nearest_group(node_id),
                payload,
            })
            .into_iter()
            .collect();

        Output {
            bounding_box,
            annotations,
            layers,
            stored_data: None,
        }
    }

    fn publish(&mut self, name: &str, value: Value) {
        if let Some(frame) = self.scopes.last_mut() {
            frame.insert(name.to_string(), value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        testing::{registries, root_tree, set},
        tree::tests::provider,
    };
    use serde_json::json;

    #[test]
    fn invalid_and_disabled_providers_are_planned_accordingly() {
        let registries = registries();
        let mut globals = GlobalContext::default();
        globals.set("ensembles", json!(["iter-0"]));
        let mut memo = SettingsMemo::default();
        let mut tree = root_tree();
        tree.insert(&NodeId::from("root"), None, provider("p1"));
        tree.insert(&NodeId::from("root"), None, provider("p2"));
        tree.insert(&NodeId::from("root"), None, provider("p3"));
        set(&mut tree, "p1", "realization", json!(2));
        set(&mut tree, "p2", "ensemble", json!("iter-0"));
        set(&mut tree, "p2", "realization", json!(2));
        if let Some(node) = tree.node_mut(&NodeId::from("p3")) {
            node.header_mut().enabled = false;
        }

        let pass = resolve_providers(&tree, &registries, &globals, &mut memo);
        assert_eq!(pass.plans.len(), 2);

        // the root has no ensemble yet: it is fixed up and p1 inherits it
        let PlanOutcome::Fetch(first) = &pass.plans[&NodeId::from("p1")].outcome else {
            panic!("p1 should fetch");
        };
        let PlanOutcome::Fetch(second) = &pass.plans[&NodeId::from("p2")].outcome else {
            panic!("p2 should fetch");
        };
        assert_eq!(first.cache_key, second.cache_key);
        assert!(!first.settings.contains_key("color"));
        assert!(pass.fixups.iter().any(|(node, key, _)| node.as_str() == "root" && key == "ensemble"));
    }
}
