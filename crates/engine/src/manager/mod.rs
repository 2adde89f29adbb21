//! The data provider manager.
//!
//! Owns the tree, the settings memo, the query cache and the subscription channels, and is
//! driven from a single logical thread through `&mut self`:
//!
//! - mutations (`add_node`, `move_node`, `set_setting`, ...) validate a candidate tree and only
//!   then commit it
//! - [`DataProviderManager::assemble`] runs one synchronous walk and publishes notifications
//! - [`DataProviderManager::poll_fetches`], [`DataProviderManager::wait_for_fetch`] and
//!   [`DataProviderManager::settle`] apply fetch completions reported by tokio tasks

mod mutation;
mod serialization;
mod subscriptions;

use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::Value;
use strata_types::{AssemblyResult, NodeId, NodeKind, NodeStatus, Notification, Topic};
use tokio::{runtime::Handle, sync::broadcast};
use tracing::{debug, info};

use crate::{
    assembler::{self, PlanOutcome, ProviderPlan},
    config::EngineConfig,
    error::StructuralError,
    provider::{FetchCompletion, QueryCache, Subscriber},
    registries::Registries,
    settings::{
        GlobalContext, MemoStats,
        resolve::{ResolutionPass, SettingsMemo},
    },
    tree::{FetchDirective, GroupNode, Node, NodeHeader, Tree},
};
use subscriptions::Notifier;

const ROOT_ID: &str = "root";

#[derive(Debug)]
pub struct DataProviderManager {
    registries: Registries,
    tree: Tree,
    globals: GlobalContext,
    memo: SettingsMemo,
    cache: QueryCache,
    notifier: Notifier,
    next_serial: u64,
    next_instance: u64,
    shape_revision: u64,
    shape_changed: bool,
    result_revision: u64,
    last_result: Option<AssemblyResult>,
    last_statuses: IndexMap<NodeId, NodeStatus>,
}

impl DataProviderManager {
    /// Creates a manager whose tree holds a single root group of `root_type`.
    ///
    /// Must be called from within a tokio runtime: fetches are spawned on that runtime, so
    /// [`assemble`](Self::assemble) may later run from plain synchronous code.
    pub fn new(registries: Registries, root_type: &str, config: EngineConfig) -> Result<Self, StructuralError> {
        match registries.kind_of(root_type) {
            Some(NodeKind::Group) => {}
            Some(kind) => return Err(StructuralError::InvalidRoot(kind)),
            None => return Err(StructuralError::UnknownNodeType(root_type.to_string())),
        }
        let runtime = Handle::try_current().map_err(|_| StructuralError::NoRuntime)?;

        let mut manager = Self {
            registries,
            tree: Tree::new(GroupNode {
                header: NodeHeader {
                    id: NodeId::from(ROOT_ID),
                    node_type: root_type.to_string(),
                    name: root_type.to_string(),
                    enabled: true,
                    settings: IndexMap::new(),
                    instance: 0,
                },
                children: Vec::new(),
            }),
            globals: GlobalContext::default(),
            memo: SettingsMemo::default(),
            cache: QueryCache::new(config.stale_time(), runtime),
            notifier: Notifier::new(config.notification_capacity),
            next_serial: 0,
            next_instance: 0,
            shape_revision: 0,
            shape_changed: true,
            result_revision: 0,
            last_result: None,
            last_statuses: IndexMap::new(),
        };
        let instance = manager.allocate_instance();
        if let Some(root) = manager.tree.node_mut(&NodeId::from(ROOT_ID)) {
            root.header_mut().instance = instance;
        }
        Ok(manager)
    }

    pub fn root_id(&self) -> &NodeId {
        self.tree.root_id()
    }

    pub fn registries(&self) -> &Registries {
        &self.registries
    }

    pub fn contains(&self, node_id: &NodeId) -> bool {
        self.tree.contains(node_id)
    }

    /// Child ids of a group in order; empty for providers and unknown nodes.
    pub fn children(&self, node_id: &NodeId) -> &[NodeId] {
        self.tree.children(node_id)
    }

    pub fn parent(&self, node_id: &NodeId) -> Option<&NodeId> {
        self.tree.parent(node_id)
    }

    pub fn kind(&self, node_id: &NodeId) -> Option<NodeKind> {
        self.tree.node(node_id).map(Node::kind)
    }

    pub fn name(&self, node_id: &NodeId) -> Option<&str> {
        self.tree.node(node_id).map(|node| node.header().name.as_str())
    }

    /// Own value of a setting as stored on the node, fixups included.
    pub fn setting(&self, node_id: &NodeId, key: &str) -> Option<&Value> {
        self.tree.node(node_id).and_then(|node| node.header().settings.get(key))
    }

    /// Value the node would see for `key` if a walk ran now. Fixups are not persisted.
    pub fn resolved_setting(&mut self, node_id: &NodeId, key: &str) -> Result<Option<Value>, StructuralError> {
        if !self.tree.contains(node_id) {
            return Err(StructuralError::UnknownNode(node_id.clone()));
        }
        let mut pass = ResolutionPass::new(&self.tree, &self.registries, &self.globals, &mut self.memo);
        Ok(pass.resolve(node_id, key).value)
    }

    /// Provider status; `None` for groups and unknown nodes.
    pub fn status(&self, node_id: &NodeId) -> Option<NodeStatus> {
        self.tree.node(node_id)?.as_provider().map(|provider| provider.state.status)
    }

    /// Payload of the last successful fetch.
    pub fn data(&self, node_id: &NodeId) -> Option<Arc<Value>> {
        self.tree.node(node_id)?.as_provider()?.state.data.clone()
    }

    /// Error or invalid-settings message of a provider.
    pub fn message(&self, node_id: &NodeId) -> Option<&str> {
        self.tree.node(node_id)?.as_provider()?.state.message.as_deref()
    }

    /// Updates a global context value read by domain functions. Returns true on change.
    pub fn set_global_context(&mut self, name: impl Into<String>, value: Value) -> bool {
        self.globals.set(name, value)
    }

    pub fn remove_global_context(&mut self, name: &str) -> bool {
        self.globals.remove(name)
    }

    pub fn global_context(&self) -> &GlobalContext {
        &self.globals
    }

    pub fn subscribe(&mut self, topic: Topic) -> broadcast::Receiver<Notification> {
        self.notifier.subscribe(topic)
    }

    /// Result of the latest walk.
    pub fn last_result(&self) -> Option<&AssemblyResult> {
        self.last_result.as_ref()
    }

    /// Number of requests dispatched to provider fetch functions so far.
    pub fn fetch_count(&self) -> u64 {
        self.cache.dispatched()
    }

    pub fn memo_stats(&self) -> MemoStats {
        self.memo.stats()
    }

    /// Providers whose settings are invalid right now, with the reason.
    ///
    /// Resolution only: fixups are not persisted, provider states are left alone and nothing
    /// is fetched.
    pub fn invalid_settings(&mut self) -> IndexMap<NodeId, String> {
        assembler::resolve_providers(&self.tree, &self.registries, &self.globals, &mut self.memo)
            .plans
            .into_iter()
            .filter_map(|(node_id, plan)| match plan.outcome {
                PlanOutcome::Invalid(reason) => Some((node_id, reason)),
                PlanOutcome::Fetch(_) => None,
            })
            .collect()
    }

    /// Drops cached payloads so the next walk refetches every provider whose key changes.
    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }

    /// Runs one walk: resolves a settings snapshot, starts, joins or cancels fetches, runs
    /// transformers of `SUCCESS` providers and aggregates the result. Notifications for the
    /// changes this walk observed are sent before it returns.
    pub fn assemble(&mut self) -> &AssemblyResult {
        self.cache.prune_stale();
        let pass = assembler::resolve_providers(&self.tree, &self.registries, &self.globals, &mut self.memo);

        for (node_id, key, value) in pass.fixups {
            if let Some(node) = self.tree.node_mut(&node_id) {
                debug!(node_id = %node_id, key = %key, value = %value, "persisting fixed-up setting");
                node.header_mut().settings.insert(key, value);
            }
        }
        for (node_id, plan) in &pass.plans {
            self.apply_plan(node_id, plan);
        }

        let result = assembler::collect(&self.tree, &self.registries, &pass.plans);
        self.publish(result)
    }

    /// Applies every completion already reported, without waiting. Returns how many changed
    /// a node.
    pub fn poll_fetches(&mut self) -> usize {
        let mut applied = 0;
        while let Some(completion) = self.cache.try_next_completion() {
            if self.apply_completion(completion) {
                applied += 1;
            }
        }
        applied
    }

    /// Waits until a completion changes a node. Returns false when nothing is in flight.
    pub async fn wait_for_fetch(&mut self) -> bool {
        while let Some(completion) = self.cache.next_completion().await {
            if self.apply_completion(completion) {
                return true;
            }
        }
        false
    }

    /// Alternates walks and completions until no fetch is in flight, then returns the final
    /// result.
    pub async fn settle(&mut self) -> &AssemblyResult {
        loop {
            self.assemble();
            if !self.cache.has_in_flight() || !self.wait_for_fetch().await {
                break;
            }
            self.poll_fetches();
        }
        self.last_result.get_or_insert_with(AssemblyResult::default)
    }

    fn apply_plan(&mut self, node_id: &NodeId, plan: &ProviderPlan) {
        let Some(node) = self.tree.node_mut(node_id).and_then(Node::as_provider_mut) else {
            return;
        };
        let directive = match &plan.outcome {
            PlanOutcome::Invalid(reason) => node.state.settings_invalid(reason.clone()),
            PlanOutcome::Fetch(request) => node.state.settings_resolved(request.cache_key.clone()),
        };
        let subscriber = Subscriber {
            node_id: node_id.clone(),
            instance: node.header.instance,
            generation: node.state.generation,
        };
        let node_type = node.header.node_type.clone();

        match directive {
            FetchDirective::Keep => {}
            FetchDirective::Cancel(key) => {
                self.cache.leave(&key, node_id, subscriber.instance);
            }
            FetchDirective::Start { key, cancel } => {
                if let Some(previous) = cancel {
                    self.cache.leave(&previous, node_id, subscriber.instance);
                }
                let (PlanOutcome::Fetch(request), Some(provider)) = (&plan.outcome, self.registries.provider(&node_type)) else {
                    return;
                };
                let start = self.cache.begin(request.clone(), Arc::clone(provider), subscriber);
                debug!(node_id = %node_id, cache_key = %key, ?start, "provider loading");
            }
        }
    }

    /// Leaves the request a cancel or teardown directive names.
    fn leave_request(&mut self, node_id: &NodeId, instance: u64, directive: FetchDirective) {
        if let FetchDirective::Cancel(key) = directive
            && self.cache.leave(&key, node_id, instance)
        {
            debug!(node_id = %node_id, cache_key = %key, "request aborted, no subscribers left");
        }
    }

    fn apply_completion(&mut self, completion: FetchCompletion) -> bool {
        let Some(settled) = self.cache.settle(completion) else {
            return false;
        };
        let mut applied = false;
        for subscriber in settled.subscribers {
            let Some(node) = self.tree.node_mut(&subscriber.node_id).and_then(Node::as_provider_mut) else {
                debug!(node_id = %subscriber.node_id, "discarding completion for removed node");
                continue;
            };
            if node.header.instance != subscriber.instance {
                debug!(node_id = %subscriber.node_id, "discarding completion for replaced node");
                continue;
            }
            if node.state.complete(&settled.cache_key, subscriber.generation, settled.outcome.clone()) {
                applied = true;
            } else {
                debug!(node_id = %subscriber.node_id, generation = subscriber.generation, "discarding stale completion");
            }
        }
        applied
    }

    fn publish(&mut self, result: AssemblyResult) -> &AssemblyResult {
        if self.shape_changed {
            self.shape_changed = false;
            self.notifier.send(Notification::TreeShapeChanged {
                revision: self.shape_revision,
            });
        }

        let statuses: IndexMap<NodeId, NodeStatus> = result
            .per_node_status
            .iter()
            .map(|(node_id, report)| (node_id.clone(), report.status))
            .collect();
        for (node_id, status) in &statuses {
            let previous = self.last_statuses.get(node_id).copied();
            if previous != Some(*status) {
                self.notifier.send(Notification::NodeStatusChanged {
                    node_id: node_id.clone(),
                    previous,
                    current: Some(*status),
                });
            }
        }
        for (node_id, previous) in &self.last_statuses {
            if !statuses.contains_key(node_id) {
                self.notifier.send(Notification::NodeStatusChanged {
                    node_id: node_id.clone(),
                    previous: Some(*previous),
                    current: None,
                });
            }
        }
        self.last_statuses = statuses;

        if self.last_result.as_ref() != Some(&result) {
            self.result_revision += 1;
            info!(
                revision = self.result_revision,
                layers = result.layers.len(),
                annotations = result.annotations.len(),
                "assembly result changed"
            );
            self.notifier.send(Notification::AggregateResultChanged {
                revision: self.result_revision,
            });
        }
        self.last_result.insert(result)
    }

    fn allocate_instance(&mut self) -> u64 {
        self.next_instance += 1;
        self.next_instance
    }

    fn mark_shape_changed(&mut self) {
        self.shape_revision += 1;
        self.shape_changed = true;
    }
}
