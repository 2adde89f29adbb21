//! Tree nodes and the provider status state machine.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde_json::Value;
use strata_types::{NodeId, NodeKind, NodeStatus};

use crate::provider::CacheKey;

/// Attributes shared by both node kinds.
#[derive(Debug, Clone)]
pub(crate) struct NodeHeader {
    pub id: NodeId,
    pub node_type: String,
    pub name: String,
    pub enabled: bool,
    /// Own setting values. Inherited values are never written here; fixups are.
    pub settings: IndexMap<String, Value>,
    /// Process-unique token distinguishing re-created nodes that reuse an id.
    pub instance: u64,
}

#[derive(Debug, Clone)]
pub(crate) enum Node {
    Provider(ProviderNode),
    Group(GroupNode),
}

#[derive(Debug, Clone)]
pub(crate) struct ProviderNode {
    pub header: NodeHeader,
    pub state: ProviderState,
}

#[derive(Debug, Clone)]
pub(crate) struct GroupNode {
    pub header: NodeHeader,
    pub children: Vec<NodeId>,
}

impl Node {
    pub fn header(&self) -> &NodeHeader {
        match self {
            Node::Provider(provider) => &provider.header,
            Node::Group(group) => &group.header,
        }
    }

    pub fn header_mut(&mut self) -> &mut NodeHeader {
        match self {
            Node::Provider(provider) => &mut provider.header,
            Node::Group(group) => &mut group.header,
        }
    }

    pub fn kind(&self) -> NodeKind {
        match self {
            Node::Provider(_) => NodeKind::Provider,
            Node::Group(_) => NodeKind::Group,
        }
    }

    pub fn id(&self) -> &NodeId {
        &self.header().id
    }

    pub fn children(&self) -> &[NodeId] {
        match self {
            Node::Provider(_) => &[],
            Node::Group(group) => &group.children,
        }
    }

    pub fn as_provider(&self) -> Option<&ProviderNode> {
        match self {
            Node::Provider(provider) => Some(provider),
            Node::Group(_) => None,
        }
    }

    pub fn as_provider_mut(&mut self) -> Option<&mut ProviderNode> {
        match self {
            Node::Provider(provider) => Some(provider),
            Node::Group(_) => None,
        }
    }

    pub fn as_group_mut(&mut self) -> Option<&mut GroupNode> {
        match self {
            Node::Provider(_) => None,
            Node::Group(group) => Some(group),
        }
    }
}

/// What the walk must do with the query cache after a state transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum FetchDirective {
    /// Nothing to start or cancel.
    Keep,
    /// Leave the request for the given key.
    Cancel(CacheKey),
    /// Start or join a request for `key`, leaving `cancel` first when set.
    Start { key: CacheKey, cancel: Option<CacheKey> },
}

/// Fetch state of a provider.
///
/// `key` always names the cache key the current status refers to: the pending request while
/// loading, the payload's key on success and the failed request's key on error.
#[derive(Debug, Clone)]
pub(crate) struct ProviderState {
    pub status: NodeStatus,
    pub message: Option<String>,
    pub key: Option<CacheKey>,
    pub in_flight: bool,
    /// Bumped whenever a new request is issued; completions carry the generation they were
    /// issued under.
    pub generation: u64,
    pub data: Option<Arc<Value>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Default for ProviderState {
    fn default() -> Self {
        Self {
            status: NodeStatus::SettingsInvalid,
            message: None,
            key: None,
            in_flight: false,
            generation: 0,
            data: None,
            updated_at: None,
        }
    }
}

impl ProviderState {
    /// Resolution produced no valid settings snapshot.
    pub fn settings_invalid(&mut self, reason: String) -> FetchDirective {
        let directive = self.leave_in_flight();
        self.status = NodeStatus::SettingsInvalid;
        self.message = Some(reason);
        self.key = None;
        self.data = None;
        self.updated_at = None;
        directive
    }

    /// Resolution produced `key`. A request is issued only when the key differs from the one
    /// the current status already covers.
    pub fn settings_resolved(&mut self, key: CacheKey) -> FetchDirective {
        let covered = self.key.as_ref() == Some(&key)
            && matches!(self.status, NodeStatus::Loading | NodeStatus::Success | NodeStatus::Error)
            && (self.status != NodeStatus::Loading || self.in_flight);
        if covered {
            return FetchDirective::Keep;
        }

        let cancel = match self.leave_in_flight() {
            FetchDirective::Cancel(previous) => Some(previous),
            _ => None,
        };
        self.generation += 1;
        self.status = NodeStatus::Loading;
        self.message = None;
        self.key = Some(key.clone());
        self.in_flight = true;
        FetchDirective::Start { key, cancel }
    }

    /// Applies a completion issued under `generation` for `key`. Returns false when the
    /// completion is stale and was ignored.
    pub fn complete(&mut self, key: &CacheKey, generation: u64, outcome: Result<(Arc<Value>, DateTime<Utc>), String>) -> bool {
        if !self.in_flight || self.generation != generation || self.key.as_ref() != Some(key) {
            return false;
        }
        self.in_flight = false;
        match outcome {
            Ok((data, fetched_at)) => {
                self.status = NodeStatus::Success;
                self.message = None;
                self.data = Some(data);
                self.updated_at = Some(fetched_at);
            }
            Err(message) => {
                self.status = NodeStatus::Error;
                self.message = Some(message);
                self.data = None;
                self.updated_at = None;
            }
        }
        true
    }

    /// Explicit cancellation: the node keeps its key and reports an error until a retry or a
    /// settings change.
    pub fn cancel(&mut self) -> FetchDirective {
        let directive = self.leave_in_flight();
        if directive != FetchDirective::Keep {
            self.status = NodeStatus::Error;
            self.message = Some("fetch cancelled".to_string());
            self.data = None;
            self.updated_at = None;
        }
        directive
    }

    /// Forgets the failed key so the next walk issues a fresh request.
    pub fn retry(&mut self) -> bool {
        if self.status != NodeStatus::Error {
            return false;
        }
        self.key = None;
        true
    }

    /// Teardown on removal.
    pub fn detach(&mut self) -> FetchDirective {
        self.leave_in_flight()
    }

    fn leave_in_flight(&mut self) -> FetchDirective {
        if !self.in_flight {
            return FetchDirective::Keep;
        }
        self.in_flight = false;
        match self.key.clone() {
            Some(key) => FetchDirective::Cancel(key),
            None => FetchDirective::Keep,
        }
    }
}
