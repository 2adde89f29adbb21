//! Group types, shared settings and accumulators.
//!
//! A group type decides which of its settings flow down to its descendants (and, with
//! [`ShareScope::DescendantsAndLaterSiblings`], to its later siblings), which children it
//! accepts, and optionally how its children's outputs are folded into named stored data.

mod registry;

use std::fmt::Debug;

use serde_json::Value;
use strata_types::{Annotation, BoundingBox, Layer, NodeId, NodeKind, NodeStatus};

pub use registry::GroupRegistry;

/// Reach of a group's shared settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ShareScope {
    /// Children and their descendants.
    #[default]
    Descendants,
    /// Additionally the group's later siblings and their descendants.
    DescendantsAndLaterSiblings,
}

/// Output of one child, handed to the parent's accumulator in child order.
#[derive(Debug, Clone, Copy)]
pub struct ChildOutput<'a> {
    pub node_id: &'a NodeId,
    pub kind: NodeKind,
    pub node_type: &'a str,
    /// Provider status; `None` for groups.
    pub status: Option<NodeStatus>,
    pub bounding_box: Option<&'a BoundingBox>,
    pub annotations: &'a [Annotation],
    pub layers: &'a [Layer],
    /// Final accumulated value of a child group.
    pub stored_data: Option<&'a Value>,
}

/// Pure reduction over a group's children.
pub trait Accumulator: Send + Sync + Debug {
    /// Name under which partial and final values are published.
    fn stored_data_name(&self) -> &str;

    fn initial(&self) -> Value;

    fn accumulate(&self, accumulated: Value, child: &ChildOutput<'_>) -> Value;
}

/// Implementation bundle of one group type.
pub trait GroupType: Send + Sync + Debug {
    fn settings(&self) -> &[&'static str] {
        &[]
    }

    /// Subset of [`GroupType::settings`] inherited by nodes in the share scope.
    fn shared_settings(&self) -> &[&'static str] {
        &[]
    }

    fn share_scope(&self) -> ShareScope {
        ShareScope::Descendants
    }

    fn accepts_child(&self, _kind: NodeKind, _node_type: &str) -> bool {
        true
    }

    fn accumulator(&self) -> Option<&dyn Accumulator> {
        None
    }
}

/// Plain container: no settings, accepts anything.
#[derive(Debug, Default)]
pub struct BasicGroup;

impl GroupType for BasicGroup {}

/// Group sharing a fixed list of settings.
#[derive(Debug, Clone)]
pub struct SharingGroup {
    settings: Vec<&'static str>,
    scope: ShareScope,
}

impl SharingGroup {
    pub fn new(settings: &[&'static str]) -> Self {
        Self {
            settings: settings.to_vec(),
            scope: ShareScope::Descendants,
        }
    }

    pub fn with_scope(mut self, scope: ShareScope) -> Self {
        self.scope = scope;
        self
    }
}

impl GroupType for SharingGroup {
    fn settings(&self) -> &[&'static str] {
        &self.settings
    }

    fn shared_settings(&self) -> &[&'static str] {
        &self.settings
    }

    fn share_scope(&self) -> ShareScope {
        self.scope
    }
}
