//! Fixtures shared by unit tests.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};
use strata_types::{BoundingBox, NodeId};

use crate::{
    group::{BasicGroup, GroupRegistry, ShareScope, SharingGroup},
    provider::{DataProviderType, FetchRequest, ProviderRegistry, TransformerContext},
    registries::Registries,
    settings::{SettingDefinition, SettingsRegistry, ValueDomain},
    tree::{GroupNode, Node, Tree, tests::header},
};

/// Provider echoing its fetch request; the bounding box comes from the `extent` field.
#[derive(Debug)]
pub(crate) struct EchoProvider;

#[async_trait]
impl DataProviderType for EchoProvider {
    fn settings(&self) -> &[&'static str] {
        &["ensemble", "realization", "color"]
    }

    async fn fetch_data(&self, request: FetchRequest) -> anyhow::Result<Value> {
        let realization = request.setting_as::<f64>("realization").unwrap_or_default();
        Ok(json!({ "extent": [realization, realization + 1.0] }))
    }

    fn make_bounding_box(&self, context: &TransformerContext<'_>) -> Option<BoundingBox> {
        let extent: [f64; 2] = serde_json::from_value(context.data().get("extent")?.clone()).ok()?;
        Some(BoundingBox::new([extent[0], extent[0], 0.0], [extent[1], extent[1], 0.0]))
    }
}

/// `ensemble` from the global context, `realization` in `0..=9` once an ensemble is known,
/// and a visual `color`.
pub(crate) fn settings() -> SettingsRegistry {
    SettingsRegistry::builder()
        .register(SettingDefinition::new("ensemble").with_global_options("ensembles"))
        .register(SettingDefinition::new("realization").with_domain(&["ensemble"], |context| match context.setting("ensemble") {
            Some(_) => ValueDomain::Range { min: 0.0, max: 9.0 },
            None => ValueDomain::Unavailable("no ensemble selected".into()),
        }))
        .register(SettingDefinition::new("color").visual().with_default(json!("gray")))
        .build()
        .expect("settings registry")
}

/// Root type `root` shares `ensemble`; `ensemble-view` shares it with later siblings too;
/// `view` is a plain container; `surface` is the echo provider.
pub(crate) fn registries() -> Registries {
    Registries::new(
        settings(),
        ProviderRegistry::default().with_type("surface", Arc::new(EchoProvider)),
        GroupRegistry::default()
            .with_type("root", Arc::new(SharingGroup::new(&["ensemble"])))
            .with_type(
                "ensemble-view",
                Arc::new(SharingGroup::new(&["ensemble"]).with_scope(ShareScope::DescendantsAndLaterSiblings)),
            )
            .with_type("view", Arc::new(BasicGroup)),
    )
    .expect("registries")
}

pub(crate) fn root_tree() -> Tree {
    Tree::new(GroupNode {
        header: header("root", "root"),
        children: Vec::new(),
    })
}

pub(crate) fn typed_group(id: &str, node_type: &str) -> Node {
    Node::Group(GroupNode {
        header: header(id, node_type),
        children: Vec::new(),
    })
}

pub(crate) fn set(tree: &mut Tree, id: &str, key: &str, value: Value) {
    if let Some(node) = tree.node_mut(&NodeId::from(id)) {
        node.header_mut().settings.insert(key.to_string(), value);
    }
}
