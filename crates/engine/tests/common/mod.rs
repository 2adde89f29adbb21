#![allow(dead_code)]

use std::{
    collections::HashSet,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use anyhow::bail;
use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::{Value, json};
use strata_engine::{
    Accumulator, ChildOutput, DataProviderManager, DataProviderType, EngineConfig, FetchRequest, GroupRegistry, GroupType,
    ProviderRegistry, Registries, SettingDefinition, SettingsRegistry, ShareScope, SharingGroup, TransformerContext, ValueDomain,
};
use strata_types::{BoundingBox, ColorScale, NodeId, NodeStatus};

/// Surface provider whose behaviour tests script: per-realization failures and a fetch delay.
#[derive(Debug, Default)]
pub struct ScriptedSurface {
    calls: AtomicUsize,
    failing: Mutex<HashSet<i64>>,
    delay: Mutex<Duration>,
}

impl ScriptedSurface {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn fail_realization(&self, realization: i64) {
        self.failing.lock().expect("failing lock").insert(realization);
    }

    pub fn heal_realization(&self, realization: i64) {
        self.failing.lock().expect("failing lock").remove(&realization);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().expect("delay lock") = delay;
    }
}

#[async_trait]
impl DataProviderType for ScriptedSurface {
    fn settings(&self) -> &[&'static str] {
        &["ensemble", "realization", "color"]
    }

    async fn fetch_data(&self, request: FetchRequest) -> anyhow::Result<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock().expect("delay lock");
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let ensemble: String = request.setting_as("ensemble").unwrap_or_default();
        let realization: i64 = request.setting_as("realization").unwrap_or_default();
        if self.failing.lock().expect("failing lock").contains(&realization) {
            bail!("network error: realization {realization} unreachable");
        }
        Ok(json!({
            "ensemble": ensemble,
            "realization": realization,
            "extent": [realization as f64, realization as f64 + 1.0],
        }))
    }

    fn make_bounding_box(&self, context: &TransformerContext<'_>) -> Option<BoundingBox> {
        let extent: [f64; 2] = serde_json::from_value(context.data().get("extent")?.clone()).ok()?;
        Some(BoundingBox::new([extent[0], extent[0], 0.0], [extent[1], extent[1], 10.0]))
    }

    fn make_annotations(&self, context: &TransformerContext<'_>) -> Vec<ColorScale> {
        let gradient: String = context.setting_as("color").unwrap_or_default();
        vec![ColorScale {
            gradient,
            min: 0.0,
            max: 1.0,
            unit: None,
        }]
    }

    fn make_visualization(&self, context: &TransformerContext<'_>) -> Option<Value> {
        Some(json!({
            "mesh": format!("{}/{}", context.data()["ensemble"].as_str().unwrap_or_default(), context.data()["realization"]),
            "color": context.setting("color"),
        }))
    }
}

/// Provider without settings that reports the stored data it sees.
#[derive(Debug, Default)]
pub struct Reader;

#[async_trait]
impl DataProviderType for Reader {
    fn settings(&self) -> &[&'static str] {
        &[]
    }

    async fn fetch_data(&self, _request: FetchRequest) -> anyhow::Result<Value> {
        Ok(json!({}))
    }

    fn make_visualization(&self, context: &TransformerContext<'_>) -> Option<Value> {
        Some(json!({ "loaded": context.stored_data("loaded") }))
    }
}

/// Collects the ids of children that produced at least one layer.
#[derive(Debug, Default)]
pub struct LoadedLayers;

impl Accumulator for LoadedLayers {
    fn stored_data_name(&self) -> &str {
        "loaded"
    }

    fn initial(&self) -> Value {
        json!([])
    }

    fn accumulate(&self, accumulated: Value, child: &ChildOutput<'_>) -> Value {
        let mut ids = match accumulated {
            Value::Array(ids) => ids,
            _ => Vec::new(),
        };
        ids.extend(child.layers.iter().map(|layer| json!(layer.node_id)));
        Value::Array(ids)
    }
}

#[derive(Debug, Default)]
pub struct CollectingGroup {
    accumulator: LoadedLayers,
}

impl GroupType for CollectingGroup {
    fn accumulator(&self) -> Option<&dyn Accumulator> {
        Some(&self.accumulator)
    }
}

/// Group that only accepts surfaces.
#[derive(Debug, Default)]
pub struct SurfaceOnlyGroup;

impl GroupType for SurfaceOnlyGroup {
    fn accepts_child(&self, _kind: strata_types::NodeKind, node_type: &str) -> bool {
        node_type == "surface"
    }
}

pub fn settings() -> SettingsRegistry {
    SettingsRegistry::builder()
        .register(SettingDefinition::new("ensemble").with_global_options("ensembles"))
        .register(SettingDefinition::new("realization").with_domain(&["ensemble"], |context| match context.setting("ensemble") {
            Some(_) => ValueDomain::Range { min: 0.0, max: 9.0 },
            None => ValueDomain::Unavailable("no ensemble selected".into()),
        }))
        .register(SettingDefinition::new("color").visual().with_default(json!("viridis")))
        .build()
        .expect("settings registry")
}

pub struct Fixture {
    pub manager: DataProviderManager,
    pub surface: Arc<ScriptedSurface>,
    pub root: NodeId,
}

pub fn fixture() -> Fixture {
    fixture_with(EngineConfig::default())
}

pub fn fixture_with(config: EngineConfig) -> Fixture {
    let surface = Arc::new(ScriptedSurface::default());
    let registries = Registries::new(
        settings(),
        ProviderRegistry::default()
            .with_type("surface", surface.clone())
            .with_type("reader", Arc::new(Reader)),
        GroupRegistry::default()
            .with_type("root", Arc::new(SharingGroup::new(&["ensemble"])))
            .with_type("ensemble-view", Arc::new(SharingGroup::new(&["ensemble"])))
            .with_type(
                "ensemble-row",
                Arc::new(SharingGroup::new(&["ensemble"]).with_scope(ShareScope::DescendantsAndLaterSiblings)),
            )
            .with_type("collecting", Arc::new(CollectingGroup::default()))
            .with_type("surfaces-only", Arc::new(SurfaceOnlyGroup))
            .with_type("view", Arc::new(strata_engine::BasicGroup)),
    )
    .expect("registries");

    let mut manager = DataProviderManager::new(registries, "root", config).expect("manager");
    manager.set_global_context("ensembles", json!(["A", "B"]));
    let root = manager.root_id().clone();
    Fixture { manager, surface, root }
}

pub fn settings_map(pairs: &[(&str, Value)]) -> IndexMap<String, Value> {
    pairs.iter().map(|(key, value)| (key.to_string(), value.clone())).collect()
}

pub fn realization(value: i64) -> IndexMap<String, Value> {
    settings_map(&[("realization", json!(value))])
}

pub fn status(manager: &DataProviderManager, node_id: &NodeId) -> NodeStatus {
    manager.status(node_id).expect("provider status")
}
