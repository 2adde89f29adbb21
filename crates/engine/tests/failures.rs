use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::{Value, json};
use strata_engine::{
    BasicGroup, DataProviderManager, DataProviderType, EngineConfig, FetchRequest, GroupRegistry, NodeId, NodeStatus, ProviderRegistry,
    Registries, SettingDefinition, SettingsRegistry, TransformerContext,
};
use strata_types::BoundingBox;

/// Depth interval; `top` must lie above `base`.
#[derive(Debug)]
struct Zone;

#[async_trait]
impl DataProviderType for Zone {
    fn settings(&self) -> &[&'static str] {
        &["top", "base"]
    }

    fn validate_settings(&self, request: &FetchRequest) -> Result<(), String> {
        let (Some(top), Some(base)) = (request.setting_as::<f64>("top"), request.setting_as::<f64>("base")) else {
            return Ok(());
        };
        if top >= base {
            return Err(format!("top {top} must lie above base {base}"));
        }
        Ok(())
    }

    async fn fetch_data(&self, request: FetchRequest) -> anyhow::Result<Value> {
        Ok(json!({ "top": request.setting("top"), "base": request.setting("base") }))
    }

    fn make_bounding_box(&self, context: &TransformerContext<'_>) -> Option<BoundingBox> {
        let top = context.data().get("top")?.as_f64()?;
        let base = context.data().get("base")?.as_f64()?;
        Some(BoundingBox::new([0.0, 0.0, top], [1.0, 1.0, base]))
    }

    fn make_visualization(&self, _context: &TransformerContext<'_>) -> Option<Value> {
        Some(json!({ "kind": "zone" }))
    }
}

/// Log curve reader that panics on a negative `top`.
#[derive(Debug)]
struct Log;

#[async_trait]
impl DataProviderType for Log {
    fn settings(&self) -> &[&'static str] {
        &["top"]
    }

    async fn fetch_data(&self, request: FetchRequest) -> anyhow::Result<Value> {
        let top: f64 = request.setting_as("top").unwrap_or_default();
        assert!(top >= 0.0, "negative depth {top}");
        Ok(json!({ "top": top }))
    }

    fn make_visualization(&self, _context: &TransformerContext<'_>) -> Option<Value> {
        Some(json!({ "kind": "log" }))
    }
}

fn manager() -> DataProviderManager {
    let settings = SettingsRegistry::builder()
        .register(SettingDefinition::new("top"))
        .register(SettingDefinition::new("base"))
        .build()
        .expect("settings registry");
    let registries = Registries::new(
        settings,
        ProviderRegistry::default().with_type("zone", Arc::new(Zone)).with_type("log", Arc::new(Log)),
        GroupRegistry::default().with_type("root", Arc::new(BasicGroup)),
    )
    .expect("registries");
    DataProviderManager::new(registries, "root", EngineConfig::default()).expect("manager")
}

fn depths(pairs: &[(&str, f64)]) -> IndexMap<String, Value> {
    pairs.iter().map(|(key, value)| (key.to_string(), json!(value))).collect()
}

#[tokio::test]
async fn cross_setting_validation_marks_settings_invalid_without_fetching() {
    let mut manager = manager();
    let root = manager.root_id().clone();
    let inverted = manager.add_node(&root, "zone", depths(&[("top", 2.0), ("base", 1.0)])).expect("zone");

    let result = manager.settle().await.clone();

    assert_eq!(manager.status(&inverted), Some(NodeStatus::SettingsInvalid));
    assert_eq!(manager.message(&inverted), Some("top 2 must lie above base 1"));
    assert_eq!(manager.fetch_count(), 0);
    assert!(result.layer_for(&inverted).is_none());
    assert_eq!(result.bounding_box, None);
}

#[tokio::test]
async fn panicking_fetch_becomes_an_error_status() {
    let mut manager = manager();
    let root = manager.root_id().clone();
    let broken = manager.add_node(&root, "log", depths(&[("top", -1.0)])).expect("broken log");
    let healthy = manager.add_node(&root, "log", depths(&[("top", 5.0)])).expect("healthy log");

    let result = manager.settle().await.clone();

    assert_eq!(manager.status(&broken), Some(NodeStatus::Error));
    assert_eq!(manager.message(&broken), Some("fetch panicked"));
    assert_eq!(manager.status(&healthy), Some(NodeStatus::Success));
    assert!(result.layer_for(&healthy).is_some());
    assert!(result.layer_for(&broken).is_none());
}

#[tokio::test]
async fn invalid_provider_leaves_its_sibling_in_the_result() {
    let mut manager = manager();
    let root = manager.root_id().clone();
    let incomplete = manager.add_node(&root, "zone", depths(&[("top", 1.0)])).expect("incomplete zone");
    let complete = manager.add_node(&root, "zone", depths(&[("top", 1.0), ("base", 3.0)])).expect("complete zone");

    let result = manager.settle().await.clone();

    assert_eq!(manager.status(&incomplete), Some(NodeStatus::SettingsInvalid));
    assert!(
        manager.message(&incomplete).is_some_and(|message| message.starts_with("setting 'base'")),
        "unexpected message: {:?}",
        manager.message(&incomplete)
    );
    assert_eq!(manager.status(&complete), Some(NodeStatus::Success));
    assert_eq!(result.layer_for(&complete).map(|layer| &layer.payload), Some(&json!({ "kind": "zone" })));
    assert_eq!(result.layers.len(), 1);
    assert_eq!(result.bounding_box, Some(BoundingBox::new([0.0, 0.0, 1.0], [1.0, 1.0, 3.0])));
}

#[tokio::test]
async fn invalid_settings_only_resolves() {
    let mut manager = manager();
    let root = manager.root_id().clone();
    let inverted = manager.add_node(&root, "zone", depths(&[("top", 4.0), ("base", 2.0)])).expect("inverted zone");
    manager.add_node(&root, "zone", depths(&[("top", 1.0), ("base", 3.0)])).expect("valid zone");
    let before = manager.status(&inverted);

    let invalid = manager.invalid_settings();

    assert_eq!(invalid.keys().collect::<Vec<&NodeId>>(), vec![&inverted]);
    assert_eq!(invalid[&inverted], "top 4 must lie above base 2");
    assert_eq!(manager.fetch_count(), 0);
    assert_eq!(manager.status(&inverted), before);
    assert!(manager.last_result().is_none());
}
