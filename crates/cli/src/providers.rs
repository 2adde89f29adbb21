//! Demo provider and group types backed by a [`Catalog`].

use std::{sync::Arc, time::Duration};

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use serde_json::{Value, json};
use strata_engine::{
    Accumulator, ChildOutput, DataProviderType, FetchRequest, GroupRegistry, GroupType, ProviderRegistry, Registries, SettingDefinition,
    SettingsRegistry, SharingGroup, TransformerContext, ValueDomain,
};
use strata_types::{BoundingBox, ColorScale};

use crate::catalog::Catalog;

pub const ROOT_TYPE: &str = "scene";

/// Settings, provider and group tables of the demo scene.
pub fn registries(catalog: Arc<Catalog>, latency: Duration) -> Result<Registries> {
    let settings = SettingsRegistry::builder()
        .register(SettingDefinition::new("ensemble").with_global_options("ensembles"))
        .register(
            SettingDefinition::new("realization").with_domain(&["ensemble"], |context| {
                let Some(ensemble) = context.setting("ensemble").and_then(Value::as_str) else {
                    return ValueDomain::Unavailable("no ensemble selected".to_string());
                };
                match context.global("realizations").and_then(|realizations| realizations.get(ensemble)) {
                    Some(Value::Array(options)) if !options.is_empty() => ValueDomain::Options(options.clone()),
                    _ => ValueDomain::Unavailable(format!("ensemble '{ensemble}' has no realizations")),
                }
            }),
        )
        .register(SettingDefinition::new("attribute").with_global_options("attributes"))
        .register(SettingDefinition::new("well").with_global_options("wells"))
        .register(SettingDefinition::new("color").visual().with_default(json!("viridis")))
        .build()?;

    let providers = ProviderRegistry::default()
        .with_type(
            "surface",
            Arc::new(SurfaceProvider {
                catalog: Arc::clone(&catalog),
                latency,
            }),
        )
        .with_type("well", Arc::new(WellProvider { catalog, latency }));

    let groups = GroupRegistry::default()
        .with_type(ROOT_TYPE, Arc::new(SharingGroup::new(&["ensemble"])))
        .with_type("realization-view", Arc::new(SharingGroup::new(&["ensemble", "realization"])))
        .with_type("value-range", Arc::new(ValueRangeGroup::default()));

    Ok(Registries::new(settings, providers, groups)?)
}

#[derive(Debug)]
struct SurfaceProvider {
    catalog: Arc<Catalog>,
    latency: Duration,
}

#[async_trait]
impl DataProviderType for SurfaceProvider {
    fn settings(&self) -> &[&'static str] {
        &["ensemble", "realization", "attribute", "color"]
    }

    async fn fetch_data(&self, request: FetchRequest) -> Result<Value> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let ensemble: String = request.setting_as("ensemble").ok_or_else(|| anyhow!("missing ensemble"))?;
        let realization: i64 = request.setting_as("realization").ok_or_else(|| anyhow!("missing realization"))?;
        let attribute: String = request.setting_as("attribute").ok_or_else(|| anyhow!("missing attribute"))?;
        let surface = self
            .catalog
            .surface(&ensemble, realization, &attribute)
            .ok_or_else(|| anyhow!("no {attribute} surface for {ensemble} realization {realization}"))?;
        Ok(json!({
            "attribute": surface.attribute,
            "extent": surface.extent,
            "values": surface.values,
            "unit": surface.unit,
        }))
    }

    fn make_bounding_box(&self, context: &TransformerContext<'_>) -> Option<BoundingBox> {
        let extent: [f64; 4] = serde_json::from_value(context.data().get("extent")?.clone()).ok()?;
        let values: [f64; 2] = serde_json::from_value(context.data().get("values")?.clone()).ok()?;
        Some(BoundingBox::new([extent[0], extent[1], values[0]], [extent[2], extent[3], values[1]]))
    }

    fn make_annotations(&self, context: &TransformerContext<'_>) -> Vec<ColorScale> {
        let Some(values) = context
            .data()
            .get("values")
            .and_then(|values| serde_json::from_value::<[f64; 2]>(values.clone()).ok())
        else {
            return Vec::new();
        };
        vec![ColorScale {
            gradient: context.setting_as("color").unwrap_or_else(|| "viridis".to_string()),
            min: values[0],
            max: values[1],
            unit: context.data().get("unit").and_then(Value::as_str).map(str::to_string),
        }]
    }

    fn make_visualization(&self, context: &TransformerContext<'_>) -> Option<Value> {
        Some(json!({
            "kind": "surface",
            "attribute": context.data().get("attribute"),
            "extent": context.data().get("extent"),
            "color": context.setting("color"),
            "shared_range": context.stored_data("value-range"),
        }))
    }
}

#[derive(Debug)]
struct WellProvider {
    catalog: Arc<Catalog>,
    latency: Duration,
}

#[async_trait]
impl DataProviderType for WellProvider {
    fn settings(&self) -> &[&'static str] {
        &["well", "color"]
    }

    fn stale_time(&self) -> Option<Duration> {
        Some(Duration::from_secs(3600))
    }

    async fn fetch_data(&self, request: FetchRequest) -> Result<Value> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let name: String = request.setting_as("well").ok_or_else(|| anyhow!("missing well"))?;
        let well = self.catalog.well(&name).ok_or_else(|| anyhow!("unknown well '{name}'"))?;
        Ok(json!({ "name": well.name, "points": well.points }))
    }

    fn make_bounding_box(&self, context: &TransformerContext<'_>) -> Option<BoundingBox> {
        let points: Vec<[f64; 3]> = serde_json::from_value(context.data().get("points")?.clone()).ok()?;
        BoundingBox::from_points(&points)
    }

    fn make_visualization(&self, context: &TransformerContext<'_>) -> Option<Value> {
        Some(json!({
            "kind": "well",
            "points": context.data().get("points"),
            "color": context.setting("color"),
        }))
    }
}

/// Folds the color-scale ranges of its children into one shared `[min, max]`.
#[derive(Debug, Default)]
struct ValueRange;

impl Accumulator for ValueRange {
    fn stored_data_name(&self) -> &str {
        "value-range"
    }

    fn initial(&self) -> Value {
        Value::Null
    }

    fn accumulate(&self, accumulated: Value, child: &ChildOutput<'_>) -> Value {
        let mut range: Option<[f64; 2]> = serde_json::from_value(accumulated).ok();
        let scales = child.annotations.iter().map(|annotation| [annotation.color_scale.min, annotation.color_scale.max]);
        let nested = child.stored_data.and_then(|value| serde_json::from_value::<[f64; 2]>(value.clone()).ok());
        for [min, max] in scales.chain(nested) {
            range = Some(match range {
                Some([current_min, current_max]) => [current_min.min(min), current_max.max(max)],
                None => [min, max],
            });
        }
        range.map(|range| json!(range)).unwrap_or(Value::Null)
    }
}

#[derive(Debug, Default)]
struct ValueRangeGroup {
    accumulator: ValueRange,
}

impl GroupType for ValueRangeGroup {
    fn accumulator(&self) -> Option<&dyn Accumulator> {
        Some(&self.accumulator)
    }
}
