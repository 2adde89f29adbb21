//! File-backed data catalog the demo provider types fetch from.

use std::{fs, path::Path};

use anyhow::{Context, Result};
use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::{Value, json};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub ensembles: IndexMap<String, EnsembleEntry>,
    #[serde(default)]
    pub surfaces: Vec<SurfaceEntry>,
    #[serde(default)]
    pub wells: Vec<WellEntry>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EnsembleEntry {
    #[serde(default)]
    pub realizations: Vec<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SurfaceEntry {
    pub ensemble: String,
    pub realization: i64,
    pub attribute: String,
    /// `[x_min, y_min, x_max, y_max]`
    pub extent: [f64; 4],
    /// `[z_min, z_max]`
    pub values: [f64; 2],
    #[serde(default)]
    pub unit: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WellEntry {
    pub name: String,
    pub points: Vec<[f64; 3]>,
}

impl Catalog {
    /// Reads a catalog from YAML or JSON, chosen by file extension.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).with_context(|| format!("failed to read catalog {}", path.display()))?;
        parse_document(path, &content).with_context(|| format!("invalid catalog {}", path.display()))
    }

    pub fn ensemble_names(&self) -> Value {
        json!(self.ensembles.keys().collect::<Vec<_>>())
    }

    /// Realizations per ensemble, as published in the global context.
    pub fn realizations(&self) -> Value {
        let map: serde_json::Map<String, Value> = self
            .ensembles
            .iter()
            .map(|(name, entry)| (name.clone(), json!(entry.realizations)))
            .collect();
        Value::Object(map)
    }

    pub fn attributes(&self) -> Value {
        let mut attributes: Vec<&str> = Vec::new();
        for surface in &self.surfaces {
            if !attributes.contains(&surface.attribute.as_str()) {
                attributes.push(&surface.attribute);
            }
        }
        json!(attributes)
    }

    pub fn well_names(&self) -> Value {
        json!(self.wells.iter().map(|well| well.name.as_str()).collect::<Vec<_>>())
    }

    pub fn surface(&self, ensemble: &str, realization: i64, attribute: &str) -> Option<&SurfaceEntry> {
        self.surfaces
            .iter()
            .find(|surface| surface.ensemble == ensemble && surface.realization == realization && surface.attribute == attribute)
    }

    pub fn well(&self, name: &str) -> Option<&WellEntry> {
        self.wells.iter().find(|well| well.name == name)
    }
}

/// Parses YAML unless the path ends in `.json`.
pub fn parse_document<T: serde::de::DeserializeOwned>(path: &Path, content: &str) -> Result<T> {
    let is_json = path.extension().and_then(|extension| extension.to_str()) == Some("json");
    if is_json {
        Ok(serde_json::from_str(content)?)
    } else {
        Ok(serde_yaml::from_str(content)?)
    }
}
