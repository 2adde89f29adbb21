//! # Strata Engine
//!
//! Composes a tree of independently registered data provider and group nodes into one
//! visualization result: a bounding box, color-scale annotations and renderable layers.
//!
//! ## Key Features
//!
//! - **Settings resolution**: pull-based and memoized; values flow from shared group settings
//!   to descendants and are repaired by fixups when they fall outside their domain
//! - **Fetching**: per-provider async fetches keyed by fetch-relevant settings, with in-flight
//!   request sharing, a freshness-aware cache and cancellation of superseded requests
//! - **Assembly**: transformers of successful providers feed group accumulators and the root
//!   result; failing providers are reported without affecting their siblings
//! - **Mutations**: validated transactionally; a rejected mutation leaves the tree unchanged
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use indexmap::IndexMap;
//! use serde_json::{Value, json};
//! use strata_engine::{
//!     DataProviderManager, DataProviderType, EngineConfig, FetchRequest, GroupRegistry, ProviderRegistry, Registries,
//!     SettingDefinition, SettingsRegistry, SharingGroup,
//! };
//!
//! #[derive(Debug)]
//! struct Wells;
//!
//! #[async_trait::async_trait]
//! impl DataProviderType for Wells {
//!     fn settings(&self) -> &[&'static str] {
//!         &["field"]
//!     }
//!
//!     async fn fetch_data(&self, request: FetchRequest) -> anyhow::Result<Value> {
//!         Ok(json!({ "field": request.setting("field") }))
//!     }
//! }
//!
//! # tokio_test_block(async {
//! let settings = SettingsRegistry::builder().register(SettingDefinition::new("field").with_global_options("fields")).build()?;
//! let registries = Registries::new(
//!     settings,
//!     ProviderRegistry::default().with_type("wells", Arc::new(Wells)),
//!     GroupRegistry::default().with_type("root", Arc::new(SharingGroup::new(&["field"]))),
//! )?;
//! let mut manager = DataProviderManager::new(registries, "root", EngineConfig::default())?;
//! manager.set_global_context("fields", json!(["drogon"]));
//! let root = manager.root_id().clone();
//! let wells = manager.add_node(&root, "wells", IndexMap::new())?;
//! let result = manager.settle().await;
//! assert!(result.status_of(&wells).is_some());
//! # Ok::<(), anyhow::Error>(())
//! # })?;
//! # fn tokio_test_block<F: std::future::Future>(future: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().enable_all().build().expect("runtime").block_on(future)
//! # }
//! # Ok::<(), anyhow::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - **`settings`**: setting definitions, value domains, the global context and resolution
//! - **`provider`**: provider types, fetch keys and the query cache
//! - **`group`**: group types, share scopes and accumulators
//! - **`tree`**: node storage, provider state machine and structural validation
//! - **`assembler`**: the walk producing an [`AssemblyResult`]
//! - **`manager`**: the public entry point tying everything together

mod assembler;
pub mod config;
pub mod error;
pub mod group;
mod manager;
pub mod provider;
mod registries;
pub mod settings;
#[cfg(test)]
mod testing;
mod tree;

pub use config::EngineConfig;
pub use error::StructuralError;
pub use group::{Accumulator, BasicGroup, ChildOutput, GroupRegistry, GroupType, ShareScope, SharingGroup};
pub use manager::DataProviderManager;
pub use provider::{CacheKey, DataProviderType, FetchKey, FetchRequest, ProviderRegistry, TransformerContext, derive_key};
pub use registries::Registries;
pub use settings::{DomainContext, GlobalContext, MemoStats, SettingDefinition, SettingsRegistry, ValueDomain};
pub use strata_types::{AssemblyResult, NodeId, NodeKind, NodeStatus, Notification, Topic};
