//! Provider types, fetch keys and the query cache.
//!
//! Modules:
//! - `registry`: table mapping provider type names to their implementation bundle
//! - `fetch_key`: deterministic cache key derivation from resolved settings
//! - `cache`: payload cache with in-flight request sharing and cancellation
//! - `context`: read-only views handed to fetch functions and transformers

mod cache;
mod context;
mod fetch_key;
mod registry;

use std::{fmt::Debug, time::Duration};

use async_trait::async_trait;
use serde_json::Value;
use strata_types::{BoundingBox, ColorScale};

pub(crate) use cache::{FetchCompletion, QueryCache, Subscriber};
pub use context::{FetchRequest, TransformerContext};
pub use fetch_key::{CacheKey, FetchKey, derive_key};
pub use registry::ProviderRegistry;

/// Implementation bundle of one provider type.
///
/// Everything except `settings` and `fetch_data` is optional. Transformers only run for
/// providers whose status is `SUCCESS` and must not block.
#[async_trait]
pub trait DataProviderType: Send + Sync + Debug {
    /// Setting keys the provider owns, in display order.
    fn settings(&self) -> &[&'static str];

    /// Keys that participate in the fetch key. Defaults to every declared setting the settings
    /// registry marks as fetch-relevant.
    fn fetch_settings(&self) -> Option<&[&'static str]> {
        None
    }

    /// Freshness hint forwarded to the query cache.
    fn stale_time(&self) -> Option<Duration> {
        None
    }

    /// Cross-setting validity check run after every setting resolved on its own.
    fn validate_settings(&self, _request: &FetchRequest) -> Result<(), String> {
        Ok(())
    }

    async fn fetch_data(&self, request: FetchRequest) -> anyhow::Result<Value>;

    fn make_bounding_box(&self, _context: &TransformerContext<'_>) -> Option<BoundingBox> {
        None
    }

    fn make_annotations(&self, _context: &TransformerContext<'_>) -> Vec<ColorScale> {
        Vec::new()
    }

    /// Layer payload handed to the viewer untouched.
    fn make_visualization(&self, _context: &TransformerContext<'_>) -> Option<Value> {
        None
    }
}
