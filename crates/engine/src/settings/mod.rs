//! Settings registry and pull-based resolution.
//!
//! Modules:
//! - `domain`: value domains, default fixups and the global context domain functions read
//! - `registry`: setting definitions and the validated registration table
//! - `resolve`: per-pass resolution with memoized domains

mod domain;
mod registry;
pub(crate) mod resolve;

pub use domain::{GlobalContext, ValueDomain};
pub use registry::{DomainContext, DomainFn, FixupFn, SettingDefinition, SettingsRegistry, SettingsRegistryBuilder};
pub use resolve::MemoStats;
