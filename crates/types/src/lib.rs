//! Plain data shared by the Strata engine and its front ends.
//!
//! Everything in this crate is serialisable and free of behaviour beyond small helpers, so the
//! engine, the CLI and any viewer embedding the framework can exchange node ids, statuses,
//! tree descriptions and assembled visualization results without depending on each other.

pub mod geometry;
pub mod node;
pub mod notification;
pub mod tree;
pub mod visualization;

pub use geometry::BoundingBox;
pub use node::{NodeId, NodeKind, NodeStatus, NodeStatusReport};
pub use notification::{Notification, Topic};
pub use tree::{NodeDescription, TREE_DESCRIPTION_VERSION, TreeDescription};
pub use visualization::{Annotation, AssemblyResult, ColorScale, Layer};
