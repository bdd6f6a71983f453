//! Version names and the version/branch graph.

mod graph;
pub mod name;

pub use graph::{Version, VersionGraph};
