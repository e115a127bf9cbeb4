//! Timeline flame chart generation.
//!
//! This module converts reconstructed spans into SVG charts showing, per
//! execution unit, which component ran when and how deeply nested it was.

pub mod generator;

// Re-export main types
pub use generator::{generate_flamegraph, FlamegraphConfig};
