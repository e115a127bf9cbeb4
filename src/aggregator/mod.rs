//! Span reconstruction and aggregation.
//!
//! This module transforms classified trace events into:
//! - Timing spans (per unit stack machine)
//! - Depth-filtered and merged span sets
//! - Time series and descriptive statistics

pub mod merge;
pub mod span_builder;
pub mod stats;

// Re-export main types and functions
pub use merge::{filter_by_depth, merge_adjacent_spans};
pub use span_builder::{build_spans, Span, SpanBuilder};
pub use stats::{
    prepare_records, stats_by_component, stats_by_component_pet, timeseries_view,
    ComponentPetStats, ComponentStats, StatsFilter, TimeseriesRecord,
};
