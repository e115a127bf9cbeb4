//! Trace reading and event classification.
//!
//! This module handles:
//! - The message abstraction the reconstructor consumes
//! - Reading per-unit stream files from a trace directory
//! - Resolving region ids to names and classifying enter/exit events

pub mod events;
pub mod regions;
pub mod stream;

// Re-export main types
pub use events::{RawMessage, TraceMessage};
pub use regions::{ClassifiedEvent, RegionResolver, Transition};
pub use stream::{StreamMessages, TraceDirectory};
