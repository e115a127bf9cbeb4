//! ESMF Trace
//!
//! Post-processing for ESMF trace captures: reconstructs per-PET timing
//! spans from enter/exit region events, aggregates them into time series
//! and statistics, renders timeline charts, and summarizes many runs.
//!
//! This crate provides the core implementation for the `esmf-trace` CLI.
//!
//! ## Getting Started
//!
//! ```bash
//! esmf-trace run --config runs.toml
//! esmf-trace post-summary --config summary.toml
//! ```

pub mod aggregator;
pub mod commands;
pub mod flamegraph;
pub mod output;
pub mod parser;
pub mod utils;
