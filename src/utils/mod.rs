//! Utility modules for configuration, error handling, and index parsing.

pub mod config;
pub mod error;
pub mod indices;
pub mod settings;

// Re-export commonly used error types for convenience
pub use error::{BatchError, ConfigError, FlamegraphError, OutputError, ParseError, SummaryError};
