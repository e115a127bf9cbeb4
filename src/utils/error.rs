//! Error types for the entire application.
//!
//! We use `thiserror` for library-style errors with custom types,
//! and `anyhow` for application-level error propagation in main.rs and commands.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while reading a trace capture
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("traceout metadata not found at: {0}")]
    MissingMetadata(PathBuf),

    #[error("stream file not found at: {0}")]
    MissingStream(PathBuf),

    #[error("no stream files discovered in {dir} with prefix {prefix}")]
    NoStreams { dir: PathBuf, prefix: String },

    #[error("malformed message at {path}:{line}: {source}")]
    MalformedMessage {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Errors that can occur during flamegraph generation
#[derive(Error, Debug)]
pub enum FlamegraphError {
    #[error("Empty span data")]
    EmptySpans,
}

/// Errors that can occur during file output
#[derive(Error, Debug)]
pub enum OutputError {
    #[error("Failed to write file: {0}")]
    WriteFailed(#[from] std::io::Error),

    #[error("Failed to serialize JSON: {0}")]
    SerializationFailed(#[from] serde_json::Error),

    #[error("Invalid output path: {0}")]
    InvalidPath(String),
}

/// Errors raised while loading or validating declarative configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing required config key(s): {0}")]
    MissingKey(String),

    #[error("cannot resolve run location: {0}")]
    UnresolvableLocation(String),

    #[error("conflicting settings: {0}")]
    Conflict(String),

    #[error("invalid index list '{0}'")]
    InvalidIndexList(String),

    #[error("invalid save_json_path: {0} - must explicitly end with '.json'")]
    InvalidSavePath(PathBuf),

    #[error("invalid value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("config TOML parse error: {0}")]
    ParseFailed(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Errors that abort a whole batch before or instead of running jobs
#[derive(Error, Debug)]
pub enum BatchError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("no work discovered: every declared run was skipped")]
    NoWork,

    #[error("failed to build worker pool: {0}")]
    PoolFailed(#[from] rayon::ThreadPoolBuildError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Errors that abort the multi-run summary
#[derive(Error, Debug)]
pub enum SummaryError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("No rows produced. Check case selections and filters.")]
    NoRows,

    #[error(transparent)]
    Output(#[from] OutputError),
}
