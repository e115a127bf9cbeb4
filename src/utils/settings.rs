//! Declarative run and post-summary configuration.
//!
//! Both documents are TOML with a `[default_settings]` table and a
//! `[[runs]]` array. Values are validated here so that configuration
//! problems surface before any job starts.

use super::config::{
    DEFAULT_ARCHIVE_DIR, DEFAULT_MAX_DEPTH, DEFAULT_MERGE_GAP_NS, DEFAULT_STREAM_PREFIX,
    TIMESERIES_SUFFIX,
};
use super::error::ConfigError;
use super::indices::parse_index_list;
use serde::{Deserialize, Deserializer};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

/// An index allow-list given either as a list or as `"0,2-4"` text
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum IndexSpec {
    Single(u32),
    List(Vec<u32>),
    Text(String),
}

impl IndexSpec {
    /// Resolve to a sorted, deduplicated list; `None` means "all"
    pub fn resolve(&self) -> Result<Option<Vec<u32>>, ConfigError> {
        match self {
            IndexSpec::Single(i) => Ok(Some(vec![*i])),
            IndexSpec::List(list) => {
                let mut list = list.clone();
                list.sort_unstable();
                list.dedup();
                Ok(Some(list))
            }
            IndexSpec::Text(text) => parse_index_list(text),
        }
    }
}

/// `max_depth = <n>` bounds the depth; `max_depth = false` keeps every depth
#[derive(Deserialize)]
#[serde(untagged)]
enum DepthLimit {
    Depth(u32),
    Enabled(bool),
}

fn deserialize_max_depth<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match DepthLimit::deserialize(deserializer)? {
        DepthLimit::Depth(depth) => Some(depth),
        DepthLimit::Enabled(true) => Some(DEFAULT_MAX_DEPTH),
        DepthLimit::Enabled(false) => None,
    })
}

/// A component allow-list given as a list or as comma-separated text
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ComponentSpec {
    List(Vec<String>),
    Text(String),
}

impl ComponentSpec {
    /// Trimmed, non-empty names; `None` means "all"
    pub fn resolve(&self) -> Option<Vec<String>> {
        let parts: Vec<String> = match self {
            ComponentSpec::List(list) => list
                .iter()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            ComponentSpec::Text(text) => text
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
        };
        if parts.is_empty() {
            None
        } else {
            Some(parts)
        }
    }
}

/// Which statistics products a job writes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SaveMode {
    /// Unsliced products only
    #[default]
    Full,
    /// Sliced products only (the unsliced timeseries is always written)
    Sliced,
    Both,
}

impl SaveMode {
    pub fn includes_full(self) -> bool {
        matches!(self, SaveMode::Full | SaveMode::Both)
    }

    pub fn includes_sliced(self) -> bool {
        matches!(self, SaveMode::Sliced | SaveMode::Both)
    }
}

/// Settings shared by every run in a batch
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DefaultSettings {
    pub post_base_path: Option<PathBuf>,
    pub stream_prefix: String,
    pub model_component: Option<ComponentSpec>,
    pub max_workers: Option<usize>,
    #[serde(deserialize_with = "deserialize_max_depth")]
    pub max_depth: Option<u32>,
    pub merge_adjacent: bool,
    pub merge_gap_ns: u64,
    pub stats_start_index: Option<i64>,
    pub stats_end_index: Option<i64>,
    pub save_mode: SaveMode,
    pub xaxis_datetime: bool,
    pub flamegraph_width: usize,
}

impl Default for DefaultSettings {
    fn default() -> Self {
        Self {
            post_base_path: None,
            stream_prefix: DEFAULT_STREAM_PREFIX.to_string(),
            model_component: None,
            max_workers: None,
            max_depth: Some(DEFAULT_MAX_DEPTH),
            merge_adjacent: false,
            merge_gap_ns: DEFAULT_MERGE_GAP_NS,
            stats_start_index: None,
            stats_end_index: None,
            save_mode: SaveMode::Full,
            xaxis_datetime: false,
            flamegraph_width: 1200,
        }
    }
}

/// Optional command-line overrides applied on top of [`DefaultSettings`]
#[derive(Debug, Clone, Default)]
pub struct RunOverrides {
    pub stream_prefix: Option<String>,
    pub model_component: Option<Vec<String>>,
    pub max_depth: Option<u32>,
    pub all_depths: bool,
    pub merge_adjacent: bool,
    pub merge_gap_ns: Option<u64>,
    pub max_workers: Option<usize>,
    pub xaxis_datetime: bool,
}

impl DefaultSettings {
    /// Apply overrides; flags only override when set
    pub fn with_overrides(mut self, overrides: &RunOverrides) -> Self {
        if let Some(prefix) = &overrides.stream_prefix {
            self.stream_prefix = prefix.clone();
        }
        if let Some(components) = &overrides.model_component {
            self.model_component = Some(ComponentSpec::List(components.clone()));
        }
        if let Some(depth) = overrides.max_depth {
            self.max_depth = Some(depth);
        }
        if overrides.all_depths {
            self.max_depth = None;
        }
        if overrides.merge_adjacent {
            self.merge_adjacent = true;
        }
        if let Some(gap) = overrides.merge_gap_ns {
            self.merge_gap_ns = gap;
        }
        if let Some(workers) = overrides.max_workers {
            self.max_workers = Some(workers);
        }
        if overrides.xaxis_datetime {
            self.xaxis_datetime = true;
        }
        self
    }

    /// Merge gap if merging is enabled
    pub fn merge_gap(&self) -> Option<u64> {
        self.merge_adjacent.then_some(self.merge_gap_ns)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_workers == Some(0) {
            return Err(ConfigError::InvalidValue {
                key: "max_workers".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if self.stream_prefix.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "stream_prefix".to_string(),
                reason: "must not be empty".to_string(),
            });
        }
        validate_slice_bounds(self.stats_start_index, self.stats_end_index)
    }
}

/// One declared run (a case directory holding `output<N>` sub-directories)
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RunSettings {
    pub base_prefix: Option<String>,
    pub post_base_path: Option<PathBuf>,
    pub exact_path: Option<PathBuf>,
    pub run_base: Option<PathBuf>,
    pub run_name: Option<String>,
    pub branch: Option<String>,
    pub archive: Option<String>,
    pub pets: Option<IndexSpec>,
    pub model_component: Option<ComponentSpec>,
    pub output_index: Option<IndexSpec>,
}

impl RunSettings {
    /// Exact archive directory for this run
    ///
    /// `exact_path` wins; otherwise `run_base/run_name/branch/archive`.
    pub fn resolve_exact_path(&self) -> Option<PathBuf> {
        if let Some(exact) = &self.exact_path {
            return Some(exact.clone());
        }
        match (&self.run_base, &self.run_name, &self.branch) {
            (Some(base), Some(name), Some(branch)) => Some(
                base.join(name)
                    .join(branch)
                    .join(self.archive.as_deref().unwrap_or(DEFAULT_ARCHIVE_DIR)),
            ),
            _ => None,
        }
    }

    pub fn effective_post_base_path(&self, defaults: &DefaultSettings) -> Option<PathBuf> {
        self.post_base_path
            .clone()
            .or_else(|| defaults.post_base_path.clone())
    }

    pub fn base_prefix(&self) -> &str {
        self.base_prefix.as_deref().unwrap_or_default()
    }

    pub fn pets(&self) -> Result<Option<Vec<u32>>, ConfigError> {
        self.pets.as_ref().map_or(Ok(None), IndexSpec::resolve)
    }

    pub fn output_index(&self) -> Result<Option<Vec<u32>>, ConfigError> {
        self.output_index.as_ref().map_or(Ok(None), IndexSpec::resolve)
    }

    /// Run-level component filter, falling back to the defaults
    pub fn model_component(&self, defaults: &DefaultSettings) -> Option<Vec<String>> {
        self.model_component
            .as_ref()
            .or(defaults.model_component.as_ref())
            .and_then(ComponentSpec::resolve)
    }

    fn validate(&self, position: usize, defaults: &DefaultSettings) -> Result<(), ConfigError> {
        let label = format!("runs[{}]", position);

        if self.base_prefix.as_deref().map_or(true, |p| p.trim().is_empty()) {
            return Err(ConfigError::MissingKey(format!("{}.base_prefix", label)));
        }

        let has_parts = self.run_base.is_some() || self.run_name.is_some() || self.branch.is_some();
        if self.exact_path.is_some() && has_parts {
            return Err(ConfigError::Conflict(format!(
                "{} sets both 'exact_path' and 'run_base'/'run_name'/'branch'",
                label
            )));
        }
        if self.resolve_exact_path().is_none() {
            return Err(ConfigError::UnresolvableLocation(format!(
                "{} must have either 'exact_path' or all of 'run_base', 'run_name', and 'branch' set",
                label
            )));
        }

        if self.effective_post_base_path(defaults).is_none() {
            return Err(ConfigError::MissingKey(format!(
                "post_base_path (neither {} nor default_settings set it)",
                label
            )));
        }

        self.pets()?;
        self.output_index()?;
        Ok(())
    }
}

/// A full batch configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RunConfig {
    pub default_settings: DefaultSettings,
    pub runs: Vec<RunSettings>,
}

impl RunConfig {
    /// Validate every run; fails on the first problem found
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.default_settings.validate()?;
        if self.runs.is_empty() {
            return Err(ConfigError::MissingKey("runs (must be non-empty)".to_string()));
        }
        let mut destinations = HashSet::new();
        for (position, run) in self.runs.iter().enumerate() {
            run.validate(position, &self.default_settings)?;

            // jobs write under post_base_path/postprocessing_<base_prefix>
            let destination = (
                run.effective_post_base_path(&self.default_settings),
                run.base_prefix().to_string(),
            );
            if !destinations.insert(destination) {
                return Err(ConfigError::Conflict(format!(
                    "runs[{}] reuses base_prefix '{}' under the same post_base_path",
                    position,
                    run.base_prefix()
                )));
            }
        }
        Ok(())
    }
}

/// Load and validate a batch configuration from a TOML file
pub fn load_run_config(path: impl AsRef<Path>) -> Result<RunConfig, ConfigError> {
    let contents = fs::read_to_string(path)?;
    parse_run_config(&contents)
}

/// Parse and validate a batch configuration from TOML text
pub fn parse_run_config(contents: &str) -> Result<RunConfig, ConfigError> {
    require_keys(contents, &["default_settings", "runs"])?;
    let config: RunConfig = toml::from_str(contents)?;
    config.validate()?;
    Ok(config)
}

/// Defaults for the multi-run summary
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SummarySettings {
    pub post_base_path: Option<PathBuf>,
    pub timeseries_suffix: String,
    pub model_component: Option<ComponentSpec>,
    pub pets: Option<IndexSpec>,
    pub stats_start_index: Option<i64>,
    pub stats_end_index: Option<i64>,
    pub save_json_path: Option<PathBuf>,
}

impl Default for SummarySettings {
    fn default() -> Self {
        Self {
            post_base_path: None,
            timeseries_suffix: TIMESERIES_SUFFIX.to_string(),
            model_component: None,
            pets: None,
            stats_start_index: None,
            stats_end_index: None,
            save_json_path: None,
        }
    }
}

/// Optional command-line overrides applied on top of [`SummarySettings`]
#[derive(Debug, Clone, Default)]
pub struct SummaryOverrides {
    pub model_component: Option<Vec<String>>,
    pub pets: Option<Vec<u32>>,
    pub stats_start_index: Option<i64>,
    pub stats_end_index: Option<i64>,
    pub timeseries_suffix: Option<String>,
    pub save_json_path: Option<PathBuf>,
}

impl SummarySettings {
    pub fn with_overrides(mut self, overrides: &SummaryOverrides) -> Self {
        if let Some(components) = &overrides.model_component {
            self.model_component = Some(ComponentSpec::List(components.clone()));
        }
        if let Some(pets) = &overrides.pets {
            self.pets = Some(IndexSpec::List(pets.clone()));
        }
        if overrides.stats_start_index.is_some() {
            self.stats_start_index = overrides.stats_start_index;
        }
        if overrides.stats_end_index.is_some() {
            self.stats_end_index = overrides.stats_end_index;
        }
        if let Some(suffix) = &overrides.timeseries_suffix {
            self.timeseries_suffix = suffix.clone();
        }
        if let Some(path) = &overrides.save_json_path {
            self.save_json_path = Some(path.clone());
        }
        self
    }
}

/// One case to summarise
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CaseSettings {
    pub name: String,
    pub output_index: Option<IndexSpec>,
    pub model_component: Option<ComponentSpec>,
    pub pets: Option<IndexSpec>,
    pub stats_start_index: Option<i64>,
    pub stats_end_index: Option<i64>,
    pub save_json_path: Option<PathBuf>,
}

/// A case with defaults folded in and every list resolved
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedCase {
    pub name: String,
    pub output_index: Option<Vec<u32>>,
    pub model_component: Option<Vec<String>>,
    pub pets: Option<Vec<u32>>,
    pub stats_start_index: Option<i64>,
    pub stats_end_index: Option<i64>,
    pub save_json_path: Option<PathBuf>,
}

/// A full post-summary configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SummaryConfig {
    pub default_settings: SummarySettings,
    #[serde(alias = "cases")]
    pub runs: Vec<CaseSettings>,
}

impl SummaryConfig {
    pub fn post_base_path(&self) -> Result<&Path, ConfigError> {
        self.default_settings
            .post_base_path
            .as_deref()
            .ok_or_else(|| ConfigError::MissingKey("default_settings.post_base_path".to_string()))
    }

    /// Fold defaults into every case
    pub fn resolve_cases(&self) -> Result<Vec<ResolvedCase>, ConfigError> {
        let defaults = &self.default_settings;

        self.runs
            .iter()
            .enumerate()
            .map(|(position, case)| {
                if case.name.trim().is_empty() {
                    return Err(ConfigError::MissingKey(format!("runs[{}].name", position)));
                }

                let pets = case.pets.as_ref().or(defaults.pets.as_ref());
                let start = case.stats_start_index.or(defaults.stats_start_index);
                let end = case.stats_end_index.or(defaults.stats_end_index);
                validate_slice_bounds(start, end)?;

                let save_json_path = case.save_json_path.clone();
                if let Some(path) = &save_json_path {
                    validate_json_path(path)?;
                }

                Ok(ResolvedCase {
                    name: case.name.clone(),
                    output_index: case.output_index.as_ref().map_or(Ok(None), IndexSpec::resolve)?,
                    model_component: case
                        .model_component
                        .as_ref()
                        .or(defaults.model_component.as_ref())
                        .and_then(ComponentSpec::resolve),
                    pets: pets.map_or(Ok(None), IndexSpec::resolve)?,
                    stats_start_index: start,
                    stats_end_index: end,
                    save_json_path,
                })
            })
            .collect()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.post_base_path()?;
        if self.runs.is_empty() {
            return Err(ConfigError::MissingKey("runs (must be non-empty)".to_string()));
        }
        if let Some(path) = &self.default_settings.save_json_path {
            validate_json_path(path)?;
        }
        self.resolve_cases()?;
        Ok(())
    }
}

/// Load and validate a post-summary configuration from a TOML file
pub fn load_summary_config(path: impl AsRef<Path>) -> Result<SummaryConfig, ConfigError> {
    let contents = fs::read_to_string(path)?;
    parse_summary_config(&contents)
}

/// Parse and validate a post-summary configuration from TOML text
pub fn parse_summary_config(contents: &str) -> Result<SummaryConfig, ConfigError> {
    require_keys(contents, &["default_settings"])?;
    let config: SummaryConfig = toml::from_str(contents)?;
    config.validate()?;
    Ok(config)
}

/// Summary save paths must explicitly end in `.json`
pub fn validate_json_path(path: &Path) -> Result<(), ConfigError> {
    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));
    if is_json {
        Ok(())
    } else {
        Err(ConfigError::InvalidSavePath(path.to_path_buf()))
    }
}

fn validate_slice_bounds(start: Option<i64>, end: Option<i64>) -> Result<(), ConfigError> {
    if let (Some(s), Some(e)) = (start, end) {
        if s >= 0 && e >= 0 && s > e {
            return Err(ConfigError::Conflict(format!(
                "stats_start_index ({}) is after stats_end_index ({})",
                s, e
            )));
        }
    }
    Ok(())
}

fn require_keys(contents: &str, keys: &[&str]) -> Result<(), ConfigError> {
    let table: toml::Table = toml::from_str(contents)?;
    let missing: Vec<&str> = keys
        .iter()
        .copied()
        .filter(|k| !table.contains_key(*k) && !(*k == "runs" && table.contains_key("cases")))
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::MissingKey(missing.join(", ")))
    }
}
