//! Configuration defaults and constants shared across the pipeline.

/// Stream files are named `<prefix>_<NNNN>`
pub const DEFAULT_STREAM_PREFIX: &str = "esmf_stream";

/// Name of the metadata resource inside a trace directory
pub const METADATA_FILE_NAME: &str = "metadata";

/// Sub-directory of an output dir that holds the trace capture
pub const TRACEOUT_DIR_NAME: &str = "traceout";

/// Output sub-directories are named `output<N>`
pub const OUTPUT_DIR_PREFIX: &str = "output";

/// Archive directory appended to run_base/run_name/branch
pub const DEFAULT_ARCHIVE_DIR: &str = "archive";

/// Post-processing directories are named `postprocessing_<base_prefix>`
pub const POSTPROCESSING_DIR_PREFIX: &str = "postprocessing_";

/// Default inclusive depth bound
pub const DEFAULT_MAX_DEPTH: u32 = 6;

/// Default merge tolerance (negligible inter-call overhead)
pub const DEFAULT_MERGE_GAP_NS: u64 = 1_000;

/// Separator used to join the call stack into a hierarchical path
pub const PATH_SEPARATOR: &str = "/";

pub const NANOSECONDS_PER_SECOND: f64 = 1e9;

// Artifact suffixes written per job
pub const TIMESERIES_SUFFIX: &str = "_timeseries.json";
pub const FLAMEGRAPH_SUFFIX: &str = "_flamegraph.svg";
pub const STATS_SUFFIX: &str = "_stats.json";
pub const STATS_PET_SUFFIX: &str = "_stats_by_component_pet.json";
pub const TIMESERIES_SLICED_SUFFIX: &str = "_timeseries_sliced.json";
pub const STATS_SLICED_SUFFIX: &str = "_stats_sliced.json";
pub const STATS_PET_SLICED_SUFFIX: &str = "_stats_by_component_pet_sliced.json";

/// Output name used for per-component rows combined across outputs
pub const COMBINE_OUTPUT_NAME: &str = "combine";

// Event names emitted by the ESMF tracer
pub const DEFINE_REGION_EVENT: &str = "define_region";
pub const REGION_ENTER_EVENT: &str = "regionid_enter";
pub const REGION_EXIT_EVENT: &str = "regionid_exit";
pub const ENTER_MARKER: &str = "_enter";
pub const EXIT_MARKER: &str = "_exit";

// Payload field names (different tracer versions use different names)
pub const REGION_ID_FIELD_NAMES: &[&str] = &["id", "region_id"];
pub const REGION_NAME_FIELD_NAMES: &[&str] = &["name", "region_name"];
pub const TRANSITION_ID_FIELD_NAMES: &[&str] = &["regionid", "region_id", "id"];
