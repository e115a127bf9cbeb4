//! Single-job pipeline.
//!
//! The process command:
//! 1. Opens the trace directory and selects unit streams
//! 2. Reconstructs spans from every stream
//! 3. Applies the depth filter
//! 4. Merges adjacent spans (if enabled)
//! 5. Builds time series and statistics, writes JSON artifacts
//! 6. Renders and writes the timeline chart
//!
//! The batch scheduler runs exactly this pipeline once per job.

use crate::aggregator::{
    filter_by_depth, merge_adjacent_spans, prepare_records, stats_by_component,
    stats_by_component_pet, timeseries_view, Span, SpanBuilder, StatsFilter, TimeseriesRecord,
};
use crate::flamegraph::{generate_flamegraph, FlamegraphConfig};
use crate::output::{write_json, write_svg};
use crate::parser::TraceDirectory;
use crate::utils::config::{
    DEFAULT_STREAM_PREFIX, FLAMEGRAPH_SUFFIX, STATS_PET_SLICED_SUFFIX, STATS_PET_SUFFIX,
    STATS_SLICED_SUFFIX, STATS_SUFFIX, TIMESERIES_SLICED_SUFFIX, TIMESERIES_SUFFIX,
};
use crate::utils::error::ParseError;
use crate::utils::settings::SaveMode;
use anyhow::{bail, Context, Result};
use log::{debug, info, warn};
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Arguments for one pipeline invocation
///
/// **Public** - built by main.rs for `process`, and by the batch scheduler
/// for every job
#[derive(Debug, Clone)]
pub struct ProcessArgs {
    /// Trace directory holding `metadata` and the unit streams
    pub traceout: PathBuf,

    /// Directory receiving every artifact of this job
    pub post_dir: PathBuf,

    /// Artifact file name prefix
    pub prefix: String,

    /// Stream file name prefix inside the trace directory
    pub stream_prefix: String,

    /// Units to read; `None` reads every discovered stream
    pub pets: Option<Vec<u32>>,

    /// Inclusive depth bound; `None` keeps every depth
    pub max_depth: Option<u32>,

    /// Merge tolerance; `None` disables merging
    pub merge_gap_ns: Option<u64>,

    /// Component allow-list and slicing bounds for the statistics
    pub filter: StatsFilter,

    pub save_mode: SaveMode,

    pub flamegraph_config: FlamegraphConfig,
}

impl Default for ProcessArgs {
    fn default() -> Self {
        Self {
            traceout: PathBuf::from("traceout"),
            post_dir: PathBuf::from("."),
            prefix: "trace".to_string(),
            stream_prefix: DEFAULT_STREAM_PREFIX.to_string(),
            pets: None,
            max_depth: None,
            merge_gap_ns: None,
            filter: StatsFilter::default(),
            save_mode: SaveMode::Full,
            flamegraph_config: FlamegraphConfig::default(),
        }
    }
}

/// What one pipeline invocation produced
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessOutcome {
    pub units: usize,
    pub spans: usize,
    pub artifacts: Vec<PathBuf>,
}

impl ProcessOutcome {
    pub fn summary(&self) -> String {
        format!(
            "{} unit(s), {} span(s), {} artifact(s)",
            self.units,
            self.spans,
            self.artifacts.len()
        )
    }
}

/// The two artifacts whose presence marks a job as complete
pub fn expected_outputs(post_dir: &Path, prefix: &str) -> [PathBuf; 2] {
    [
        post_dir.join(format!("{}{}", prefix, TIMESERIES_SUFFIX)),
        post_dir.join(format!("{}{}", prefix, FLAMEGRAPH_SUFFIX)),
    ]
}

/// True when both completion artifacts already exist
pub fn is_complete(post_dir: &Path, prefix: &str) -> bool {
    expected_outputs(post_dir, prefix).iter().all(|p| p.is_file())
}

/// Reconstruct the spans of the selected units
///
/// **Public** - one `SpanBuilder` serves the whole invocation, so the
/// global region-name fallback is shared across units but never across jobs.
/// Malformed lines are logged and skipped; I/O errors abort.
pub fn reconstruct_spans(trace: &TraceDirectory, units: &[u32]) -> Result<Vec<Span>, ParseError> {
    let mut builder = SpanBuilder::new();
    let mut spans = Vec::new();

    for &unit in units {
        let before = spans.len();
        for message in trace.messages(unit)? {
            match message {
                Ok(msg) => spans.extend(builder.push(unit, &msg)),
                Err(ParseError::MalformedMessage { path, line, source }) => {
                    warn!("Skipping malformed message {}:{}: {}", path.display(), line, source);
                }
                Err(e) => return Err(e),
            }
        }
        debug!("unit {}: {} span(s)", unit, spans.len() - before);
    }

    if builder.unmatched_exits() > 0 || builder.open_frames() > 0 {
        debug!(
            "{} unmatched exit(s), {} frame(s) left open",
            builder.unmatched_exits(),
            builder.open_frames()
        );
    }

    Ok(spans)
}

/// Execute the single-job pipeline
///
/// **Public** - main entry point for `process` and for batch jobs
///
/// # Errors
/// * Missing metadata or stream files
/// * No spans reconstructed, or none surviving the depth filter
/// * File write errors
pub fn execute_process(args: &ProcessArgs) -> Result<ProcessOutcome> {
    let start_time = Instant::now();
    info!("Processing trace: {}", args.traceout.display());

    // Step 1: Select streams
    info!("Step 1/6: Opening trace directory...");
    let trace = TraceDirectory::open(&args.traceout, args.stream_prefix.as_str())
        .context("Failed to open trace directory")?;
    let units = match &args.pets {
        Some(pets) => pets.clone(),
        None => trace.discover_units().context("Failed to discover unit streams")?,
    };
    debug!("Selected {} unit(s)", units.len());

    // Step 2: Reconstruct
    info!("Step 2/6: Reconstructing spans...");
    let spans = reconstruct_spans(&trace, &units).context("Failed to read trace streams")?;
    if spans.is_empty() {
        bail!("no spans reconstructed from {}", args.traceout.display());
    }
    let reconstructed = spans.len();

    // Step 3: Depth filter
    info!("Step 3/6: Filtering spans by depth...");
    let spans = filter_by_depth(spans, args.max_depth);
    if spans.is_empty() {
        bail!(
            "no spans left after depth filter (max_depth = {:?}, {} reconstructed)",
            args.max_depth,
            reconstructed
        );
    }

    // Step 4: Merge
    let spans = if args.merge_gap_ns.is_some() {
        info!("Step 4/6: Merging adjacent spans...");
        merge_adjacent_spans(spans, args.merge_gap_ns)
    } else {
        info!("Step 4/6: Skipping merge (not requested)");
        spans
    };

    // Step 5: Statistics
    info!("Step 5/6: Computing statistics...");
    let mut filter = args.filter.clone();
    if filter.pets.is_none() {
        filter.pets = args.pets.clone();
    }
    let records = prepare_records(&spans);
    let mut artifacts = write_stats_products(args, &records, &filter)?;

    // Step 6: Chart
    info!("Step 6/6: Generating timeline chart...");
    let svg = generate_flamegraph(&spans, Some(&args.flamegraph_config))
        .context("Failed to generate timeline chart")?;
    let svg_path = args.post_dir.join(format!("{}{}", args.prefix, FLAMEGRAPH_SUFFIX));
    write_svg(&svg, &svg_path).context("Failed to write timeline chart")?;
    artifacts.push(svg_path);

    let outcome = ProcessOutcome {
        units: units.len(),
        spans: spans.len(),
        artifacts,
    };
    info!(
        "Processed {} in {:.2}s: {}",
        args.traceout.display(),
        start_time.elapsed().as_secs_f64(),
        outcome.summary()
    );
    Ok(outcome)
}

fn write_stats_products(
    args: &ProcessArgs,
    records: &[TimeseriesRecord],
    filter: &StatsFilter,
) -> Result<Vec<PathBuf>> {
    let artifact = |suffix: &str| args.post_dir.join(format!("{}{}", args.prefix, suffix));
    let mut written = Vec::new();

    // The full time series always exists: it marks the job complete
    let full = filter.unsliced();
    let path = artifact(TIMESERIES_SUFFIX);
    write_json(&timeseries_view(records, &full), &path).context("Failed to write time series")?;
    written.push(path);

    if args.save_mode.includes_full() {
        let path = artifact(STATS_SUFFIX);
        write_json(&stats_by_component(records, &full), &path)
            .context("Failed to write component statistics")?;
        written.push(path);

        let path = artifact(STATS_PET_SUFFIX);
        write_json(&stats_by_component_pet(records, &full), &path)
            .context("Failed to write component/pet statistics")?;
        written.push(path);
    }

    if args.save_mode.includes_sliced() && filter.is_sliced() {
        let path = artifact(TIMESERIES_SLICED_SUFFIX);
        write_json(&timeseries_view(records, filter), &path)
            .context("Failed to write sliced time series")?;
        written.push(path);

        let path = artifact(STATS_SLICED_SUFFIX);
        write_json(&stats_by_component(records, filter), &path)
            .context("Failed to write sliced component statistics")?;
        written.push(path);

        let path = artifact(STATS_PET_SLICED_SUFFIX);
        write_json(&stats_by_component_pet(records, filter), &path)
            .context("Failed to write sliced component/pet statistics")?;
        written.push(path);
    }

    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_trace(dir: &Path) {
        fs::create_dir_all(dir).unwrap();
        fs::write(dir.join("metadata"), "").unwrap();
        fs::write(
            dir.join("esmf_stream_0000"),
            concat!(
                "{\"name\":\"ESM_enter\",\"timestamp_ns\":0}\n",
                "{\"name\":\"OCN_enter\",\"timestamp_ns\":100}\n",
                "{\"name\":\"OCN_exit\",\"timestamp_ns\":600}\n",
                "garbage\n",
                "{\"name\":\"ESM_exit\",\"timestamp_ns\":1000}\n",
            ),
        )
        .unwrap();
    }

    #[test]
    fn test_execute_process_writes_artifacts() {
        let temp = tempfile::tempdir().unwrap();
        let traceout = temp.path().join("traceout");
        write_trace(&traceout);

        let args = ProcessArgs {
            traceout,
            post_dir: temp.path().join("post"),
            prefix: "case".to_string(),
            ..Default::default()
        };
        let outcome = execute_process(&args).unwrap();

        assert_eq!(outcome.units, 1);
        assert_eq!(outcome.spans, 2);
        assert_eq!(outcome.artifacts.len(), 4);
        assert!(is_complete(&args.post_dir, "case"));

        let rows: Vec<TimeseriesRecord> =
            crate::output::read_json(args.post_dir.join("case_timeseries.json")).unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn test_sliced_products_need_bounds() {
        let temp = tempfile::tempdir().unwrap();
        let traceout = temp.path().join("traceout");
        write_trace(&traceout);

        let mut args = ProcessArgs {
            traceout,
            post_dir: temp.path().join("post"),
            prefix: "case".to_string(),
            save_mode: SaveMode::Both,
            ..Default::default()
        };
        assert_eq!(execute_process(&args).unwrap().artifacts.len(), 4);

        args.filter.start_index = Some(0);
        assert_eq!(execute_process(&args).unwrap().artifacts.len(), 7);
    }

    #[test]
    fn test_depth_filter_emptiness_is_an_error() {
        let temp = tempfile::tempdir().unwrap();
        let traceout = temp.path().join("traceout");
        fs::create_dir_all(&traceout).unwrap();
        fs::write(traceout.join("metadata"), "").unwrap();
        fs::write(
            traceout.join("esmf_stream_0000"),
            "{\"name\":\"A_enter\",\"timestamp_ns\":0}\n{\"name\":\"B_enter\",\"timestamp_ns\":1}\n{\"name\":\"B_exit\",\"timestamp_ns\":2}\n",
        )
        .unwrap();

        let args = ProcessArgs {
            traceout,
            post_dir: temp.path().join("post"),
            max_depth: Some(0),
            ..Default::default()
        };
        let err = execute_process(&args).unwrap_err();
        assert!(err.to_string().contains("depth filter"));
        assert!(!is_complete(&args.post_dir, &args.prefix));
    }

    #[test]
    fn test_missing_metadata_fails() {
        let temp = tempfile::tempdir().unwrap();
        let args = ProcessArgs {
            traceout: temp.path().to_path_buf(),
            post_dir: temp.path().join("post"),
            ..Default::default()
        };
        assert!(execute_process(&args).is_err());
    }
}
