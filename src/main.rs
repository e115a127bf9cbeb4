//! ESMF Trace CLI
//!
//! Post-processing for ESMF trace captures.
//! Reconstructs timing spans, writes statistics and timeline charts for
//! batches of runs, and summarizes many runs into combined tables.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use env_logger::Env;
use std::path::PathBuf;

use esmf_trace::aggregator::StatsFilter;
use esmf_trace::commands::{
    display_version, execute_batch, execute_process, execute_summary, render_table,
    validate_timeseries_file, ProcessArgs,
};
use esmf_trace::flamegraph::FlamegraphConfig;
use esmf_trace::utils::config::{DEFAULT_MERGE_GAP_NS, DEFAULT_STREAM_PREFIX};
use esmf_trace::utils::indices::parse_index_list;
use esmf_trace::utils::settings::{
    load_run_config, load_summary_config, RunOverrides, SaveMode, SummaryOverrides,
};

/// ESMF Trace - span reconstruction and statistics for ESMF trace captures
#[derive(Parser, Debug)]
#[command(name = "esmf-trace")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

/// Available commands
#[derive(Subcommand, Debug)]
enum Commands {
    /// Process every declared run of a batch configuration
    Run {
        /// Path to the run configuration (TOML)
        #[arg(short, long)]
        config: PathBuf,

        /// Stream file prefix inside traceout directories
        #[arg(long)]
        stream_prefix: Option<String>,

        /// Component allow-list (comma separated)
        #[arg(long, value_delimiter = ',')]
        model_component: Option<Vec<String>>,

        /// Inclusive maximum call depth
        #[arg(long, conflicts_with = "all_depths")]
        max_depth: Option<u32>,

        /// Keep spans at every depth
        #[arg(long)]
        all_depths: bool,

        /// Merge adjacent same-shape spans
        #[arg(long)]
        merge_adjacent: bool,

        /// Merge tolerance in nanoseconds
        #[arg(long)]
        merge_gap_ns: Option<u64>,

        /// Worker pool size (defaults to physical cores)
        #[arg(short = 'j', long)]
        max_workers: Option<usize>,

        /// Label the chart time axis with UTC datetimes
        #[arg(long)]
        xaxis_datetime: bool,
    },

    /// Summarize previously processed runs
    PostSummary {
        /// Path to the post-summary configuration (TOML)
        #[arg(short, long)]
        config: PathBuf,

        /// Component allow-list (comma separated)
        #[arg(long, value_delimiter = ',')]
        model_component: Option<Vec<String>>,

        /// PET allow-list, e.g. "0,2-4"
        #[arg(long)]
        pets: Option<String>,

        /// Slice start per series (negative counts from the end)
        #[arg(long, allow_hyphen_values = true)]
        stats_start_index: Option<i64>,

        /// Slice end per series, exclusive
        #[arg(long, allow_hyphen_values = true)]
        stats_end_index: Option<i64>,

        /// Suffix of the time series files to collect
        #[arg(long)]
        timeseries_suffix: Option<String>,

        /// Combined JSON output path (must end in .json)
        #[arg(long)]
        save_json_path: Option<PathBuf>,
    },

    /// Process a single trace directory
    Process {
        /// Trace directory holding metadata and stream files
        #[arg(short, long)]
        traceout: PathBuf,

        /// Output directory for artifacts
        #[arg(short, long)]
        out: PathBuf,

        /// Artifact file name prefix
        #[arg(short, long)]
        prefix: String,

        /// Stream file prefix
        #[arg(long, default_value = DEFAULT_STREAM_PREFIX)]
        stream_prefix: String,

        /// PETs to read, e.g. "0,2-4" (defaults to every stream)
        #[arg(long)]
        pets: Option<String>,

        /// Component allow-list (comma separated)
        #[arg(long, value_delimiter = ',')]
        model_component: Option<Vec<String>>,

        /// Inclusive maximum call depth (omit to keep all depths)
        #[arg(long)]
        max_depth: Option<u32>,

        /// Merge adjacent same-shape spans
        #[arg(long)]
        merge_adjacent: bool,

        /// Merge tolerance in nanoseconds
        #[arg(long, default_value_t = DEFAULT_MERGE_GAP_NS)]
        merge_gap_ns: u64,

        /// Slice start per series
        #[arg(long, allow_hyphen_values = true)]
        stats_start_index: Option<i64>,

        /// Slice end per series, exclusive
        #[arg(long, allow_hyphen_values = true)]
        stats_end_index: Option<i64>,

        /// Also write sliced statistics products
        #[arg(long)]
        save_sliced: bool,

        /// Chart title
        #[arg(long)]
        title: Option<String>,

        /// Chart width in pixels
        #[arg(long, default_value = "1200")]
        width: usize,

        /// Label the chart time axis with UTC datetimes
        #[arg(long)]
        xaxis_datetime: bool,
    },

    /// Validate a time series JSON file
    Validate {
        /// Path to time series JSON file
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Display version information
    Version,
}

/// Parse an optional `--pets` list
fn parse_pets(text: Option<String>) -> Result<Option<Vec<u32>>> {
    match text {
        Some(text) => Ok(parse_index_list(&text)?),
        None => Ok(None),
    }
}

fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Setup logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level)).init();

    // Execute command
    match cli.command {
        Commands::Run {
            config,
            stream_prefix,
            model_component,
            max_depth,
            all_depths,
            merge_adjacent,
            merge_gap_ns,
            max_workers,
            xaxis_datetime,
        } => {
            let mut run_config = load_run_config(&config)
                .with_context(|| format!("Invalid run configuration {}", config.display()))?;

            let overrides = RunOverrides {
                stream_prefix,
                model_component,
                max_depth,
                all_depths,
                merge_adjacent,
                merge_gap_ns,
                max_workers,
                xaxis_datetime,
            };
            run_config.default_settings = run_config.default_settings.with_overrides(&overrides);

            let report = execute_batch(&run_config)?;
            println!("{}", report.render());

            if report.failed() > 0 {
                bail!("{} of {} job(s) failed", report.failed(), report.executed());
            }
        }

        Commands::PostSummary {
            config,
            model_component,
            pets,
            stats_start_index,
            stats_end_index,
            timeseries_suffix,
            save_json_path,
        } => {
            let mut summary_config = load_summary_config(&config)
                .with_context(|| format!("Invalid summary configuration {}", config.display()))?;

            let overrides = SummaryOverrides {
                model_component,
                pets: parse_pets(pets)?,
                stats_start_index,
                stats_end_index,
                timeseries_suffix,
                save_json_path,
            };
            summary_config.default_settings =
                summary_config.default_settings.with_overrides(&overrides);

            let report = execute_summary(&summary_config)?;
            println!("\n{}", render_table(&report.combined_rows()));
            println!(
                "Summarized {} case(s), skipped {}",
                report.cases_summarized, report.cases_skipped
            );
            for path in &report.written {
                println!("✓ Written: {}", path.display());
            }
        }

        Commands::Process {
            traceout,
            out,
            prefix,
            stream_prefix,
            pets,
            model_component,
            max_depth,
            merge_adjacent,
            merge_gap_ns,
            stats_start_index,
            stats_end_index,
            save_sliced,
            title,
            width,
            xaxis_datetime,
        } => {
            let title = title.unwrap_or_else(|| prefix.clone());
            let pets = parse_pets(pets)?;
            let args = ProcessArgs {
                traceout,
                post_dir: out,
                prefix,
                stream_prefix,
                pets: pets.clone(),
                max_depth,
                merge_gap_ns: merge_adjacent.then_some(merge_gap_ns),
                filter: StatsFilter {
                    model_component,
                    pets,
                    start_index: stats_start_index,
                    end_index: stats_end_index,
                },
                save_mode: if save_sliced { SaveMode::Both } else { SaveMode::Full },
                flamegraph_config: FlamegraphConfig::new()
                    .with_title(title)
                    .with_width(width)
                    .with_datetime_axis(xaxis_datetime),
            };

            let outcome = execute_process(&args)?;
            for path in &outcome.artifacts {
                println!("✓ Written: {}", path.display());
            }
        }

        Commands::Validate { file } => {
            validate_timeseries_file(&file)?;
        }

        Commands::Version => {
            display_version();
        }
    }

    Ok(())
}
