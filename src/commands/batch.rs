//! Idempotent parallel batch scheduler.
//!
//! The run command:
//! 1. Resolves every declared run to its archive directory
//! 2. Discovers `output<N>` directories holding a trace capture
//! 3. Skips jobs whose completion artifacts already exist
//! 4. Runs the remaining jobs on a bounded worker pool
//! 5. Reports per-job outcomes and aggregate counts
//!
//! Jobs share nothing but the filesystem, and every job writes to its own
//! post-processing directory.

use super::process::{execute_process, is_complete, ProcessArgs};
use crate::aggregator::StatsFilter;
use crate::flamegraph::FlamegraphConfig;
use crate::utils::config::{OUTPUT_DIR_PREFIX, POSTPROCESSING_DIR_PREFIX, TRACEOUT_DIR_NAME};
use crate::utils::error::BatchError;
use crate::utils::indices::output_dir_to_index;
use crate::utils::settings::{DefaultSettings, RunConfig, RunSettings};
use colored::*;
use log::{error, info, warn};
use rayon::prelude::*;
use std::any::Any;
use std::fs;
use std::io::ErrorKind;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::time::Instant;

/// One discovered unit of work: a single `output<N>` directory of one run
#[derive(Debug, Clone, PartialEq)]
pub struct BatchJob {
    /// Position of the declaring run in the configuration
    pub run_index: usize,
    pub base_prefix: String,
    pub output_name: String,
    pub output_index: u32,
    pub traceout: PathBuf,
    pub post_dir: PathBuf,
    pub pets: Option<Vec<u32>>,
    pub model_component: Option<Vec<String>>,
}

impl BatchJob {
    pub fn label(&self) -> String {
        format!("{}/{}", self.base_prefix, self.output_name)
    }

    /// Pipeline arguments for this job under the batch defaults
    pub fn process_args(&self, defaults: &DefaultSettings) -> ProcessArgs {
        ProcessArgs {
            traceout: self.traceout.clone(),
            post_dir: self.post_dir.clone(),
            prefix: self.base_prefix.clone(),
            stream_prefix: defaults.stream_prefix.clone(),
            pets: self.pets.clone(),
            max_depth: defaults.max_depth,
            merge_gap_ns: defaults.merge_gap(),
            filter: StatsFilter {
                model_component: self.model_component.clone(),
                pets: self.pets.clone(),
                start_index: defaults.stats_start_index,
                end_index: defaults.stats_end_index,
            },
            save_mode: defaults.save_mode,
            flamegraph_config: FlamegraphConfig::new()
                .with_title(self.label())
                .with_width(defaults.flamegraph_width)
                .with_datetime_axis(defaults.xaxis_datetime),
        }
    }
}

/// Result of scanning the declared runs
#[derive(Debug, Clone, Default)]
pub struct Discovery {
    /// Jobs that still need to run
    pub jobs: Vec<BatchJob>,
    /// Jobs whose completion artifacts were already present
    pub skipped: Vec<BatchJob>,
    /// Runs or output directories that could not be used
    pub missing: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum JobStatus {
    Succeeded(String),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct JobOutcome {
    pub label: String,
    pub post_dir: PathBuf,
    pub status: JobStatus,
}

/// Aggregate outcome of one batch invocation
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub outcomes: Vec<JobOutcome>,
    pub skipped: usize,
    pub missing: usize,
}

impl BatchReport {
    pub fn executed(&self) -> usize {
        self.outcomes.len()
    }

    pub fn succeeded(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.status, JobStatus::Succeeded(_)))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.executed() - self.succeeded()
    }

    /// Human-readable report for the terminal
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push('\n');
        out.push_str(&"Batch Summary".bold().to_string());
        out.push_str("\n---------------------------------------------------\n");

        for outcome in &self.outcomes {
            match &outcome.status {
                JobStatus::Succeeded(msg) => out.push_str(&format!(
                    "  {} {}: {}\n",
                    "✓".green(),
                    outcome.label,
                    msg
                )),
                JobStatus::Failed(msg) => out.push_str(&format!(
                    "  {} {}: {}\n",
                    "✗".red(),
                    outcome.label,
                    msg.red()
                )),
            }
        }

        out.push_str("---------------------------------------------------\n");
        out.push_str(&format!(
            "Executed: {}  Succeeded: {}  Failed: {}  Skipped: {}\n",
            self.executed(),
            self.succeeded().to_string().green(),
            if self.failed() > 0 {
                self.failed().to_string().red()
            } else {
                self.failed().to_string().normal()
            },
            self.skipped
        ));
        if self.missing > 0 {
            out.push_str(&format!(
                "{} {} location(s) missing, see log\n",
                "!".yellow(),
                self.missing
            ));
        }
        out
    }
}

/// Worker count: explicit override, else physical cores, at least 1
pub fn resolve_workers(max_workers: Option<usize>) -> usize {
    max_workers.unwrap_or_else(num_cpus::get_physical).max(1)
}

/// Scan every declared run for jobs
///
/// **Public** - missing or unreadable run directories, missing `traceout`
/// directories and trace directories without streams are logged and
/// skipped; completed jobs go to [`Discovery::skipped`].
pub fn discover_jobs(config: &RunConfig) -> Result<Discovery, BatchError> {
    let defaults = &config.default_settings;
    let mut discovery = Discovery::default();

    for (run_index, run) in config.runs.iter().enumerate() {
        discover_run(run_index, run, defaults, &mut discovery)?;
    }

    info!(
        "Discovered {} job(s) to run, {} already complete, {} missing location(s)",
        discovery.jobs.len(),
        discovery.skipped.len(),
        discovery.missing
    );
    Ok(discovery)
}

fn discover_run(
    run_index: usize,
    run: &RunSettings,
    defaults: &DefaultSettings,
    discovery: &mut Discovery,
) -> Result<(), BatchError> {
    let base_prefix = run.base_prefix().to_string();
    let (Some(exact_path), Some(post_base)) =
        (run.resolve_exact_path(), run.effective_post_base_path(defaults))
    else {
        warn!("runs[{}] ({}): location unresolved, skipping", run_index, base_prefix);
        discovery.missing += 1;
        return Ok(());
    };

    if !exact_path.is_dir() {
        warn!(
            "runs[{}] ({}): directory not found: {}",
            run_index,
            base_prefix,
            exact_path.display()
        );
        discovery.missing += 1;
        return Ok(());
    }

    let allowed = run.output_index()?;
    let pets = run.pets()?;
    let model_component = run.model_component(defaults);
    let post_root = post_base.join(format!("{}{}", POSTPROCESSING_DIR_PREFIX, base_prefix));

    let outputs = match list_output_dirs(&exact_path, allowed.as_deref()) {
        Ok(outputs) => outputs,
        Err(err) => {
            warn!(
                "runs[{}] ({}): cannot read {}: {}",
                run_index,
                base_prefix,
                exact_path.display(),
                err
            );
            discovery.missing += 1;
            return Ok(());
        }
    };
    if let Some(allowed) = &allowed {
        for index in allowed {
            if !outputs.iter().any(|(i, _)| i == index) {
                warn!(
                    "runs[{}] ({}): {}{} not found under {}",
                    run_index,
                    base_prefix,
                    OUTPUT_DIR_PREFIX,
                    index,
                    exact_path.display()
                );
                discovery.missing += 1;
            }
        }
    }

    for (output_index, outdir) in outputs {
        let traceout = outdir.join(TRACEOUT_DIR_NAME);
        match has_streams(&traceout, &defaults.stream_prefix) {
            Ok(true) => {}
            Ok(false) => {
                warn!(
                    "No {}_* stream files in {}, skipping",
                    defaults.stream_prefix,
                    traceout.display()
                );
                discovery.missing += 1;
                continue;
            }
            Err(err) if err.kind() == ErrorKind::NotFound => {
                warn!("No {} directory in {}, skipping", TRACEOUT_DIR_NAME, outdir.display());
                discovery.missing += 1;
                continue;
            }
            Err(err) => {
                warn!("Cannot read {}: {}, skipping", traceout.display(), err);
                discovery.missing += 1;
                continue;
            }
        }

        let output_name = outdir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("{}{}", OUTPUT_DIR_PREFIX, output_index));
        let job = BatchJob {
            run_index,
            base_prefix: base_prefix.clone(),
            post_dir: post_root.join(&output_name),
            output_name,
            output_index,
            traceout,
            pets: pets.clone(),
            model_component: model_component.clone(),
        };

        if is_complete(&job.post_dir, &job.base_prefix) {
            info!("Skipping {}: outputs already exist in {}", job.label(), job.post_dir.display());
            discovery.skipped.push(job);
        } else {
            discovery.jobs.push(job);
        }
    }

    Ok(())
}

/// `output<N>` sub-directories of a run, sorted by index
pub fn list_output_dirs(
    root: &Path,
    allowed: Option<&[u32]>,
) -> Result<Vec<(u32, PathBuf)>, std::io::Error> {
    let mut outputs = Vec::new();
    for entry in fs::read_dir(root)? {
        let path = entry?.path();
        if !path.is_dir() {
            continue;
        }
        if let Some(index) = output_dir_to_index(&path) {
            if allowed.map_or(true, |list| list.contains(&index)) {
                outputs.push((index, path));
            }
        }
    }
    outputs.sort();
    Ok(outputs)
}

fn has_streams(traceout: &Path, stream_prefix: &str) -> Result<bool, std::io::Error> {
    let stem = format!("{}_", stream_prefix);
    for entry in fs::read_dir(traceout)? {
        let entry = entry?;
        if entry.file_name().to_string_lossy().starts_with(&stem) && entry.path().is_file() {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Run discovered jobs on a pool of `workers` threads
///
/// **Public** - the executor is called once per job, concurrently; its
/// errors and panics become failure records and never affect sibling jobs.
///
/// # Errors
/// * `BatchError::NoWork` - nothing to run and nothing already complete
/// * `BatchError::PoolFailed` - the worker pool could not be built
pub fn run_batch_with<F>(
    discovery: Discovery,
    workers: usize,
    executor: F,
) -> Result<BatchReport, BatchError>
where
    F: Fn(&BatchJob) -> anyhow::Result<String> + Sync,
{
    let mut report = BatchReport {
        outcomes: Vec::new(),
        skipped: discovery.skipped.len(),
        missing: discovery.missing,
    };

    if discovery.jobs.is_empty() {
        if discovery.skipped.is_empty() {
            return Err(BatchError::NoWork);
        }
        info!("All {} job(s) already complete, nothing to run", report.skipped);
        return Ok(report);
    }

    let workers = workers.max(1);
    info!("Running {} job(s) on {} worker(s)", discovery.jobs.len(), workers);
    let pool = rayon::ThreadPoolBuilder::new().num_threads(workers).build()?;

    report.outcomes = pool.install(|| {
        discovery
            .jobs
            .par_iter()
            .map(|job| run_job(job, &executor))
            .collect()
    });

    Ok(report)
}

fn run_job<F>(job: &BatchJob, executor: &F) -> JobOutcome
where
    F: Fn(&BatchJob) -> anyhow::Result<String>,
{
    let label = job.label();
    let status = match catch_unwind(AssertUnwindSafe(|| executor(job))) {
        Ok(Ok(message)) => {
            info!("{}: {}", label, message);
            JobStatus::Succeeded(message)
        }
        Ok(Err(e)) => {
            error!("{} failed: {:#}", label, e);
            JobStatus::Failed(format!("{:#}", e))
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            error!("{} panicked: {}", label, message);
            JobStatus::Failed(format!("panicked: {}", message))
        }
    };

    JobOutcome {
        label,
        post_dir: job.post_dir.clone(),
        status,
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Execute the run command
///
/// **Public** - main entry point called from main.rs
pub fn execute_batch(config: &RunConfig) -> Result<BatchReport, BatchError> {
    let start_time = Instant::now();
    config.validate()?;

    let discovery = discover_jobs(config)?;
    let defaults = &config.default_settings;
    let workers = resolve_workers(defaults.max_workers);

    let report = run_batch_with(discovery, workers, |job| {
        execute_process(&job.process_args(defaults)).map(|outcome| outcome.summary())
    })?;

    info!(
        "Batch finished in {:.2}s: {} succeeded, {} failed, {} skipped",
        start_time.elapsed().as_secs_f64(),
        report.succeeded(),
        report.failed(),
        report.skipped
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    fn job(name: &str) -> BatchJob {
        BatchJob {
            run_index: 0,
            base_prefix: "case".to_string(),
            output_name: name.to_string(),
            output_index: 0,
            traceout: PathBuf::from("traceout"),
            post_dir: PathBuf::from(name),
            pets: None,
            model_component: None,
        }
    }

    #[test]
    fn test_resolve_workers() {
        assert_eq!(resolve_workers(Some(3)), 3);
        assert!(resolve_workers(None) >= 1);
    }

    #[test]
    fn test_no_work_is_an_error() {
        let result = run_batch_with(Discovery::default(), 2, |_| Ok(String::new()));
        assert!(matches!(result, Err(BatchError::NoWork)));
    }

    #[test]
    fn test_everything_skipped_is_ok() {
        let discovery = Discovery {
            skipped: vec![job("output0")],
            ..Default::default()
        };
        let report = run_batch_with(discovery, 2, |_| Ok(String::new())).unwrap();
        assert_eq!((report.executed(), report.skipped), (0, 1));
    }

    #[test]
    fn test_failures_and_panics_are_isolated() {
        let discovery = Discovery {
            jobs: vec![job("ok"), job("err"), job("panic")],
            ..Default::default()
        };
        let report = run_batch_with(discovery, 3, |job| match job.output_name.as_str() {
            "err" => Err(anyhow!("boom")),
            "panic" => panic!("worker exploded"),
            _ => Ok("done".to_string()),
        })
        .unwrap();

        assert_eq!(report.executed(), 3);
        assert_eq!(report.succeeded(), 1);
        assert_eq!(report.failed(), 2);
        let panicked = report
            .outcomes
            .iter()
            .find(|o| o.label == "case/panic")
            .unwrap();
        assert_eq!(
            panicked.status,
            JobStatus::Failed("panicked: worker exploded".to_string())
        );
        assert!(report.render().contains("Skipped: 0"));
    }

    #[test]
    fn test_list_output_dirs_sorted_and_filtered() {
        let temp = tempfile::tempdir().unwrap();
        for name in ["output10", "output2", "output_x", "misc"] {
            fs::create_dir(temp.path().join(name)).unwrap();
        }
        fs::write(temp.path().join("output3"), "").unwrap();

        let all = list_output_dirs(temp.path(), None).unwrap();
        let indices: Vec<u32> = all.iter().map(|(i, _)| *i).collect();
        assert_eq!(indices, vec![2, 10]);

        let filtered = list_output_dirs(temp.path(), Some(&[10])).unwrap();
        assert_eq!(filtered.len(), 1);
    }
}
