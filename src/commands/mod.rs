//! CLI command implementations.
//!
//! Each command is implemented in its own module.
//! Commands orchestrate the various library components to perform user tasks.

pub mod batch;
pub mod process;
pub mod summary;
pub mod utils;

// Re-export main command functions
pub use batch::{
    discover_jobs, execute_batch, resolve_workers, run_batch_with, BatchJob, BatchReport,
    Discovery, JobOutcome, JobStatus,
};
pub use process::{execute_process, expected_outputs, is_complete, ProcessArgs, ProcessOutcome};
pub use summary::{execute_summary, render_table, CombinedRow, SummaryReport, SummaryRow};
pub use utils::{display_version, validate_timeseries_file};
