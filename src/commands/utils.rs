use crate::aggregator::stats::TimeseriesRecord;
use crate::output::read_json;
use anyhow::{Context, Result};
use std::collections::BTreeSet;
use std::path::Path;

/// Validate a time series JSON file
pub fn validate_timeseries_file(file_path: &Path) -> Result<()> {
    println!("Validating time series: {}", file_path.display());

    let records: Vec<TimeseriesRecord> = read_json(file_path)
        .with_context(|| format!("{} is not a valid time series file", file_path.display()))?;

    let components: BTreeSet<&str> = records.iter().map(|r| r.model_component.as_str()).collect();
    let pets: BTreeSet<u32> = records.iter().map(|r| r.pet).collect();
    let total: f64 = records.iter().map(|r| r.duration_s).sum();

    println!("✓ Valid time series JSON");
    println!("  Rows: {}", records.len());
    println!("  Components: {}", components.len());
    println!("  PETs: {}", pets.len());
    println!("  Total Duration: {:.6} s", total);

    Ok(())
}

/// Display version information
pub fn display_version() {
    println!("ESMF Trace v{}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("Span reconstruction, statistics and batch post-processing for ESMF trace captures.");
}
