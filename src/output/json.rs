//! JSON artifact writer and reader.
//!
//! Time series, statistics and summaries are all persisted as pretty
//! printed JSON arrays of records.

use super::{file_size, prepare_output_path};
use crate::utils::error::OutputError;
use log::{debug, info};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

/// Write any serializable value to a JSON file
///
/// **Public** - main entry point for JSON output
///
/// # Arguments
/// * `value` - Records to write (usually a slice of rows)
/// * `output_path` - Path to output JSON file
///
/// # Errors
/// * `OutputError::WriteFailed` - I/O error during write
/// * `OutputError::SerializationFailed` - JSON serialization error
/// * `OutputError::InvalidPath` - Path cannot be created or is invalid
///
/// # Example
/// ```ignore
/// let rows = stats_by_component(&records, &filter);
/// write_json(&rows, "case_stats.json")?;
/// ```
pub fn write_json<T: Serialize + ?Sized>(
    value: &T,
    output_path: impl AsRef<Path>,
) -> Result<(), OutputError> {
    let output_path = output_path.as_ref();

    debug!("Writing JSON to: {}", output_path.display());
    prepare_output_path(output_path)?;

    let file = File::create(output_path)?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, value)?;
    writer.flush()?;

    info!(
        "Wrote {} ({} bytes)",
        output_path.display(),
        file_size(output_path)
    );
    Ok(())
}

/// Read a JSON file back into typed records
///
/// **Public** - used by the summarizer and `validate`
///
/// # Errors
/// * `OutputError::WriteFailed` - File read error (reusing WriteFailed for I/O)
/// * `OutputError::SerializationFailed` - JSON parse error
pub fn read_json<T: DeserializeOwned>(input_path: impl AsRef<Path>) -> Result<T, OutputError> {
    let input_path = input_path.as_ref();
    debug!("Reading JSON from: {}", input_path.display());

    let file = File::open(input_path)?;
    let value = serde_json::from_reader(BufReader::new(file))?;
    Ok(value)
}
