//! CSV table output.
//!
//! Summary tables are written as plain CSV for spreadsheet analysis.

use super::prepare_output_path;
use crate::utils::error::OutputError;
use log::info;
use std::path::Path;

/// A record that can be rendered as one CSV line
pub trait CsvRow {
    fn header() -> &'static [&'static str];
    fn fields(&self) -> Vec<String>;
}

/// Buffered CSV table
#[derive(Debug)]
pub struct CsvTable<'a, T: CsvRow> {
    rows: &'a [T],
}

impl<'a, T: CsvRow> CsvTable<'a, T> {
    pub fn new(rows: &'a [T]) -> Self {
        Self { rows }
    }

    /// Escape CSV field (handle commas, quotes, newlines)
    fn escape_field(field: &str) -> String {
        if field.contains(',') || field.contains('"') || field.contains('\n') {
            format!("\"{}\"", field.replace('"', "\"\""))
        } else {
            field.to_string()
        }
    }

    /// Generate CSV output as string
    pub fn to_csv(&self) -> String {
        let mut output = T::header().join(",");
        output.push('\n');

        for row in self.rows {
            let line: Vec<String> = row.fields().iter().map(|f| Self::escape_field(f)).collect();
            output.push_str(&line.join(","));
            output.push('\n');
        }

        output
    }
}

/// Format an optional float, leaving the cell empty when absent
pub fn optional_cell(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// Write rows as a CSV file
///
/// **Public** - main entry point for tabular output
pub fn write_csv<T: CsvRow>(rows: &[T], output_path: impl AsRef<Path>) -> Result<(), OutputError> {
    let output_path = output_path.as_ref();
    prepare_output_path(output_path)?;

    std::fs::write(output_path, CsvTable::new(rows).to_csv())?;
    info!("Wrote {} ({} rows)", output_path.display(), rows.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Row {
        name: String,
        value: Option<f64>,
    }

    impl CsvRow for Row {
        fn header() -> &'static [&'static str] {
            &["name", "value"]
        }

        fn fields(&self) -> Vec<String> {
            vec![self.name.clone(), optional_cell(self.value)]
        }
    }

    #[test]
    fn test_to_csv_escapes_fields() {
        let rows = vec![
            Row {
                name: "case/output0/ESM".to_string(),
                value: Some(1.5),
            },
            Row {
                name: "a,\"b\"".to_string(),
                value: None,
            },
        ];
        let csv = CsvTable::new(&rows).to_csv();
        assert_eq!(csv, "name,value\ncase/output0/ESM,1.5\n\"a,\"\"b\"\"\",\n");
    }

    #[test]
    fn test_write_csv() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("out/table.csv");
        write_csv::<Row>(&[], &path).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "name,value\n");
    }
}
