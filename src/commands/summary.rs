//! Multi-run summarizer.
//!
//! The post-summary command:
//! 1. Collects `*_timeseries.json` artifacts under each case's `output<N>`
//!    directories
//! 2. Tags every row with its case, output name and output index
//! 3. Filters and slices per (case, output, component, pet) series
//! 4. Aggregates per-output rows, then combines them per component
//! 5. Writes per-case and combined tables
//!
//! A case that yields nothing is skipped with a warning; only a summary with
//! no rows at all is an error.

use super::batch::list_output_dirs;
use crate::aggregator::stats::{mean, slice_per_group, Describe, StatsFilter, TimeseriesRecord};
use crate::output::csv::optional_cell;
use crate::output::{read_json, write_csv, write_json, CsvRow};
use crate::utils::config::COMBINE_OUTPUT_NAME;
use crate::utils::error::SummaryError;
use crate::utils::settings::{ResolvedCase, SummaryConfig};
use anyhow::{Context, Result};
use colored::*;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

/// A time series row tagged with where it came from
#[derive(Debug, Clone, PartialEq)]
pub struct TaggedRecord {
    pub case: String,
    pub output_name: String,
    pub output_index: u32,
    pub record: TimeseriesRecord,
}

/// One (case, output-or-combine, component) summary row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryRow {
    /// `<case>/<output>/<component>`
    pub name: String,
    pub case: String,
    pub output: String,
    pub model_component: String,
    pub ncpus: f64,
    pub hits: f64,
    pub tmin: f64,
    pub tmax: f64,
    pub tavg: f64,
    pub tmedian: f64,
    pub tstd: Option<f64>,
    pub pemin: u32,
    pub pemax: u32,
}

/// Row of the cross-case combined table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombinedRow {
    pub name: String,
    pub hits: f64,
    pub tmin: f64,
    pub tmax: f64,
    pub tavg: f64,
    pub tmedian: f64,
    pub tstd: Option<f64>,
    pub pemin: u32,
    pub pemax: u32,
}

impl From<&SummaryRow> for CombinedRow {
    fn from(row: &SummaryRow) -> Self {
        Self {
            name: row.name.clone(),
            hits: row.hits,
            tmin: row.tmin,
            tmax: row.tmax,
            tavg: row.tavg,
            tmedian: row.tmedian,
            tstd: row.tstd,
            pemin: row.pemin,
            pemax: row.pemax,
        }
    }
}

impl CsvRow for CombinedRow {
    fn header() -> &'static [&'static str] {
        &["name", "hits", "tmin", "tmax", "tavg", "tmedian", "tstd", "pemin", "pemax"]
    }

    fn fields(&self) -> Vec<String> {
        vec![
            self.name.clone(),
            self.hits.to_string(),
            self.tmin.to_string(),
            self.tmax.to_string(),
            self.tavg.to_string(),
            self.tmedian.to_string(),
            optional_cell(self.tstd),
            self.pemin.to_string(),
            self.pemax.to_string(),
        ]
    }
}

/// Everything one post-summary invocation produced
#[derive(Debug, Clone, Default)]
pub struct SummaryReport {
    pub rows: Vec<SummaryRow>,
    pub cases_summarized: usize,
    pub cases_skipped: usize,
    pub written: Vec<PathBuf>,
}

impl SummaryReport {
    pub fn combined_rows(&self) -> Vec<CombinedRow> {
        self.rows.iter().map(CombinedRow::from).collect()
    }
}

fn row_label(case: &str, output: &str, component: &str) -> String {
    format!("{}/{}/{}", case, output, component)
}

/// Time series files of one case, ordered by output index then file name
pub fn collect_timeseries_files(
    case_dir: &Path,
    output_index: Option<&[u32]>,
    suffix: &str,
) -> Result<Vec<(u32, PathBuf)>> {
    let mut files = Vec::new();

    for (index, outdir) in list_output_dirs(case_dir, output_index)
        .with_context(|| format!("Failed to list {}", case_dir.display()))?
    {
        let mut found: Vec<PathBuf> = fs::read_dir(&outdir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file())
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.ends_with(suffix))
            })
            .collect();
        found.sort();
        files.extend(found.into_iter().map(|p| (index, p)));
    }

    Ok(files)
}

/// Load and tag the time series rows of one case
///
/// The case tag is the name of the directory two levels above each file.
pub fn load_case(case_dir: &Path, case: &ResolvedCase, suffix: &str) -> Result<Vec<TaggedRecord>> {
    let files = collect_timeseries_files(case_dir, case.output_index.as_deref(), suffix)?;
    debug!("{}: {} time series file(s)", case.name, files.len());

    let mut tagged = Vec::new();
    for (output_index, path) in files {
        let records: Vec<TimeseriesRecord> =
            read_json(&path).with_context(|| format!("Failed to read {}", path.display()))?;

        let outdir = path.parent();
        let output_name = dir_name(outdir).unwrap_or_default();
        let case_name = dir_name(outdir.and_then(Path::parent)).unwrap_or_else(|| case.name.clone());

        tagged.extend(records.into_iter().map(|record| TaggedRecord {
            case: case_name.clone(),
            output_name: output_name.clone(),
            output_index,
            record,
        }));
    }

    Ok(tagged)
}

fn dir_name(path: Option<&Path>) -> Option<String> {
    path?.file_name().map(|n| n.to_string_lossy().into_owned())
}

/// Filter, slice and aggregate per (case, output, component)
pub fn summarize_outputs(records: Vec<TaggedRecord>, filter: &StatsFilter) -> Vec<SummaryRow> {
    let admitted: Vec<TaggedRecord> = records
        .into_iter()
        .filter(|t| filter.admits(&t.record.model_component, t.record.pet))
        .collect();

    let sliced = slice_per_group(
        admitted,
        |t| {
            (
                t.case.clone(),
                t.output_name.clone(),
                t.record.model_component.clone(),
                t.record.pet,
            )
        },
        |t| t.record.start,
        filter.start_index,
        filter.end_index,
    );

    let mut groups: BTreeMap<(&str, u32, &str, &str), (Vec<f64>, BTreeSet<u32>)> = BTreeMap::new();
    for t in &sliced {
        let entry = groups
            .entry((
                t.case.as_str(),
                t.output_index,
                t.output_name.as_str(),
                t.record.model_component.as_str(),
            ))
            .or_default();
        entry.0.push(t.record.duration_s);
        entry.1.insert(t.record.pet);
    }

    groups
        .into_iter()
        .filter_map(|((case, _, output, component), (durations, pets))| {
            let d = Describe::from_values(&durations)?;
            Some(SummaryRow {
                name: row_label(case, output, component),
                case: case.to_string(),
                output: output.to_string(),
                model_component: component.to_string(),
                ncpus: pets.len() as f64,
                hits: d.count as f64,
                tmin: d.min,
                tmax: d.max,
                tavg: d.mean,
                tmedian: d.p50,
                tstd: d.std,
                pemin: pets.first().copied()?,
                pemax: pets.last().copied()?,
            })
        })
        .collect()
}

/// Combine per-output rows into one `combine` row per (case, component)
pub fn combine_rows(rows: &[SummaryRow]) -> Vec<SummaryRow> {
    let mut groups: BTreeMap<(&str, &str), Vec<&SummaryRow>> = BTreeMap::new();
    for row in rows {
        groups
            .entry((row.case.as_str(), row.model_component.as_str()))
            .or_default()
            .push(row);
    }

    groups
        .into_iter()
        .filter_map(|((case, component), members)| {
            let pick = |f: fn(&SummaryRow) -> f64| members.iter().map(|r| f(r)).collect::<Vec<_>>();
            let stds: Vec<f64> = members.iter().filter_map(|r| r.tstd).collect();

            Some(SummaryRow {
                name: row_label(case, COMBINE_OUTPUT_NAME, component),
                case: case.to_string(),
                output: COMBINE_OUTPUT_NAME.to_string(),
                model_component: component.to_string(),
                ncpus: mean(&pick(|r| r.ncpus)),
                hits: mean(&pick(|r| r.hits)),
                tmin: pick(|r| r.tmin).into_iter().reduce(f64::min)?,
                tmax: pick(|r| r.tmax).into_iter().reduce(f64::max)?,
                tavg: mean(&pick(|r| r.tavg)),
                tmedian: mean(&pick(|r| r.tmedian)),
                tstd: (!stds.is_empty()).then(|| mean(&stds)),
                pemin: members.iter().map(|r| r.pemin).min()?,
                pemax: members.iter().map(|r| r.pemax).max()?,
            })
        })
        .collect()
}

/// Per-output rows followed by combine rows for one case
pub fn summarize_case(post_base: &Path, case: &ResolvedCase, suffix: &str) -> Result<Vec<SummaryRow>> {
    let case_dir = post_base.join(&case.name);
    if !case_dir.is_dir() {
        warn!("Case directory not found: {}", case_dir.display());
        return Ok(Vec::new());
    }

    let records = load_case(&case_dir, case, suffix)?;
    let filter = StatsFilter {
        model_component: case.model_component.clone(),
        pets: case.pets.clone(),
        start_index: case.stats_start_index,
        end_index: case.stats_end_index,
    };

    let mut rows = summarize_outputs(records, &filter);
    let combined = combine_rows(&rows);
    rows.extend(combined);
    Ok(rows)
}

/// `<stem>_table.csv` next to the combined JSON
pub fn table_path(json_path: &Path) -> PathBuf {
    let stem = json_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "summary".to_string());
    json_path.with_file_name(format!("{}_table.csv", stem))
}

/// Execute the post-summary command
///
/// **Public** - main entry point called from main.rs
///
/// # Errors
/// * `SummaryError::Config` - invalid configuration
/// * `SummaryError::NoRows` - no case produced any row
/// * `SummaryError::Output` - a table could not be written
pub fn execute_summary(config: &SummaryConfig) -> Result<SummaryReport, SummaryError> {
    config.validate()?;
    let post_base = config.post_base_path()?;
    let suffix = config.default_settings.timeseries_suffix.as_str();
    let mut report = SummaryReport::default();

    for case in config.resolve_cases()? {
        let rows = match summarize_case(post_base, &case, suffix) {
            Ok(rows) => rows,
            Err(e) => {
                warn!("Skipping case {}: {:#}", case.name, e);
                report.cases_skipped += 1;
                continue;
            }
        };

        if rows.is_empty() {
            warn!("Case {} produced no rows, skipping", case.name);
            report.cases_skipped += 1;
            continue;
        }

        info!("Case {}: {} row(s)", case.name, rows.len());
        if let Some(path) = &case.save_json_path {
            write_json(&rows, path)?;
            report.written.push(path.clone());
        }

        report.cases_summarized += 1;
        report.rows.extend(rows);
    }

    if report.rows.is_empty() {
        return Err(SummaryError::NoRows);
    }

    if let Some(path) = &config.default_settings.save_json_path {
        let combined = report.combined_rows();
        write_json(&combined, path)?;
        let table = table_path(path);
        write_csv(&combined, &table)?;
        report.written.push(path.clone());
        report.written.push(table);
    }

    Ok(report)
}

/// Fixed-width text table of summary rows
pub fn render_table(rows: &[CombinedRow]) -> String {
    let width = rows.iter().map(|r| r.name.len()).max().unwrap_or(4).max(4);
    let mut out = format!(
        "{:<width$} {:>8} {:>12} {:>12} {:>12} {:>12} {:>12} {:>6} {:>6}\n",
        "name", "hits", "tmin", "tmax", "tavg", "tmedian", "tstd", "pemin", "pemax",
        width = width
    )
    .bold()
    .to_string();

    for r in rows {
        let tstd = r.tstd.map(|v| format!("{:.6}", v)).unwrap_or_else(|| "-".to_string());
        let line = format!(
            "{:<width$} {:>8.1} {:>12.6} {:>12.6} {:>12.6} {:>12.6} {:>12} {:>6} {:>6}\n",
            r.name,
            r.hits,
            r.tmin,
            r.tmax,
            r.tavg,
            r.tmedian,
            tstd,
            r.pemin,
            r.pemax,
            width = width
        );
        if r.name.contains(&format!("/{}/", COMBINE_OUTPUT_NAME)) {
            out.push_str(&line.cyan().to_string());
        } else {
            out.push_str(&line);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tagged(output: &str, index: u32, component: &str, pet: u32, start: u64, d: f64) -> TaggedRecord {
        TaggedRecord {
            case: "caseA".to_string(),
            output_name: output.to_string(),
            output_index: index,
            record: TimeseriesRecord {
                start,
                model_component: component.to_string(),
                pet,
                duration_s: d,
            },
        }
    }

    fn two_outputs() -> Vec<TaggedRecord> {
        vec![
            tagged("output0", 0, "OCN", 0, 0, 1.0),
            tagged("output0", 0, "OCN", 1, 1, 2.0),
            tagged("output0", 0, "OCN", 0, 2, 3.0),
            tagged("output1", 1, "OCN", 2, 0, 4.0),
            tagged("output1", 1, "OCN", 2, 1, 5.0),
            tagged("output1", 1, "OCN", 3, 2, 6.0),
        ]
    }

    #[test]
    fn test_per_output_rows() {
        let rows = summarize_outputs(two_outputs(), &StatsFilter::default());
        assert_eq!(rows.len(), 2);

        let first = &rows[0];
        assert_eq!(first.name, "caseA/output0/OCN");
        assert_eq!(first.hits, 3.0);
        assert_eq!((first.tmin, first.tmax, first.tavg, first.tmedian), (1.0, 3.0, 2.0, 2.0));
        assert_eq!(first.tstd, Some(1.0));
        assert_eq!((first.ncpus, first.pemin, first.pemax), (2.0, 0, 1));
    }

    #[test]
    fn test_combine_rows() {
        let rows = summarize_outputs(two_outputs(), &StatsFilter::default());
        let combined = combine_rows(&rows);

        assert_eq!(combined.len(), 1);
        let c = &combined[0];
        assert_eq!(c.name, "caseA/combine/OCN");
        assert_eq!(c.output, COMBINE_OUTPUT_NAME);
        assert_eq!((c.tmin, c.tmax, c.tavg), (1.0, 6.0, 3.5));
        assert_eq!(c.hits, 3.0);
        assert_eq!((c.pemin, c.pemax), (0, 3));
        assert_eq!(c.tstd, Some(1.0));
    }

    #[test]
    fn test_slicing_per_series() {
        let filter = StatsFilter {
            start_index: Some(1),
            ..Default::default()
        };
        let rows = summarize_outputs(two_outputs(), &filter);

        // output0: pet0 keeps [3.0], pet1 empties; output1: pet2 keeps [5.0], pet3 empties
        assert_eq!(rows.len(), 2);
        assert_eq!((rows[0].hits, rows[0].tmin, rows[0].pemin), (1.0, 3.0, 0));
        assert_eq!((rows[1].hits, rows[1].tmin, rows[1].pemin), (1.0, 5.0, 2));
        assert_eq!(rows[0].tstd, None);
    }

    #[test]
    fn test_filter_removes_everything() {
        let filter = StatsFilter {
            model_component: Some(vec!["ATM".to_string()]),
            ..Default::default()
        };
        assert!(summarize_outputs(two_outputs(), &filter).is_empty());
    }

    #[test]
    fn test_table_path() {
        assert_eq!(
            table_path(Path::new("/tmp/out/summary.json")),
            PathBuf::from("/tmp/out/summary_table.csv")
        );
    }

    #[test]
    fn test_render_table_marks_missing_std() {
        let row = CombinedRow {
            name: "c/output0/X".to_string(),
            hits: 1.0,
            tmin: 1.0,
            tmax: 1.0,
            tavg: 1.0,
            tmedian: 1.0,
            tstd: None,
            pemin: 0,
            pemax: 0,
        };
        let table = render_table(&[row]);
        assert!(table.contains("c/output0/X"));
        assert!(table.contains(" - "));
    }
}
