use esmf_trace::aggregator::TimeseriesRecord;
use esmf_trace::commands::{execute_summary, CombinedRow};
use esmf_trace::output::{read_json, write_json};
use esmf_trace::utils::error::SummaryError;
use esmf_trace::utils::settings::parse_summary_config;
use pretty_assertions::assert_eq;
use std::fs;
use std::path::Path;

fn write_series(post_base: &Path, case: &str, output: &str, durations: &[f64]) {
    let rows: Vec<TimeseriesRecord> = durations
        .iter()
        .enumerate()
        .map(|(i, d)| TimeseriesRecord {
            start: i as u64,
            model_component: "ESM/OCN".to_string(),
            pet: i as u32,
            duration_s: *d,
        })
        .collect();
    let path = post_base
        .join(case)
        .join(output)
        .join(format!("{}_timeseries.json", case));
    write_json(&rows, path).unwrap();
}

#[test]
fn test_combine_across_outputs() {
    let temp = tempfile::tempdir().unwrap();
    let post_base = temp.path().join("post");
    write_series(&post_base, "caseA", "output0", &[1.0, 2.0, 3.0]);
    write_series(&post_base, "caseA", "output1", &[4.0, 5.0, 6.0]);
    let save = temp.path().join("out/summary.json");

    let config = parse_summary_config(&format!(
        "[default_settings]\npost_base_path = \"{}\"\nsave_json_path = \"{}\"\n\n[[runs]]\nname = \"caseA\"\n",
        post_base.display(),
        save.display()
    ))
    .unwrap();

    let report = execute_summary(&config).unwrap();
    assert_eq!(report.rows.len(), 3);

    let combined: Vec<CombinedRow> = read_json(&save).unwrap();
    let names: Vec<&str> = combined.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(
        names,
        vec!["caseA/output0/ESM/OCN", "caseA/output1/ESM/OCN", "caseA/combine/ESM/OCN"]
    );

    let combine = &combined[2];
    assert_eq!((combine.tmin, combine.tmax, combine.tavg), (1.0, 6.0, 3.5));
    assert_eq!((combine.pemin, combine.pemax), (0, 2));

    let table = fs::read_to_string(temp.path().join("out/summary_table.csv")).unwrap();
    assert!(table.starts_with("name,hits,tmin,tmax,tavg,tmedian,tstd,pemin,pemax\n"));
    assert_eq!(table.lines().count(), 4);
}

#[test]
fn test_output_index_filter() {
    let temp = tempfile::tempdir().unwrap();
    let post_base = temp.path().join("post");
    write_series(&post_base, "caseA", "output0", &[1.0, 2.0, 3.0]);
    write_series(&post_base, "caseA", "output1", &[4.0, 5.0, 6.0]);

    let config = parse_summary_config(&format!(
        "[default_settings]\npost_base_path = \"{}\"\n\n[[runs]]\nname = \"caseA\"\noutput_index = [1]\n",
        post_base.display()
    ))
    .unwrap();

    let report = execute_summary(&config).unwrap();
    assert_eq!(report.rows.len(), 2);
    assert!(report.rows.iter().all(|r| r.tmin >= 4.0));
}

#[test]
fn test_empty_case_is_skipped_but_all_empty_is_fatal() {
    let temp = tempfile::tempdir().unwrap();
    let post_base = temp.path().join("post");
    write_series(&post_base, "caseA", "output0", &[1.0]);

    let config = parse_summary_config(&format!(
        "[default_settings]\npost_base_path = \"{}\"\n\n[[runs]]\nname = \"missing\"\n\n[[runs]]\nname = \"caseA\"\n",
        post_base.display()
    ))
    .unwrap();
    let report = execute_summary(&config).unwrap();
    assert_eq!((report.cases_summarized, report.cases_skipped), (1, 1));

    let config = parse_summary_config(&format!(
        "[default_settings]\npost_base_path = \"{}\"\nmodel_component = \"ATM\"\n\n[[runs]]\nname = \"caseA\"\n",
        post_base.display()
    ))
    .unwrap();
    assert!(matches!(execute_summary(&config), Err(SummaryError::NoRows)));
}
