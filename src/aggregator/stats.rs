//! Descriptive statistics over reconstructed spans.
//!
//! Three views are built from the same prepared table of
//! (start, model_component, pet, duration_s) rows:
//! - the time series itself
//! - per-component statistics with cross-unit normalisation
//! - per-(component, unit) statistics
//!
//! Each view can be restricted by component and unit allow-lists and sliced
//! per (component, unit) series by a half-open index range.

use super::span_builder::Span;
use crate::utils::config::NANOSECONDS_PER_SECOND;
use crate::utils::indices::resolve_slice;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::hash::Hash;

/// One span occurrence in the persisted time series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeseriesRecord {
    /// Span start in nanoseconds from the trace clock origin
    pub start: u64,
    pub model_component: String,
    pub pet: u32,
    pub duration_s: f64,
}

impl From<&Span> for TimeseriesRecord {
    fn from(span: &Span) -> Self {
        Self {
            start: span.start_ns,
            model_component: span.path.clone(),
            pet: span.unit,
            duration_s: span.duration_ns as f64 / NANOSECONDS_PER_SECOND,
        }
    }
}

/// Convert spans to time series rows (nanoseconds -> seconds)
pub fn prepare_records(spans: &[Span]) -> Vec<TimeseriesRecord> {
    spans.iter().map(TimeseriesRecord::from).collect()
}

/// Allow-lists and slicing bounds applied before aggregation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatsFilter {
    pub model_component: Option<Vec<String>>,
    pub pets: Option<Vec<u32>>,
    pub start_index: Option<i64>,
    pub end_index: Option<i64>,
}

impl StatsFilter {
    pub fn is_sliced(&self) -> bool {
        self.start_index.is_some() || self.end_index.is_some()
    }

    /// Whether a row passes both allow-lists
    pub fn admits(&self, model_component: &str, pet: u32) -> bool {
        let component_ok = self.model_component.as_ref().map_or(true, |list| {
            list.iter().any(|c| c.trim() == model_component.trim())
        });
        let pet_ok = self.pets.as_ref().map_or(true, |pets| pets.contains(&pet));
        component_ok && pet_ok
    }

    /// Same allow-lists, no slicing
    pub fn unsliced(&self) -> Self {
        Self {
            start_index: None,
            end_index: None,
            ..self.clone()
        }
    }
}

/// Core descriptive statistics of a duration sample
#[derive(Debug, Clone, PartialEq)]
pub struct Describe {
    pub count: usize,
    pub total: f64,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    /// Sample standard deviation; absent for a single value
    pub std: Option<f64>,
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
}

impl Describe {
    /// `None` for an empty sample
    pub fn from_values(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let mut sorted = values.to_vec();
        sorted.sort_by(f64::total_cmp);

        let count = sorted.len();
        let total: f64 = sorted.iter().sum();
        let mean = total / count as f64;
        let std = (count > 1).then(|| {
            let ss: f64 = sorted.iter().map(|v| (v - mean).powi(2)).sum();
            (ss / (count - 1) as f64).sqrt()
        });

        Some(Self {
            count,
            total,
            mean,
            min: sorted[0],
            max: sorted[count - 1],
            std,
            p25: quantile(&sorted, 0.25),
            p50: quantile(&sorted, 0.50),
            p75: quantile(&sorted, 0.75),
        })
    }
}

/// Linear-interpolated quantile of an ascending, non-empty slice
pub fn quantile(sorted: &[f64], q: f64) -> f64 {
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

/// Mean of a non-empty slice
pub fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

fn ratio(numerator: f64, denominator: f64) -> Option<f64> {
    (denominator != 0.0).then(|| numerator / denominator)
}

/// Per-component statistics row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentStats {
    pub model_component: String,
    pub count: usize,
    pub n_pets: usize,
    pub total_s: f64,
    pub mean_s: f64,
    pub min_s: f64,
    pub max_s: f64,
    pub std_s: Option<f64>,
    pub p25_s: f64,
    pub p50_s: f64,
    pub p75_s: f64,
    pub count_per_pet: f64,
    pub total_s_per_pet: f64,
    pub stats_start_index: Option<i64>,
    pub stats_end_index: Option<i64>,
    /// Inter-quartile range
    pub iqr_s: f64,
    /// Coefficient of variation (std / mean)
    pub coff_var: Option<f64>,
    /// Outlier indicator
    pub max_over_mean: Option<f64>,
    /// Standard error of the mean, using count-per-pet as sample size
    pub se_mean: Option<f64>,
    pub ci95_low: Option<f64>,
    pub ci95_high: Option<f64>,
}

/// Per-(component, pet) statistics row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentPetStats {
    pub model_component: String,
    pub pet: u32,
    pub count: usize,
    pub total_s: f64,
    pub mean_s: f64,
    pub min_s: f64,
    pub max_s: f64,
    pub std_s: Option<f64>,
    pub p50_s: f64,
}

/// Apply allow-lists and sort by pet (stable)
pub fn prepare_view(records: &[TimeseriesRecord], filter: &StatsFilter) -> Vec<TimeseriesRecord> {
    let mut out: Vec<TimeseriesRecord> = records
        .iter()
        .filter(|r| filter.admits(&r.model_component, r.pet))
        .cloned()
        .collect();

    out.sort_by_key(|r| r.pet);
    out
}

/// Slice every group to `[start, end)` after ordering it
///
/// **Public** - groups keep the order of their first appearance; a group
/// whose slice is empty disappears. With both bounds unset the rows are
/// returned unchanged.
pub fn slice_per_group<T, K, FK, FO, O>(
    rows: Vec<T>,
    group_key: FK,
    order_key: FO,
    start: Option<i64>,
    end: Option<i64>,
) -> Vec<T>
where
    K: Eq + Hash,
    FK: Fn(&T) -> K,
    O: Ord,
    FO: Fn(&T) -> O,
{
    if start.is_none() && end.is_none() {
        return rows;
    }

    let mut positions: HashMap<K, usize> = HashMap::new();
    let mut groups: Vec<Vec<T>> = Vec::new();
    for row in rows {
        let key = group_key(&row);
        let slot = *positions.entry(key).or_insert_with(|| {
            groups.push(Vec::new());
            groups.len() - 1
        });
        groups[slot].push(row);
    }

    groups
        .into_iter()
        .flat_map(|mut group| {
            group.sort_by_key(|r| order_key(r));
            match resolve_slice(group.len(), start, end) {
                Some((lo, hi)) => group.drain(lo..hi).collect::<Vec<_>>(),
                None => Vec::new(),
            }
        })
        .collect()
}

fn prepare_sliced(records: &[TimeseriesRecord], filter: &StatsFilter) -> Vec<TimeseriesRecord> {
    slice_per_group(
        prepare_view(records, filter),
        |r| (r.model_component.clone(), r.pet),
        |r| r.start,
        filter.start_index,
        filter.end_index,
    )
}

/// Time series view: filtered and sliced rows, one per span occurrence
pub fn timeseries_view(records: &[TimeseriesRecord], filter: &StatsFilter) -> Vec<TimeseriesRecord> {
    let mut out = prepare_sliced(records, filter);
    out.sort_by(|a, b| (a.pet, a.start).cmp(&(b.pet, b.start)));
    out
}

/// Per-component statistics, sorted by descending median duration
pub fn stats_by_component(records: &[TimeseriesRecord], filter: &StatsFilter) -> Vec<ComponentStats> {
    let base = prepare_sliced(records, filter);

    let mut groups: BTreeMap<&str, (Vec<f64>, BTreeSet<u32>)> = BTreeMap::new();
    for r in &base {
        let entry = groups.entry(r.model_component.as_str()).or_default();
        entry.0.push(r.duration_s);
        entry.1.insert(r.pet);
    }

    let mut out: Vec<ComponentStats> = groups
        .into_iter()
        .filter_map(|(component, (durations, pets))| {
            let d = Describe::from_values(&durations)?;
            let n_pets = pets.len();
            let count_per_pet = d.count as f64 / n_pets as f64;
            let se_mean = d.std.map(|std| std / count_per_pet.sqrt());

            Some(ComponentStats {
                model_component: component.to_string(),
                count: d.count,
                n_pets,
                total_s: d.total,
                mean_s: d.mean,
                min_s: d.min,
                max_s: d.max,
                std_s: d.std,
                p25_s: d.p25,
                p50_s: d.p50,
                p75_s: d.p75,
                count_per_pet,
                total_s_per_pet: d.total / n_pets as f64,
                stats_start_index: filter.start_index,
                stats_end_index: filter.end_index,
                iqr_s: d.p75 - d.p25,
                coff_var: d.std.and_then(|std| ratio(std, d.mean)),
                max_over_mean: ratio(d.max, d.mean),
                se_mean,
                ci95_low: se_mean.map(|se| d.mean - 1.96 * se),
                ci95_high: se_mean.map(|se| d.mean + 1.96 * se),
            })
        })
        .collect();

    out.sort_by(|a, b| b.p50_s.total_cmp(&a.p50_s));
    out
}

/// Per-(component, pet) statistics, sorted by component then pet
pub fn stats_by_component_pet(
    records: &[TimeseriesRecord],
    filter: &StatsFilter,
) -> Vec<ComponentPetStats> {
    let base = prepare_sliced(records, filter);

    let mut groups: BTreeMap<(&str, u32), Vec<f64>> = BTreeMap::new();
    for r in &base {
        groups
            .entry((r.model_component.as_str(), r.pet))
            .or_default()
            .push(r.duration_s);
    }

    groups
        .into_iter()
        .filter_map(|((component, pet), durations)| {
            let d = Describe::from_values(&durations)?;
            Some(ComponentPetStats {
                model_component: component.to_string(),
                pet,
                count: d.count,
                total_s: d.total,
                mean_s: d.mean,
                min_s: d.min,
                max_s: d.max,
                std_s: d.std,
                p50_s: d.p50,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(component: &str, pet: u32, start: u64, duration_s: f64) -> TimeseriesRecord {
        TimeseriesRecord {
            start,
            model_component: component.to_string(),
            pet,
            duration_s,
        }
    }

    fn sample() -> Vec<TimeseriesRecord> {
        vec![
            rec("OCN", 0, 30, 3.0),
            rec("OCN", 0, 10, 1.0),
            rec("OCN", 0, 20, 2.0),
            rec("OCN", 1, 10, 4.0),
            rec("ATM", 0, 5, 10.0),
            rec("ATM", 1, 5, 20.0),
        ]
    }

    #[test]
    fn test_quantile_interpolates() {
        let sorted = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(quantile(&sorted, 0.5), 2.5);
        assert_eq!(quantile(&sorted, 0.25), 1.75);
        assert_eq!(quantile(&[7.0], 0.75), 7.0);
    }

    #[test]
    fn test_describe_orders_percentiles() {
        let d = Describe::from_values(&[5.0, 1.0, 9.0, 3.0, 3.0]).unwrap();
        assert!(d.p25 <= d.p50 && d.p50 <= d.p75);
        assert_eq!(d.min, 1.0);
        assert_eq!(d.max, 9.0);
        assert_eq!(d.count, 5);
        assert!(Describe::from_values(&[]).is_none());
        assert_eq!(Describe::from_values(&[2.0]).unwrap().std, None);
    }

    #[test]
    fn test_percentiles_ordered_for_any_sample() {
        let samples: [&[f64]; 6] = [
            &[4.2],
            &[7.0, 7.0, 7.0],
            &[1.0, 2.0, 3.0, 10.0],
            &[9.0, 8.0, 5.0, 2.0, 0.5],
            &[0.0, 1e-9, 1e9],
            &[3.0, 3.0, 1.0, 1.0, 2.0, 100.0],
        ];
        for values in samples {
            let d = Describe::from_values(values).unwrap();
            assert!(
                d.min <= d.p25 && d.p25 <= d.p50 && d.p50 <= d.p75 && d.p75 <= d.max,
                "unordered percentiles for {:?}: {:?}",
                values,
                d
            );
        }
    }

    #[test]
    fn test_prepare_records_converts_to_seconds() {
        let span = Span {
            component: "OCN".to_string(),
            path: "ESM/OCN".to_string(),
            start_ns: 7,
            end_ns: 1_500_000_007,
            duration_ns: 1_500_000_000,
            depth: 1,
            unit: 4,
        };
        let records = prepare_records(&[span]);
        assert_eq!(records[0], rec("ESM/OCN", 4, 7, 1.5));
    }

    #[test]
    fn test_stats_by_component() {
        let rows = stats_by_component(&sample(), &StatsFilter::default());
        assert_eq!(rows.len(), 2);

        // sorted by descending median
        assert_eq!(rows[0].model_component, "ATM");
        let ocn = &rows[1];
        assert_eq!(ocn.count, 4);
        assert_eq!(ocn.n_pets, 2);
        assert_eq!(ocn.total_s, 10.0);
        assert_eq!(ocn.count_per_pet, 2.0);
        assert_eq!(ocn.total_s_per_pet, 5.0);
        assert_eq!(ocn.mean_s, 2.5);
        assert_eq!(ocn.iqr_s, ocn.p75_s - ocn.p25_s);
        let se = ocn.std_s.unwrap() / 2f64.sqrt();
        assert_eq!(ocn.se_mean, Some(se));
        assert_eq!(ocn.ci95_high, Some(2.5 + 1.96 * se));
        assert_eq!(ocn.max_over_mean, Some(4.0 / 2.5));
    }

    #[test]
    fn test_filters_apply() {
        let filter = StatsFilter {
            model_component: Some(vec!["OCN".to_string()]),
            pets: Some(vec![1]),
            ..Default::default()
        };
        let rows = stats_by_component_pet(&sample(), &filter);
        assert_eq!(rows.len(), 1);
        assert_eq!((rows[0].pet, rows[0].count), (1, 1));
    }

    #[test]
    fn test_slicing_is_per_series_in_start_order() {
        let filter = StatsFilter {
            start_index: Some(1),
            end_index: Some(3),
            ..Default::default()
        };
        let ts = timeseries_view(&sample(), &filter);

        // only OCN/pet0 has more than one row; it keeps its 2nd and 3rd by start
        assert_eq!(ts, vec![rec("OCN", 0, 20, 2.0), rec("OCN", 0, 30, 3.0)]);
    }

    #[test]
    fn test_empty_slice_drops_group() {
        let filter = StatsFilter {
            start_index: Some(2),
            ..Default::default()
        };
        let rows = stats_by_component_pet(&sample(), &filter);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].model_component, "OCN");
        assert_eq!(rows[0].count, 1);
        assert!(stats_by_component(&sample(), &filter)
            .iter()
            .all(|r| r.count > 0));
    }

    #[test]
    fn test_unsliced_timeseries_keeps_everything() {
        let ts = timeseries_view(&sample(), &StatsFilter::default());
        assert_eq!(ts.len(), 6);
        assert!(ts.windows(2).all(|w| (w[0].pet, w[0].start) <= (w[1].pet, w[1].start)));
    }
}
