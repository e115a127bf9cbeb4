//! Depth filtering and adjacent-span merging.
//!
//! Filtering always runs before merging, so a merge only ever joins spans
//! that both survive the depth bound.

use super::span_builder::Span;
use log::debug;

/// Keep spans whose depth is at most `max_depth` (inclusive)
///
/// **Public** - `None` keeps everything
pub fn filter_by_depth(spans: Vec<Span>, max_depth: Option<u32>) -> Vec<Span> {
    let Some(max_depth) = max_depth else {
        return spans;
    };
    let before = spans.len();
    let kept: Vec<Span> = spans.into_iter().filter(|s| s.depth <= max_depth).collect();
    debug!("Depth filter <= {} kept {} of {} spans", max_depth, kept.len(), before);
    kept
}

/// Coalesce runs of same-shape spans separated by at most `gap_ns`
///
/// **Public** - spans sharing (unit, component, depth) whose
/// `next.start - current.end <= gap_ns` collapse into one span that keeps
/// the first start, takes the furthest end, and sums the durations.
/// Output is sorted by (unit, component, depth, start). `None` disables
/// merging and returns the input untouched.
pub fn merge_adjacent_spans(mut spans: Vec<Span>, gap_ns: Option<u64>) -> Vec<Span> {
    let Some(gap_ns) = gap_ns else {
        return spans;
    };
    if spans.len() < 2 {
        return spans;
    }

    spans.sort_by(|a, b| {
        (a.unit, &a.component, a.depth, a.start_ns, a.end_ns)
            .cmp(&(b.unit, &b.component, b.depth, b.start_ns, b.end_ns))
    });

    let before = spans.len();
    let mut merged: Vec<Span> = Vec::with_capacity(spans.len());

    for span in spans {
        match merged.last_mut() {
            Some(current) if can_merge(current, &span, gap_ns) => {
                current.end_ns = current.end_ns.max(span.end_ns);
                current.duration_ns += span.duration_ns;
            }
            _ => merged.push(span),
        }
    }

    debug!("Merged {} spans into {} (gap <= {} ns)", before, merged.len(), gap_ns);
    merged
}

fn can_merge(current: &Span, next: &Span, gap_ns: u64) -> bool {
    current.unit == next.unit
        && current.depth == next.depth
        && current.component == next.component
        && next.start_ns.saturating_sub(current.end_ns) <= gap_ns
}
