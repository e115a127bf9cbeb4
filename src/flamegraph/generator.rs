//! SVG flame chart generation over reconstructed spans.
//!
//! Unlike a classic flamegraph the horizontal axis is wall-clock time, not
//! aggregated weight. Layout:
//! - One horizontal band per execution unit (pet), top to bottom
//! - Inside a band, one row per nesting depth (depth 0 on top)
//! - One colour per component, shared across bands, listed in the legend

use crate::aggregator::span_builder::Span;
use crate::utils::config::NANOSECONDS_PER_SECOND;
use crate::utils::error::FlamegraphError;
use chrono::{DateTime, Utc};
use log::info;
use std::collections::{BTreeMap, BTreeSet};

const ROW_HEIGHT: usize = 16;
const BAND_GAP: usize = 10;
const MARGIN_LEFT: usize = 70;
const MARGIN_RIGHT: usize = 20;
const HEADER_HEIGHT: usize = 40;
const AXIS_HEIGHT: usize = 40;
const LEGEND_ROW_HEIGHT: usize = 20;
const LEGEND_ITEM_WIDTH: usize = 220;
const AXIS_TICKS: usize = 5;

const PALETTE: &[&str] = &[
    "rgb(70, 130, 180)",  // Steel Blue
    "rgb(220, 20, 60)",   // Crimson
    "rgb(34, 139, 34)",   // Forest Green
    "rgb(255, 140, 0)",   // Dark Orange
    "rgb(138, 43, 226)",  // Blue Violet
    "rgb(0, 139, 139)",   // Dark Cyan
    "rgb(205, 92, 92)",   // Indian Red
    "rgb(107, 142, 35)",  // Olive Drab
    "rgb(218, 165, 32)",  // Goldenrod
    "rgb(100, 149, 237)", // Cornflower Blue
];

/// Flame chart configuration
#[derive(Debug, Clone)]
pub struct FlamegraphConfig {
    pub title: String,
    pub width: usize,
    /// Label the time axis with UTC wall-clock times instead of offsets
    pub xaxis_datetime: bool,
}

impl Default for FlamegraphConfig {
    fn default() -> Self {
        Self {
            title: "ESMF Trace Timeline".to_string(),
            width: 1200,
            xaxis_datetime: false,
        }
    }
}

impl FlamegraphConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_width(mut self, width: usize) -> Self {
        self.width = width;
        self
    }

    pub fn with_datetime_axis(mut self, enabled: bool) -> Self {
        self.xaxis_datetime = enabled;
        self
    }
}

/// Horizontal projection of the trace clock onto the plot area
struct TimeScale {
    origin_ns: u64,
    range_ns: u64,
    x0: f64,
    plot_width: f64,
}

impl TimeScale {
    fn x(&self, ts: u64) -> f64 {
        let offset = ts.saturating_sub(self.origin_ns) as f64;
        self.x0 + offset / self.range_ns as f64 * self.plot_width
    }
}

/// Render spans as an SVG timeline
///
/// **Public** - main entry point for chart generation
///
/// # Errors
/// * `FlamegraphError::EmptySpans` - nothing to draw
pub fn generate_flamegraph(
    spans: &[Span],
    config: Option<&FlamegraphConfig>,
) -> Result<String, FlamegraphError> {
    let (Some(origin_ns), Some(end_ns)) = (
        spans.iter().map(|s| s.start_ns).min(),
        spans.iter().map(|s| s.end_ns).max(),
    ) else {
        return Err(FlamegraphError::EmptySpans);
    };

    let config = config.cloned().unwrap_or_default();
    info!("Generating timeline chart with {} spans", spans.len());

    // Band height per unit follows its deepest span
    let mut bands: BTreeMap<u32, u32> = BTreeMap::new();
    for span in spans {
        let depth = bands.entry(span.unit).or_insert(0);
        *depth = (*depth).max(span.depth);
    }

    let components: BTreeSet<&str> = spans.iter().map(|s| s.component.as_str()).collect();
    let colors: BTreeMap<&str, &str> = components
        .iter()
        .enumerate()
        .map(|(i, name)| (*name, PALETTE[i % PALETTE.len()]))
        .collect();

    let width = config.width.max(MARGIN_LEFT + MARGIN_RIGHT + 100);
    let scale = TimeScale {
        origin_ns,
        range_ns: (end_ns - origin_ns).max(1),
        x0: MARGIN_LEFT as f64,
        plot_width: (width - MARGIN_LEFT - MARGIN_RIGHT) as f64,
    };

    let mut band_top: BTreeMap<u32, usize> = BTreeMap::new();
    let mut y = HEADER_HEIGHT;
    for (unit, max_depth) in &bands {
        band_top.insert(*unit, y);
        y += (*max_depth as usize + 1) * ROW_HEIGHT + BAND_GAP;
    }
    let plot_bottom = y;

    let per_row = ((width - MARGIN_LEFT) / LEGEND_ITEM_WIDTH).max(1);
    let legend_rows = components.len().div_ceil(per_row);
    let total_height = plot_bottom + AXIS_HEIGHT + 30 + legend_rows * LEGEND_ROW_HEIGHT;

    let mut svg = String::new();
    svg.push_str(&format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{}" height="{}" viewBox="0 0 {} {}">"#,
        width, total_height, width, total_height
    ));
    svg.push_str(
        r#"<style>.span { stroke: white; stroke-width: 0.5; } .span:hover { stroke: black; stroke-width: 1; cursor: pointer; opacity: 0.9; } text { font-family: sans-serif; }</style>"#,
    );
    svg.push_str(&format!(
        r#"<text x="{}" y="24" font-size="16" text-anchor="middle" font-weight="bold">{}</text>"#,
        width / 2,
        escape_xml(&config.title)
    ));

    for (unit, top) in &band_top {
        svg.push_str(&format!(
            r#"<text x="{}" y="{}" font-size="12" text-anchor="end">PET {}</text>"#,
            MARGIN_LEFT - 8,
            top + 12,
            unit
        ));
    }

    for span in spans {
        let top = band_top.get(&span.unit).copied().unwrap_or(HEADER_HEIGHT);
        let color = colors.get(span.component.as_str()).copied().unwrap_or(PALETTE[0]);
        render_span(&mut svg, span, &scale, top, color);
    }

    render_axis(&mut svg, &scale, plot_bottom, config.xaxis_datetime);
    render_legend(&mut svg, &colors, plot_bottom + AXIS_HEIGHT, per_row);

    svg.push_str("</svg>");

    info!("Timeline chart generated successfully ({} bytes)", svg.len());
    Ok(svg)
}

fn render_span(out: &mut String, span: &Span, scale: &TimeScale, band_top: usize, color: &str) {
    let x = scale.x(span.start_ns);
    let w = (scale.x(span.end_ns) - x).max(0.5);
    let y = band_top + span.depth as usize * ROW_HEIGHT;

    out.push_str(&format!(
        r#"<rect x="{:.2}" y="{}" width="{:.2}" height="{}" fill="{}" class="span"><title>{} (pet {}, {:.6} s)</title></rect>"#,
        x,
        y,
        w,
        ROW_HEIGHT,
        color,
        escape_xml(&span.path),
        span.unit,
        span.duration_ns as f64 / NANOSECONDS_PER_SECOND
    ));

    // Label only blocks wide enough to read
    if w > 35.0 {
        let label = truncate_label(&span.component, w);
        if !label.is_empty() {
            out.push_str(&format!(
                r#"<text x="{:.2}" y="{}" dx="3" dy="12" font-size="11" fill="white" pointer-events="none">{}</text>"#,
                x,
                y,
                escape_xml(&label)
            ));
        }
    }
}

fn truncate_label(name: &str, width: f64) -> String {
    let char_width = 6.5;
    let max_chars = (width / char_width) as usize;
    if name.chars().count() > max_chars && max_chars > 3 {
        let head: String = name.chars().take(max_chars - 3).collect();
        format!("{}...", head)
    } else if max_chars <= 3 {
        String::new()
    } else {
        name.to_string()
    }
}

fn render_axis(out: &mut String, scale: &TimeScale, y: usize, datetime: bool) {
    let x_end = scale.x0 + scale.plot_width;
    out.push_str(&format!(
        r#"<line x1="{:.2}" y1="{}" x2="{:.2}" y2="{}" stroke="black"/>"#,
        scale.x0, y, x_end, y
    ));

    for i in 0..=AXIS_TICKS {
        let offset_ns = scale.range_ns as f64 * i as f64 / AXIS_TICKS as f64;
        let ts = scale.origin_ns + offset_ns as u64;
        let x = scale.x(ts);
        let label = if datetime {
            datetime_label(ts)
        } else {
            format!("{:.3} s", offset_ns / NANOSECONDS_PER_SECOND)
        };
        out.push_str(&format!(
            r#"<line x1="{:.2}" y1="{}" x2="{:.2}" y2="{}" stroke="black"/><text x="{:.2}" y="{}" font-size="11" text-anchor="middle">{}</text>"#,
            x,
            y,
            x,
            y + 5,
            x,
            y + 18,
            label
        ));
    }
}

/// `HH:MM:SS.mmm` in UTC for a nanosecond timestamp
pub fn datetime_label(ts_ns: u64) -> String {
    let secs = (ts_ns / 1_000_000_000) as i64;
    let nanos = (ts_ns % 1_000_000_000) as u32;
    DateTime::<Utc>::from_timestamp(secs, nanos)
        .map(|dt| dt.format("%H:%M:%S%.3f").to_string())
        .unwrap_or_else(|| ts_ns.to_string())
}

fn render_legend(out: &mut String, colors: &BTreeMap<&str, &str>, top: usize, per_row: usize) {
    let legend_y = top + 20;

    out.push_str(&format!(
        r#"<text x="10" y="{}" font-size="13" font-weight="bold">Legend:</text>"#,
        legend_y
    ));

    for (i, (label, color)) in colors.iter().enumerate() {
        let x = MARGIN_LEFT + (i % per_row) * LEGEND_ITEM_WIDTH;
        let y = legend_y + (i / per_row) * LEGEND_ROW_HEIGHT;
        out.push_str(&format!(
            r#"<rect x="{}" y="{}" width="14" height="14" fill="{}" rx="2"/><text x="{}" y="{}" font-size="12">{}</text>"#,
            x,
            y - 11,
            color,
            x + 20,
            y,
            escape_xml(label)
        ));
    }
}

fn escape_xml(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
