//! Reconstruct timing spans from enter/exit events.
//!
//! Each execution unit owns an independent state bundle: an open-frame
//! table keyed by component name, an ordered call stack used to label the
//! hierarchical path, and a depth counter. Exits are matched to the most
//! recent open frame *with the same name*, not to the top of the call
//! stack, so interleaved or lossy traces still produce spans.

use crate::parser::{ClassifiedEvent, RegionResolver, TraceMessage, Transition};
use crate::utils::config::PATH_SEPARATOR;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A completed timing span
///
/// **Public** - produced by the reconstructor, consumed by filter/merge/stats
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    /// Region name without the enter/exit marker
    pub component: String,

    /// Call stack at enter time, joined with `/`
    #[serde(rename = "model_component")]
    pub path: String,

    #[serde(rename = "start")]
    pub start_ns: u64,

    #[serde(rename = "end")]
    pub end_ns: u64,

    pub duration_ns: u64,

    /// Number of frames still open on this unit when the region was entered
    pub depth: u32,

    #[serde(rename = "pet")]
    pub unit: u32,
}

#[derive(Debug, Clone)]
struct OpenFrame {
    start_ns: u64,
    depth: u32,
    path: String,
}

#[derive(Debug, Default)]
struct UnitState {
    open: HashMap<String, Vec<OpenFrame>>,
    stack: Vec<String>,
    depth: u32,
}

impl UnitState {
    fn enter(&mut self, component: String, timestamp_ns: u64) {
        self.stack.push(component.clone());
        let frame = OpenFrame {
            start_ns: timestamp_ns,
            depth: self.depth,
            path: self.stack.join(PATH_SEPARATOR),
        };
        self.open.entry(component).or_default().push(frame);
        self.depth += 1;
    }

    fn exit(&mut self, unit: u32, component: &str, timestamp_ns: u64) -> Option<Span> {
        let frame = self.open.get_mut(component).and_then(Vec::pop);
        self.depth = self.depth.saturating_sub(1);

        if self.stack.last().is_some_and(|top| top == component) {
            self.stack.pop();
        }

        let frame = frame?;
        let end_ns = timestamp_ns.max(frame.start_ns);
        Some(Span {
            component: component.to_string(),
            path: frame.path,
            start_ns: frame.start_ns,
            end_ns,
            duration_ns: end_ns - frame.start_ns,
            depth: frame.depth,
            unit,
        })
    }
}

/// Stack machine turning classified events into spans
///
/// **Public** - one instance per pipeline invocation; the region fallback
/// map lives here and is dropped with it.
#[derive(Debug, Default)]
pub struct SpanBuilder {
    regions: RegionResolver,
    units: HashMap<u32, UnitState>,
    unmatched_exits: u64,
}

impl SpanBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one raw message from `unit`'s stream
    pub fn push<M: TraceMessage>(&mut self, unit: u32, msg: &M) -> Option<Span> {
        let event = self.regions.classify(unit, msg)?;
        self.apply(unit, event)
    }

    /// Feed one already-classified event
    pub fn apply(&mut self, unit: u32, event: ClassifiedEvent) -> Option<Span> {
        let state = self.units.entry(unit).or_default();

        match event.transition {
            Transition::Enter => {
                state.enter(event.component, event.timestamp_ns);
                None
            }
            Transition::Exit => {
                let span = state.exit(unit, &event.component, event.timestamp_ns);
                if span.is_none() {
                    self.unmatched_exits += 1;
                    debug!(
                        "unit {}: exit of '{}' at {} has no open frame",
                        unit, event.component, event.timestamp_ns
                    );
                }
                span
            }
        }
    }

    /// Current depth counter of a unit (0 for units never seen)
    pub fn depth(&self, unit: u32) -> u32 {
        self.units.get(&unit).map_or(0, |s| s.depth)
    }

    /// Frames entered but not yet exited, across all units
    pub fn open_frames(&self) -> usize {
        self.units
            .values()
            .flat_map(|s| s.open.values())
            .map(Vec::len)
            .sum()
    }

    pub fn unmatched_exits(&self) -> u64 {
        self.unmatched_exits
    }
}

/// Reconstruct all spans of one unit's message sequence
///
/// **Public** - convenience wrapper over [`SpanBuilder`]
pub fn build_spans<'a, M, I>(unit: u32, messages: I) -> Vec<Span>
where
    M: TraceMessage + 'a,
    I: IntoIterator<Item = &'a M>,
{
    let mut builder = SpanBuilder::new();
    messages
        .into_iter()
        .filter_map(|msg| builder.push(unit, msg))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::RawMessage;
    use serde_json::json;

    fn enter(name: &str, ts: u64) -> RawMessage {
        RawMessage::event(format!("{}_enter", name), ts, json!({}))
    }

    fn exit(name: &str, ts: u64) -> RawMessage {
        RawMessage::event(format!("{}_exit", name), ts, json!({}))
    }

    #[test]
    fn test_nested_spans_depth_and_path() {
        let msgs = vec![
            enter("ESM", 0),
            enter("OCN", 10),
            exit("OCN", 40),
            enter("ATM", 50),
            exit("ATM", 70),
            exit("ESM", 100),
        ];
        let spans = build_spans(0, &msgs);

        assert_eq!(spans.len(), 3);
        assert_eq!(spans[0].component, "OCN");
        assert_eq!(spans[0].path, "ESM/OCN");
        assert_eq!(spans[0].depth, 1);
        assert_eq!(spans[0].duration_ns, 30);
        assert_eq!(spans[1].path, "ESM/ATM");
        assert_eq!(spans[2].path, "ESM");
        assert_eq!(spans[2].depth, 0);
        assert_eq!(spans[2].duration_ns, 100);
    }

    #[test]
    fn test_unmatched_exit_is_tolerated() {
        let mut builder = SpanBuilder::new();
        assert!(builder.push(3, &exit("OCN", 5)).is_none());
        assert_eq!(builder.depth(3), 0);
        assert_eq!(builder.unmatched_exits(), 1);
    }

    #[test]
    fn test_exit_matched_by_name_not_position() {
        // A enters, B enters, A exits before B: both still produce spans
        let msgs = vec![enter("A", 0), enter("B", 5), exit("A", 10), exit("B", 20)];
        let spans = build_spans(0, &msgs);

        assert_eq!(spans.len(), 2);
        assert_eq!(spans[0].component, "A");
        assert_eq!(spans[0].duration_ns, 10);
        assert_eq!(spans[1].component, "B");
        assert_eq!(spans[1].depth, 1);
        // A was not on top of the stack, so B's path keeps the stale A entry
        assert_eq!(spans[1].path, "A/B");
    }

    #[test]
    fn test_stale_stack_entry_labels_later_paths() {
        let mut builder = SpanBuilder::new();
        builder.push(0, &enter("A", 0));
        builder.push(0, &enter("B", 1));
        builder.push(0, &exit("A", 2));
        builder.push(0, &exit("B", 3));
        builder.push(0, &enter("C", 4));

        let span = builder.push(0, &exit("C", 5)).unwrap();
        assert_eq!(span.path, "A/C");
        assert_eq!(span.depth, 0);
    }

    #[test]
    fn test_units_are_independent() {
        let mut builder = SpanBuilder::new();
        builder.push(0, &enter("OCN", 0));
        builder.push(1, &enter("OCN", 5));
        let s1 = builder.push(1, &exit("OCN", 8)).unwrap();
        let s0 = builder.push(0, &exit("OCN", 9)).unwrap();

        assert_eq!((s1.unit, s1.duration_ns, s1.depth), (1, 3, 0));
        assert_eq!((s0.unit, s0.duration_ns, s0.depth), (0, 9, 0));
        assert_eq!(builder.open_frames(), 0);
    }

    #[test]
    fn test_same_name_nested_region_ids() {
        let msgs = vec![
            RawMessage::event("define_region", 0, json!({"id": 1, "name": "OCN"})),
            RawMessage::event("regionid_enter", 0, json!({"regionid": 1})),
            RawMessage::event("regionid_enter", 1_000_000, json!({"regionid": 1})),
            RawMessage::event("regionid_exit", 2_000_000, json!({"regionid": 1})),
            RawMessage::event("regionid_exit", 3_000_000, json!({"regionid": 1})),
        ];
        let spans = build_spans(0, &msgs);

        assert_eq!(spans.len(), 2);
        assert!(spans.iter().all(|s| s.component == "OCN"));
        assert_eq!(spans[0].start_ns, 1_000_000);
        assert_eq!(spans[0].duration_ns, 1_000_000);
        assert_eq!(spans[0].depth, 1);
        assert_eq!(spans[1].start_ns, 0);
        assert_eq!(spans[1].duration_ns, 3_000_000);
        assert_eq!(spans[1].depth, 0);
    }
}
